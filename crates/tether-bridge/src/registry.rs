// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Module / function registry.
//
// Modules are registered once while a bridge is assembled and the registry is
// frozen behind an `Arc` afterwards, so lookups need no locking.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use tether_core::error::{BridgeError, Result};
use tether_core::types::FunctionPath;

use crate::reply::Reply;

type Handler = Arc<dyn Fn(Option<Value>, Reply) + Send + Sync + 'static>;

/// Decode a function argument against the handler's parameter type.
///
/// An absent argument is decoded from `null`, so only types that accept
/// `null` (`Option<T>`, `()`, `Value`) allow calls without params.
pub fn decode_argument<A: DeserializeOwned>(argument: Option<Value>) -> Result<A> {
    serde_json::from_value(argument.unwrap_or(Value::Null))
        .map_err(|e| BridgeError::Argument(e.to_string()))
}

/// A named, callable entry point of a module.
#[derive(Clone)]
pub struct Function {
    name: String,
    script: Option<String>,
    handler: Handler,
}

impl Function {
    /// Handler receiving the argument undecoded.
    pub fn raw(
        name: impl Into<String>,
        handler: impl Fn(Option<Value>, Reply) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            script: None,
            handler: Arc::new(handler),
        }
    }

    /// Handler with a typed argument. A value that does not decode into `A`
    /// is answered with `ArgumentError` and `handler` never runs.
    pub fn new<A, F>(name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        F: Fn(A, Reply) + Send + Sync + 'static,
    {
        Self::raw(name, move |argument, reply| {
            match decode_argument::<A>(argument) {
                Ok(argument) => handler(argument, reply),
                Err(e) => reply.err(e),
            }
        })
    }

    /// Typed handler that answers synchronously.
    pub fn sync<A, R, F>(name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        Self::new(name, move |argument: A, reply| match handler(argument) {
            Ok(value) => reply.ok(value),
            Err(e) => reply.err(e),
        })
    }

    /// Typed handler that answers after suspension. The future runs as its
    /// own tokio task, so dispatch must happen inside a runtime.
    pub fn future<A, R, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::new(name, move |argument: A, reply| {
            let pending = handler(argument);
            tokio::spawn(async move {
                match pending.await {
                    Ok(value) => reply.ok(value),
                    Err(e) => reply.err(e),
                }
            });
        })
    }

    /// Attach a script fragment injected at setup.
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn invoke(&self, argument: Option<Value>, reply: Reply) {
        (self.handler)(argument, reply);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("script", &self.script.is_some())
            .finish()
    }
}

/// A named group of functions. Function order is the order their scripts
/// are emitted in.
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    script: Option<String>,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: None,
            functions: Vec::new(),
        }
    }

    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn find(&self, function: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == function)
    }
}

/// Every module the scripted side may call, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    modules: Vec<Module>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. Names must be unique, as must function names within
    /// the module.
    pub fn register(&mut self, module: Module) -> Result<()> {
        if module.name.is_empty() {
            return Err(BridgeError::Configuration("module name must not be empty".into()));
        }
        if self.index.contains_key(&module.name) {
            return Err(BridgeError::Configuration(format!(
                "module {:?} is already registered",
                module.name
            )));
        }
        for (i, function) in module.functions.iter().enumerate() {
            if function.name.is_empty() {
                return Err(BridgeError::Configuration(format!(
                    "module {:?} has a function without a name",
                    module.name
                )));
            }
            if module.functions[..i].iter().any(|f| f.name == function.name) {
                return Err(BridgeError::Configuration(format!(
                    "function {}.{} is declared twice",
                    module.name, function.name
                )));
            }
        }

        debug!(
            module = %module.name,
            functions = module.functions.len(),
            "module registered"
        );
        self.index.insert(module.name.clone(), self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    pub fn find_module(&self, module: &str) -> Option<&Module> {
        self.index.get(module).map(|&i| &self.modules[i])
    }

    pub fn find(&self, module: &str, function: &str) -> Option<&Function> {
        self.find_module(module)?.find(function)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Every callable path, in registration order.
    pub fn function_paths(&self) -> Vec<FunctionPath> {
        self.modules
            .iter()
            .flat_map(|m| m.functions.iter().map(|f| FunctionPath::new(&m.name, &f.name)))
            .collect()
    }

    /// Script fragments to inject at setup: each module's own fragment, then
    /// its functions' fragments, module by module in registration order.
    pub fn all_scripts(&self) -> Vec<&str> {
        self.modules
            .iter()
            .flat_map(|m| {
                m.script()
                    .into_iter()
                    .chain(m.functions.iter().filter_map(Function::script))
            })
            .collect()
    }
}
