// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge assembly: one registry, dispatcher, correlation engine, event
// broadcaster and any number of arbiters sharing a single evaluator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use tether_core::config::BridgeConfig;
use tether_core::envelope::{InboundCall, RawArgument, callback_script};
use tether_core::error::Result;
use tether_core::template::{self, Bindings, ScriptTemplate};
use tether_core::types::Outcome;

use crate::arbiter::{ArbiterState, ExclusiveResource};
use crate::broadcaster::EventBroadcaster;
use crate::correlation::CorrelationEngine;
use crate::dispatcher::Dispatcher;
use crate::evaluator::ScriptEvaluator;
use crate::registry::{Function, Module, Registry};
use crate::reply::Reply;

const PRELUDE: &str = include_str!("prelude.js");

/// Collects modules and arbiters before the registry is frozen.
///
/// The correlation engine and broadcaster exist from the start so module
/// handlers can capture them.
pub struct BridgeBuilder {
    config: BridgeConfig,
    evaluator: Arc<dyn ScriptEvaluator>,
    correlation: CorrelationEngine,
    events: Arc<EventBroadcaster>,
    modules: Vec<Module>,
    resources: Vec<Arc<dyn ExclusiveResource>>,
}

impl BridgeBuilder {
    pub fn correlation(&self) -> &CorrelationEngine {
        &self.correlation
    }

    pub fn events(&self) -> &Arc<EventBroadcaster> {
        &self.events
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn module(mut self, module: Module) -> Self {
        self.modules.push(module);
        self
    }

    /// Hand an arbiter to the bridge so teardown cancels its requests.
    pub fn resource(mut self, resource: Arc<dyn ExclusiveResource>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Validate the configuration and freeze the registry. The built-in
    /// reply module is registered first, so no application module may take
    /// its name.
    pub fn build(self) -> Result<Bridge> {
        self.config.validate()?;

        let mut registry = Registry::new();
        registry.register(builtin_module(&self.config, &self.correlation, &self.events))?;
        for module in self.modules {
            registry.register(module)?;
        }

        info!(
            modules = registry.modules().count(),
            functions = registry.function_paths().len(),
            resources = self.resources.len(),
            "bridge assembled"
        );

        Ok(Bridge {
            config: self.config,
            evaluator: self.evaluator,
            dispatcher: Dispatcher::new(Arc::new(registry)),
            correlation: self.correlation,
            events: self.events,
            resources: self.resources,
            shut_down: AtomicBool::new(false),
        })
    }
}

/// `reply` resolves correlated calls; `ready` marks the prelude as loaded.
fn builtin_module(
    config: &BridgeConfig,
    correlation: &CorrelationEngine,
    events: &Arc<EventBroadcaster>,
) -> Module {
    let correlation = correlation.clone();
    let events = Arc::clone(events);
    Module::new(&config.reply_module)
        .function(Function::raw(&config.reply_function, move |params, reply| {
            match correlation.handle_reply(params) {
                Ok(()) => reply.ok(()),
                Err(e) => reply.err(e),
            }
        }))
        .function(Function::raw(&config.ready_function, move |_, reply| {
            events.set_ready(true);
            reply.ok(());
        }))
}

/// The native end of a host/script bridge.
pub struct Bridge {
    config: BridgeConfig,
    evaluator: Arc<dyn ScriptEvaluator>,
    dispatcher: Dispatcher,
    correlation: CorrelationEngine,
    events: Arc<EventBroadcaster>,
    resources: Vec<Arc<dyn ExclusiveResource>>,
    shut_down: AtomicBool,
}

impl Bridge {
    pub fn builder(config: BridgeConfig, evaluator: Arc<dyn ScriptEvaluator>) -> BridgeBuilder {
        BridgeBuilder {
            correlation: CorrelationEngine::new(Arc::clone(&evaluator), &config),
            events: Arc::new(EventBroadcaster::new(Arc::clone(&evaluator), &config)),
            config,
            evaluator,
            modules: Vec::new(),
            resources: Vec::new(),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn correlation(&self) -> &CorrelationEngine {
        &self.correlation
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Handle one serialized envelope from the scripted side.
    ///
    /// An envelope that does not decode is returned as an error: without a
    /// decoded callback there is nobody to answer. Everything after decoding
    /// is answered through the envelope's callback, if it named one.
    #[instrument(skip_all)]
    pub fn handle_message(&self, text: &str) -> Result<()> {
        let call = InboundCall::decode(text).inspect_err(|e| {
            warn!(error = %e, "inbound envelope rejected");
        })?;
        self.handle_call(call);
        Ok(())
    }

    /// Dispatch an already decoded inbound call.
    pub fn handle_call(&self, call: InboundCall) {
        let InboundCall {
            path,
            callback,
            params,
        } = call;
        let evaluator = Arc::clone(&self.evaluator);
        let answered = path.clone();

        let reply = Reply::new(move |outcome: Outcome| {
            let Some(callback) = callback else {
                if let Err(e) = &outcome {
                    debug!(function = %answered, error = %e, "call failed with no callback to report to");
                }
                return;
            };
            let evaluation = evaluator.evaluate(callback_script(&callback, &outcome));
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    if let Err(e) = evaluation.await {
                        warn!(function = %answered, error = %e, "callback could not be delivered");
                    }
                });
            }
        });

        self.dispatcher
            .dispatch(&path.module, &path.function, params, reply);
    }

    /// Call a registered function in-process and wait for its outcome.
    pub async fn call(
        &self,
        module: &str,
        function: &str,
        argument: impl Into<RawArgument>,
    ) -> Outcome {
        self.dispatcher.call(module, function, argument.into()).await
    }

    /// Everything the scripted environment needs before its first call: the
    /// runtime prelude, then every module and function script in
    /// registration order.
    pub fn bootstrap_script(&self) -> Result<String> {
        let bindings = Bindings::new()
            .with_raw(template::ENTRY_POINT, self.config.entry_point.clone())
            .with_value("entryPointName", Value::String(self.config.entry_point.clone()))
            .with_raw("postMessage", self.config.post_message.clone())
            .with_value("replyModule", Value::String(self.config.reply_module.clone()))
            .with_value("replyFunction", Value::String(self.config.reply_function.clone()))
            .with_value("readyFunction", Value::String(self.config.ready_function.clone()));
        let prelude = ScriptTemplate::new(PRELUDE).render(&bindings)?;

        let mut script = prelude;
        for fragment in self.registry().all_scripts() {
            script.push('\n');
            script.push_str(fragment);
        }
        Ok(script)
    }

    /// Called by the host when the scripted environment loads or unloads.
    pub fn set_environment_ready(&self, ready: bool) {
        self.events.set_ready(ready);
    }

    pub fn resource_states(&self) -> Vec<(String, ArbiterState)> {
        self.resources
            .iter()
            .map(|r| (r.name().to_owned(), r.state()))
            .collect()
    }

    /// Resolve every pending call and arbiter request with `Cancelled` and
    /// stop delivering events. Later calls to this are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("bridge shutting down");
        self.events.set_ready(false);
        self.correlation.shutdown();
        for resource in &self.resources {
            resource.shutdown();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}
