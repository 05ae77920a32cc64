// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Inbound call dispatch: resolve `(module, function)` in the registry, decode
// the argument and hand both to the handler together with its reply.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument};

use tether_core::envelope::{RawArgument, encode_outcome};
use tether_core::error::BridgeError;
use tether_core::types::Outcome;

use crate::registry::Registry;
use crate::reply::Reply;

/// Stateless router from function names to handlers.
///
/// Cloning is cheap and every clone may dispatch concurrently.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Route one call. `reply` is answered exactly once, either here (unknown
    /// function, malformed argument) or by the handler.
    #[instrument(skip(self, argument, reply))]
    pub fn dispatch(&self, module: &str, function: &str, argument: RawArgument, reply: Reply) {
        let Some(handler) = self.registry.find(module, function) else {
            debug!("no such function");
            reply.err(BridgeError::NotFound(format!("{module}.{function}")));
            return;
        };

        let argument = match argument.into_value() {
            Ok(argument) => argument,
            Err(e) => {
                debug!(error = %e, "argument rejected");
                reply.err(e);
                return;
            }
        };

        handler.invoke(argument, reply);
    }

    /// Like [`dispatch`](Self::dispatch), with the outcome already in its
    /// outbound `{result}` / `{error}` form.
    pub fn dispatch_encoded(
        &self,
        module: &str,
        function: &str,
        argument: RawArgument,
        respond: impl FnOnce(Value) + Send + 'static,
    ) {
        self.dispatch(
            module,
            function,
            argument,
            Reply::new(move |outcome| respond(encode_outcome(&outcome))),
        );
    }

    /// Dispatch and wait for the handler's answer.
    pub async fn call(&self, module: &str, function: &str, argument: RawArgument) -> Outcome {
        let (tx, rx) = oneshot::channel();
        self.dispatch(
            module,
            function,
            argument,
            Reply::new(move |outcome| {
                let _ = tx.send(outcome);
            }),
        );
        rx.await
            .unwrap_or_else(|_| Err(BridgeError::Cancelled("reply channel closed".into())))
    }
}
