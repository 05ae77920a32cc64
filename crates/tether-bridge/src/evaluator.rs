// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The injected-evaluation side channel into the scripted environment.
//
// The bridge never talks to a web view directly. Hosts implement
// `ScriptEvaluator` on top of whatever transport they embed; the core only
// relies on two properties: scripts are handed to the environment in the
// order `evaluate` is called, and the returned future reports whether the
// evaluation itself ran (not what the script computed).

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::warn;

use tether_core::error::{BridgeError, Result};

/// Completion of one evaluation request.
pub type EvalFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Runs script text inside the scripted environment.
pub trait ScriptEvaluator: Send + Sync {
    /// Submit `script` for evaluation.
    ///
    /// Submission happens synchronously, before this returns; the future
    /// resolves with `Err(BridgeError::Evaluation)` if the environment could
    /// not run it.
    fn evaluate(&self, script: String) -> EvalFuture;
}

/// Evaluator used when no scripted environment is attached.
///
/// Every evaluation fails, so correlated calls resolve promptly with
/// `EvaluationError` instead of waiting out their deadline.
pub struct StubEvaluator;

impl ScriptEvaluator for StubEvaluator {
    fn evaluate(&self, _script: String) -> EvalFuture {
        warn!("ScriptEvaluator::evaluate called on stub evaluator");
        Box::pin(async {
            Err(BridgeError::Evaluation(
                "no script environment attached".into(),
            ))
        })
    }
}

/// Forwards scripts into a channel pumped by the host.
///
/// Useful when the real environment lives on another thread (UI main
/// thread, a child process) and for tests.
#[derive(Clone)]
pub struct ChannelEvaluator {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelEvaluator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ScriptEvaluator for ChannelEvaluator {
    fn evaluate(&self, script: String) -> EvalFuture {
        let sent = self.tx.send(script);
        Box::pin(async move {
            sent.map_err(|_| BridgeError::Evaluation("script environment closed".into()))
        })
    }
}
