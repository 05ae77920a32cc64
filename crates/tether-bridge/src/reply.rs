// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-use reply continuation handed to every function handler.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use tether_core::error::BridgeError;
use tether_core::types::Outcome;

type Completion = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// Answers one inbound call exactly once.
///
/// Sending consumes the handle, so a second answer cannot be expressed. A
/// handle dropped without an answer resolves the call with `Cancelled`, so
/// the caller is never left waiting on a handler that gave up.
pub struct Reply {
    complete: Option<Completion>,
}

impl Reply {
    pub fn new(complete: impl FnOnce(Outcome) + Send + 'static) -> Self {
        Self {
            complete: Some(Box::new(complete)),
        }
    }

    pub fn send(mut self, outcome: Outcome) {
        if let Some(complete) = self.complete.take() {
            complete(outcome);
        }
    }

    /// Answer with any serializable value.
    pub fn ok(self, value: impl Serialize) {
        let outcome = serde_json::to_value(value).map_err(BridgeError::from);
        self.send(outcome);
    }

    pub fn err(self, error: BridgeError) {
        self.send(Err(error));
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if let Some(complete) = self.complete.take() {
            warn!("reply dropped without an answer");
            complete(Err(BridgeError::Cancelled(
                "handler dropped its reply".into(),
            )));
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("answered", &self.complete.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    fn capture() -> (Reply, Arc<Mutex<Vec<Outcome>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reply = Reply::new(move |outcome| sink.lock().unwrap().push(outcome));
        (reply, seen)
    }

    #[test]
    fn ok_serializes_the_value() {
        let (reply, seen) = capture();
        reply.ok(vec![1, 2, 3]);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_ref().unwrap(), &json!([1, 2, 3]));
    }

    #[test]
    fn dropping_unanswered_cancels_once() {
        let (reply, seen) = capture();
        drop(reply);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Err(BridgeError::Cancelled(_))));
    }

    #[test]
    fn answered_reply_does_not_cancel_on_drop() {
        let (reply, seen) = capture();
        reply.err(BridgeError::NotFound("x".into()));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
