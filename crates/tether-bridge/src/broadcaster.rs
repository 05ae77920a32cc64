// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unsolicited events pushed into the scripted side.
//
// Delivery is best-effort and at most once: nothing is queued while the
// environment is not ready and nothing is acknowledged after it is.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use tether_core::config::BridgeConfig;
use tether_core::error::Result;
use tether_core::template::{self, Bindings, ScriptTemplate};

use crate::evaluator::ScriptEvaluator;

/// Script invoking every listener registered for an event.
const DISPATCH_EVENT: &str = "{{entryPoint}}.dispatchEvent({{name}}, {{detail}});";

pub struct EventBroadcaster {
    evaluator: Arc<dyn ScriptEvaluator>,
    template: ScriptTemplate,
    entry_point: String,
    ready: AtomicBool,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl EventBroadcaster {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>, config: &BridgeConfig) -> Self {
        Self {
            evaluator,
            template: ScriptTemplate::new(DISPATCH_EVENT),
            entry_point: config.entry_point.clone(),
            ready: AtomicBool::new(false),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Mark the scripted environment as loaded (or unloaded again).
    pub fn set_ready(&self, ready: bool) {
        let was = self.ready.swap(ready, Ordering::SeqCst);
        if was != ready {
            debug!(ready, "event broadcaster readiness changed");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Fire `name` with `detail` at every scripted listener.
    ///
    /// Returns `false` when the event was dropped because the environment is
    /// not ready. Scripts are submitted in call order; a failed evaluation is
    /// logged and otherwise ignored. Must be called from within a tokio
    /// runtime.
    pub fn publish(&self, name: &str, detail: Value) -> bool {
        if !self.is_ready() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(event = name, "environment not ready, event dropped");
            return false;
        }

        let script = match self.render(name, detail) {
            Ok(script) => script,
            Err(e) => {
                warn!(event = name, error = %e, "event script did not render");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };

        let evaluation = self.evaluator.evaluate(script);
        self.published.fetch_add(1, Ordering::Relaxed);

        let event = name.to_owned();
        tokio::spawn(async move {
            if let Err(e) = evaluation.await {
                warn!(event = %event, error = %e, "event delivery failed");
            }
        });
        true
    }

    /// [`publish`](Self::publish) for any serializable detail.
    pub fn publish_serialized(&self, name: &str, detail: &impl Serialize) -> Result<bool> {
        Ok(self.publish(name, serde_json::to_value(detail)?))
    }

    /// Events handed to the evaluator so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Events dropped because the environment was not ready.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, detail: Value) -> Result<String> {
        let bindings = Bindings::new()
            .with_raw(template::ENTRY_POINT, self.entry_point.clone())
            .with_value("name", Value::String(name.to_owned()))
            .with_value("detail", detail);
        self.template.render(&bindings)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::evaluator::{ChannelEvaluator, StubEvaluator};

    #[tokio::test]
    async fn publish_before_ready_is_lost() {
        let (evaluator, mut rx) = ChannelEvaluator::new();
        let events = EventBroadcaster::new(Arc::new(evaluator), &BridgeConfig::default());

        assert!(!events.publish("battery", json!({ "level": 0.5 })));
        events.set_ready(true);
        assert!(events.publish("battery", json!({ "level": 0.4 })));

        let script = rx.recv().await.expect("script");
        assert_eq!(
            script,
            r#"window.__tether.dispatchEvent("battery", {"level":0.4});"#
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(events.dropped(), 1);
        assert_eq!(events.published(), 1);
    }

    #[tokio::test]
    async fn publishes_arrive_in_call_order() {
        let (evaluator, mut rx) = ChannelEvaluator::new();
        let events = EventBroadcaster::new(Arc::new(evaluator), &BridgeConfig::default());
        events.set_ready(true);

        for i in 0..5 {
            events.publish("tick", json!(i));
        }
        for i in 0..5 {
            let script = rx.recv().await.expect("script");
            assert!(script.ends_with(&format!("(\"tick\", {i});")), "{script}");
        }
    }

    #[tokio::test]
    async fn unloading_drops_later_events() {
        let (evaluator, mut rx) = ChannelEvaluator::new();
        let events = EventBroadcaster::new(Arc::new(evaluator), &BridgeConfig::default());
        events.set_ready(true);
        events.set_ready(false);

        assert!(!events.publish("tick", Value::Null));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_evaluation_is_not_an_error_for_the_publisher() {
        let events = EventBroadcaster::new(Arc::new(StubEvaluator), &BridgeConfig::default());
        events.set_ready(true);
        assert!(events.publish("tick", Value::Null));
        tokio::task::yield_now().await;
    }
}
