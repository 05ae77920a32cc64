// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Correlation engine for native-initiated calls into the scripted side.
//
// The only way to ask the scripted side a question is to inject a script,
// and the only way to hear back is an ordinary inbound call carrying the same
// correlation id. Each issued call therefore races three resolution sources:
//
//   reply       the reply function receives `{callerId, result|error}`
//   evaluation  the injected script could not run at all
//   timeout     a timer armed at issue reaches the deadline
//
// Whichever source removes the table entry first delivers the outcome; every
// later source finds nothing and does nothing. The table lock is held only
// for the insert/remove, never while a continuation runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use tether_core::config::BridgeConfig;
use tether_core::envelope::ScriptReply;
use tether_core::error::{BridgeError, Result};
use tether_core::template::{self, Bindings, ScriptTemplate};
use tether_core::types::{CallerId, Outcome};

use crate::evaluator::ScriptEvaluator;

type Completion = Box<dyn FnOnce(Outcome) + Send + 'static>;

/// An outstanding native-initiated call.
struct PendingCall {
    complete: Completion,
    issued_at: DateTime<Utc>,
    deadline: Instant,
    timeout: Duration,
}

/// Read-only view of a pending call, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSnapshot {
    pub caller_id: CallerId,
    pub issued_at: DateTime<Utc>,
    pub remaining_ms: u64,
}

#[derive(Default)]
struct Table {
    calls: HashMap<CallerId, PendingCall>,
    /// Set on shutdown; later issues resolve immediately.
    closed: bool,
}

struct Inner {
    table: Mutex<Table>,
    evaluator: Arc<dyn ScriptEvaluator>,
    entry_point: String,
    default_timeout: Duration,
    sweep_grace: Duration,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, Table> {
        // Continuations never run under the lock, so a poisoned table still
        // holds consistent entries.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `outcome` if `caller_id` is still pending. Returns whether
    /// this call won the race.
    fn resolve(&self, caller_id: CallerId, outcome: Outcome) -> bool {
        let Some(call) = self.table().calls.remove(&caller_id) else {
            return false;
        };
        match &outcome {
            Ok(_) => debug!(caller_id = %caller_id, "correlated call resolved"),
            Err(e) => debug!(caller_id = %caller_id, kind = %e.kind(), "correlated call failed"),
        }
        (call.complete)(outcome);
        true
    }
}

/// Issues correlated calls and matches replies to them.
///
/// Cloning shares the same pending table.
#[derive(Clone)]
pub struct CorrelationEngine {
    inner: Arc<Inner>,
}

impl CorrelationEngine {
    pub fn new(evaluator: Arc<dyn ScriptEvaluator>, config: &BridgeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table::default()),
                evaluator,
                entry_point: config.entry_point.clone(),
                default_timeout: config.call_timeout(),
                sweep_grace: config.sweep_grace(),
            }),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Ask the scripted side something.
    ///
    /// `template` is rendered with `bindings` plus the reserved `callerId`
    /// and `entryPoint` placeholders, then evaluated. `complete` runs exactly
    /// once with the first of: the scripted reply, an evaluation failure, or
    /// `TimeoutError` once `timeout` (default from config) has elapsed. A
    /// template that does not render, or an engine that has shut down,
    /// completes immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all)]
    pub fn issue(
        &self,
        template: &ScriptTemplate,
        bindings: Bindings,
        timeout: Option<Duration>,
        complete: impl FnOnce(Outcome) + Send + 'static,
    ) -> CallerId {
        let caller_id = CallerId::new();
        let timeout = timeout.unwrap_or(self.inner.default_timeout);

        // Bound last, replacing any caller binding of the reserved names.
        let bindings = bindings
            .with_value(template::CALLER_ID, Value::String(caller_id.to_string()))
            .with_raw(template::ENTRY_POINT, self.inner.entry_point.clone());
        let script = match template.render(&bindings) {
            Ok(script) => script,
            Err(e) => {
                warn!(caller_id = %caller_id, error = %e, "correlated call template did not render");
                complete(Err(e));
                return caller_id;
            }
        };

        let deadline = Instant::now() + timeout;
        {
            let mut table = self.inner.table();
            if table.closed {
                drop(table);
                complete(Err(BridgeError::shutdown()));
                return caller_id;
            }
            table.calls.insert(
                caller_id,
                PendingCall {
                    complete: Box::new(complete),
                    issued_at: Utc::now(),
                    deadline,
                    timeout,
                },
            );
        }
        debug!(
            caller_id = %caller_id,
            timeout_ms = timeout.as_millis() as u64,
            "correlated call issued"
        );

        // The timer is never cancelled; once the entry is gone it is a no-op.
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = Weak::upgrade(&inner)
                && inner.resolve(caller_id, Err(BridgeError::Timeout(timeout)))
            {
                info!(caller_id = %caller_id, "correlated call timed out");
            }
        });

        let evaluation = self.inner.evaluator.evaluate(script);
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Err(e) = evaluation.await else { return };
            let error = match e {
                BridgeError::Evaluation(_) => e,
                other => BridgeError::Evaluation(other.to_string()),
            };
            if let Some(inner) = Weak::upgrade(&inner) {
                warn!(caller_id = %caller_id, error = %error, "correlated call script failed to run");
                inner.resolve(caller_id, Err(error));
            }
        });

        caller_id
    }

    /// [`issue`](Self::issue) with the result decoded into `T`. A result that
    /// does not decode is delivered as `ArgumentError`.
    pub fn issue_typed<T>(
        &self,
        template: &ScriptTemplate,
        bindings: Bindings,
        timeout: Option<Duration>,
        complete: impl FnOnce(Result<T>) + Send + 'static,
    ) -> CallerId
    where
        T: DeserializeOwned + 'static,
    {
        self.issue(template, bindings, timeout, move |outcome| {
            complete(outcome.and_then(decode_result::<T>));
        })
    }

    /// Issue a call and wait for its outcome.
    pub async fn call<T>(
        &self,
        template: &ScriptTemplate,
        bindings: Bindings,
        timeout: Option<Duration>,
    ) -> Result<T>
    where
        T: DeserializeOwned + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.issue(template, bindings, timeout, move |outcome| {
            let _ = tx.send(outcome);
        });
        let value = rx.await.map_err(|_| BridgeError::shutdown())??;
        decode_result(value)
    }

    /// Resolve the pending call named in a reply's params.
    ///
    /// A reply for an id that is unknown or already resolved changes
    /// nothing; only the reply's own caller learns about it, as
    /// `NotFoundError`.
    #[instrument(skip_all)]
    pub fn handle_reply(&self, params: Option<Value>) -> Result<()> {
        let reply = ScriptReply::decode(params)?;
        let caller_id = reply.caller_id;
        if self.inner.resolve(caller_id, reply.outcome) {
            Ok(())
        } else {
            debug!(caller_id = %caller_id, "late or unknown reply discarded");
            Err(BridgeError::NotFound(format!("no pending call {caller_id}")))
        }
    }

    pub fn is_pending(&self, caller_id: &CallerId) -> bool {
        self.inner.table().calls.contains_key(caller_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.table().calls.len()
    }

    /// Snapshot of every outstanding call, oldest first.
    pub fn pending(&self) -> Vec<PendingSnapshot> {
        let now = Instant::now();
        let mut calls: Vec<PendingSnapshot> = self
            .inner
            .table()
            .calls
            .iter()
            .map(|(id, call)| PendingSnapshot {
                caller_id: *id,
                issued_at: call.issued_at,
                remaining_ms: call.deadline.saturating_duration_since(now).as_millis() as u64,
            })
            .collect();
        calls.sort_by_key(|c| c.issued_at);
        calls
    }

    /// Resolve with `TimeoutError` any entry still present well past its
    /// deadline. Timers normally get there first; this catches entries whose
    /// timer task never ran (e.g. a runtime that was shut down).
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Instant::now();
        let grace = self.inner.sweep_grace;
        let expired: Vec<(CallerId, PendingCall)> = {
            let mut table = self.inner.table();
            let ids: Vec<CallerId> = table
                .calls
                .iter()
                .filter(|(_, call)| call.deadline + grace <= cutoff)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| table.calls.remove(&id).map(|call| (id, call)))
                .collect()
        };

        let count = expired.len();
        for (caller_id, call) in expired {
            warn!(caller_id = %caller_id, "swept stale pending call");
            (call.complete)(Err(BridgeError::Timeout(call.timeout)));
        }
        count
    }

    /// Resolve every outstanding call with a shutdown error and refuse new
    /// ones.
    pub fn shutdown(&self) {
        let drained: Vec<(CallerId, PendingCall)> = {
            let mut table = self.inner.table();
            table.closed = true;
            table.calls.drain().collect()
        };

        info!(outstanding = drained.len(), "correlation engine shutting down");
        for (_, call) in drained {
            (call.complete)(Err(BridgeError::shutdown()));
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.table().closed
    }
}

fn decode_result<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::Argument(format!("reply does not match the expected type: {e}")))
}
