// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Exclusive resource arbiter.
//
// One presentable surface (a login sheet, a modal) is shared by any number of
// requests. A request arriving while something is shown queues and starts
// dismissing the active surface; when that dismissal finishes only the newest
// queued request is shown and every older one is superseded.
//
//   Idle ──request──▶ Presenting(a)
//   Presenting(a) ──request(r)──▶ Presenting(a) + Queued[.., r], dismissing a
//   dismissal done ──▶ a: Displaced, Queued[..last]: Superseded,
//                      last presented (or Idle)
//   Presenting(a) ──dismiss(a)──▶ a: Closed, same collapse

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use tether_core::error::{BridgeError, Result};
use tether_core::types::RequestId;

pub type DismissFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Platform side of an arbiter: builds, shows and hides the surface.
///
/// `prepare` and `present` run synchronously; `present` is called with the
/// arbiter's state lock held so it is ordered before any dismissal of the
/// same surface. Neither may call back into the arbiter.
pub trait Presenter: Send + Sync + 'static {
    type Descriptor: Send + 'static;
    type Surface: Send + Sync + 'static;

    /// Build the surface for a request. An error here fails the request
    /// with `PresentationError` before it can enter the queue.
    fn prepare(&self, descriptor: Self::Descriptor) -> Result<Self::Surface>;

    fn present(&self, surface: &Self::Surface);

    /// Hide the surface; the future resolves once it is gone.
    fn dismiss(&self, surface: Arc<Self::Surface>) -> DismissFuture;
}

/// How a presented request ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "value", rename_all = "camelCase")]
pub enum Dismissal {
    /// Dismissed by the user or system, with whatever it produced.
    Closed(Value),
    /// Taken down to make room for a newer request.
    Displaced,
}

/// Snapshot of an arbiter, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ArbiterState {
    Idle,
    Presenting {
        active: RequestId,
        queued: Vec<RequestId>,
        dismissing: bool,
    },
}

/// Object-safe view used by the bridge to tear arbiters down.
pub trait ExclusiveResource: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> ArbiterState;
    /// Cancel the active and queued requests. Returns how many were pending.
    fn shutdown(&self) -> usize;
}

type Completion = Box<dyn FnOnce(Result<Dismissal>) + Send + 'static>;

struct Request<S> {
    id: RequestId,
    surface: Arc<S>,
    complete: Completion,
}

struct State<S> {
    active: Option<Request<S>>,
    queue: VecDeque<Request<S>>,
    dismissing: bool,
    shut_down: bool,
}

impl<S> Default for State<S> {
    fn default() -> Self {
        Self {
            active: None,
            queue: VecDeque::new(),
            dismissing: false,
            shut_down: false,
        }
    }
}

struct Inner<P: Presenter> {
    name: String,
    presenter: P,
    state: Mutex<State<P::Surface>>,
    next_id: AtomicU64,
}

impl<P: Presenter> Inner<P> {
    fn state(&self) -> MutexGuard<'_, State<P::Surface>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs once the dismissal of `dismissed` has finished.
    fn finish_dismissal(&self, dismissed: RequestId, reason: Dismissal) {
        let (finished, superseded) = {
            let mut state = self.state();
            state.dismissing = false;

            let finished = match state.active.take() {
                Some(active) if active.id == dismissed => Some(active),
                other => {
                    // Torn down while the dismissal was in flight.
                    state.active = other;
                    None
                }
            };
            if state.active.is_some() {
                return;
            }

            let keep = state.queue.pop_back();
            let superseded: Vec<Request<P::Surface>> = state.queue.drain(..).collect();
            if let Some(next) = keep {
                debug!(arbiter = %self.name, request = %next.id, "presenting queued request");
                self.presenter.present(&next.surface);
                state.active = Some(next);
            }
            (finished, superseded)
        };

        if let Some(finished) = finished {
            (finished.complete)(Ok(reason));
        }
        for request in superseded {
            debug!(arbiter = %self.name, request = %request.id, "request superseded");
            (request.complete)(Err(BridgeError::Superseded));
        }
    }
}

/// Serializes access to one exclusive presentable resource.
///
/// Cloning shares the same state.
pub struct Arbiter<P: Presenter> {
    inner: Arc<Inner<P>>,
}

impl<P: Presenter> Clone for Arbiter<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Presenter> Arbiter<P> {
    pub fn new(name: impl Into<String>, presenter: P) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                presenter,
                state: Mutex::new(State::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn presenter(&self) -> &P {
        &self.inner.presenter
    }

    /// Ask for the resource. `complete` runs exactly once: `Closed` or
    /// `Displaced` once a shown request is gone, `Superseded` if a newer
    /// request overtook it in the queue, `PresentationError` if the surface
    /// could not be built, `Cancelled` on shutdown.
    ///
    /// Must be called from within a tokio runtime when the resource is busy.
    pub fn request(
        &self,
        descriptor: P::Descriptor,
        complete: impl FnOnce(Result<Dismissal>) + Send + 'static,
    ) -> RequestId {
        let id = RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));

        let surface = match self.inner.presenter.prepare(descriptor) {
            Ok(surface) => Arc::new(surface),
            Err(e) => {
                let e = match e {
                    BridgeError::Presentation(_) => e,
                    other => BridgeError::Presentation(other.to_string()),
                };
                warn!(arbiter = %self.inner.name, request = %id, error = %e, "surface could not be built");
                complete(Err(e));
                return id;
            }
        };
        let request = Request {
            id,
            surface,
            complete: Box::new(complete),
        };

        let mut state = self.inner.state();
        if state.shut_down {
            drop(state);
            (request.complete)(Err(BridgeError::shutdown()));
            return id;
        }

        if state.active.is_none() {
            debug!(arbiter = %self.inner.name, request = %id, "presenting");
            self.inner.presenter.present(&request.surface);
            state.active = Some(request);
            return id;
        }

        let displace = match &state.active {
            Some(active) if !state.dismissing => Some((active.id, Arc::clone(&active.surface))),
            _ => None,
        };
        state.queue.push_back(request);
        state.dismissing = true;
        debug!(
            arbiter = %self.inner.name,
            request = %id,
            queued = state.queue.len(),
            "resource busy, request queued"
        );
        drop(state);

        if let Some((active, surface)) = displace {
            self.begin_dismissal(active, surface, Dismissal::Displaced);
        }
        id
    }

    /// [`request`](Self::request) and wait for the outcome.
    pub async fn present(&self, descriptor: P::Descriptor) -> Result<Dismissal> {
        let (tx, rx) = oneshot::channel();
        self.request(descriptor, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.map_err(|_| BridgeError::shutdown())?
    }

    /// Dismiss the shown request `id` on behalf of the user or system.
    ///
    /// A request that is not the one shown is `NotFoundError`. If the shown
    /// request is already being dismissed this does nothing.
    pub fn dismiss(&self, id: RequestId, value: Value) -> Result<()> {
        let mut state = self.inner.state();
        let surface = match &state.active {
            Some(active) if active.id == id => Arc::clone(&active.surface),
            _ => {
                return Err(BridgeError::NotFound(format!(
                    "{} is not presented by {}",
                    id, self.inner.name
                )));
            }
        };
        if state.dismissing {
            debug!(arbiter = %self.inner.name, request = %id, "dismissal already in flight");
            return Ok(());
        }
        state.dismissing = true;
        drop(state);

        self.begin_dismissal(id, surface, Dismissal::Closed(value));
        Ok(())
    }

    /// Dismiss whichever request is shown. Returns its id.
    pub fn dismiss_active(&self, value: Value) -> Result<RequestId> {
        let active = self.inner.state().active.as_ref().map(|a| a.id);
        let Some(id) = active else {
            return Err(BridgeError::NotFound(format!(
                "nothing is presented by {}",
                self.inner.name
            )));
        };
        self.dismiss(id, value)?;
        Ok(id)
    }

    fn begin_dismissal(&self, id: RequestId, surface: Arc<P::Surface>, reason: Dismissal) {
        debug!(arbiter = %self.inner.name, request = %id, "dismissing");
        let dismissal = self.inner.presenter.dismiss(surface);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            dismissal.await;
            inner.finish_dismissal(id, reason);
        });
    }
}

impl<P: Presenter> ExclusiveResource for Arbiter<P> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn state(&self) -> ArbiterState {
        let state = self.inner.state();
        match &state.active {
            None => ArbiterState::Idle,
            Some(active) => ArbiterState::Presenting {
                active: active.id,
                queued: state.queue.iter().map(|r| r.id).collect(),
                dismissing: state.dismissing,
            },
        }
    }

    fn shutdown(&self) -> usize {
        let (active, queued, dismissing) = {
            let mut state = self.inner.state();
            state.shut_down = true;
            let queued: Vec<Request<P::Surface>> = state.queue.drain(..).collect();
            (state.active.take(), queued, state.dismissing)
        };

        let count = usize::from(active.is_some()) + queued.len();
        info!(arbiter = %self.inner.name, outstanding = count, "arbiter shutting down");

        if let Some(active) = active {
            if !dismissing && let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(self.inner.presenter.dismiss(Arc::clone(&active.surface)));
            }
            (active.complete)(Err(BridgeError::shutdown()));
        }
        for request in queued {
            (request.complete)(Err(BridgeError::shutdown()));
        }
        count
    }
}
