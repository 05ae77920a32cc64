// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether bridge runtime.
//
// Inbound calls (script → native) go through the registry and dispatcher;
// native-initiated calls go through the correlation engine and come back as
// ordinary inbound calls to the built-in reply function. Events flow one way
// through the broadcaster, and arbiters serialize access to exclusive
// presentable resources. Everything reaches the scripted side through one
// `ScriptEvaluator`.

pub mod arbiter;
pub mod bridge;
pub mod broadcaster;
pub mod correlation;
pub mod dispatcher;
pub mod evaluator;
pub mod registry;
pub mod reply;

pub use arbiter::{Arbiter, ArbiterState, Dismissal, ExclusiveResource, Presenter};
pub use bridge::{Bridge, BridgeBuilder};
pub use broadcaster::EventBroadcaster;
pub use correlation::{CorrelationEngine, PendingSnapshot};
pub use dispatcher::Dispatcher;
pub use evaluator::{ChannelEvaluator, ScriptEvaluator, StubEvaluator};
pub use registry::{Function, Module, Registry};
pub use reply::Reply;
