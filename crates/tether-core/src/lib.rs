// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tether — core types, errors, envelope codec and script templates shared by
// the bridge crates.

pub mod config;
pub mod envelope;
pub mod error;
pub mod template;
pub mod types;

pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorKind};
pub use template::{Bindings, ScriptTemplate};
pub use types::*;
