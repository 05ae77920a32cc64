// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core identifiers and result types shared across the bridge crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BridgeError, Result};

/// What every call across the boundary ends with: a JSON value or an error.
pub type Outcome = std::result::Result<Value, BridgeError>;

/// Correlation id binding a native-initiated call to its scripted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId(pub Uuid);

impl CallerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CallerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CallerId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| BridgeError::Argument(format!("malformed callerId {s:?}: {e}")))
    }
}

/// Handle for a request queued at an arbiter, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fully qualified `(module, function)` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionPath {
    pub module: String,
    pub function: String,
}

impl FunctionPath {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
        }
    }

    /// Parse `"module.function"`. Module names may themselves contain dots,
    /// so the split happens at the last one.
    pub fn parse(qualified: &str) -> Result<Self> {
        match qualified.rsplit_once('.') {
            Some((module, function)) if !module.is_empty() && !function.is_empty() => {
                Ok(Self::new(module, function))
            }
            _ => Err(BridgeError::Argument(format!(
                "expected \"module.function\", got {qualified:?}"
            ))),
        }
    }
}

impl fmt::Display for FunctionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_ids_are_unique() {
        assert_ne!(CallerId::new(), CallerId::new());
    }

    #[test]
    fn caller_id_parses_its_display_form() {
        let id = CallerId::new();
        let parsed: CallerId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn caller_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<CallerId>().unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));
    }

    #[test]
    fn function_path_splits_at_last_dot() {
        let path = FunctionPath::parse("device.camera.capture").expect("parse");
        assert_eq!(path.module, "device.camera");
        assert_eq!(path.function, "capture");
        assert_eq!(path.to_string(), "device.camera.capture");
    }

    #[test]
    fn function_path_requires_both_halves() {
        assert!(FunctionPath::parse("echo").is_err());
        assert!(FunctionPath::parse(".echo").is_err());
        assert!(FunctionPath::parse("test.").is_err());
    }
}
