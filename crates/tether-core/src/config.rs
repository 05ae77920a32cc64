// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration, injected by the embedding application.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// Settings the surrounding application hands to a bridge at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Default deadline for native-initiated calls, in milliseconds.
    pub call_timeout_ms: u64,
    /// Global object the prelude installs in the scripted environment.
    pub entry_point: String,
    /// Host hook the prelude hands serialized envelopes to.
    pub post_message: String,
    /// Module that hosts the built-in bridge functions.
    pub reply_module: String,
    /// Function the scripted side calls to answer a correlated call.
    pub reply_function: String,
    /// Function the scripted side calls once the prelude has loaded.
    pub ready_function: String,
    /// How long past its deadline a pending call may linger before a sweep
    /// treats it as garbage.
    pub sweep_grace_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 9_000,
            entry_point: "window.__tether".into(),
            post_message: "window.webkit.messageHandlers.tether.postMessage".into(),
            reply_module: "bridge".into(),
            reply_function: "reply".into(),
            ready_function: "ready".into(),
            sweep_grace_ms: 30_000,
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn sweep_grace(&self) -> Duration {
        Duration::from_millis(self.sweep_grace_ms)
    }

    /// Reject settings no bridge can run with.
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout_ms == 0 {
            return Err(BridgeError::Configuration(
                "callTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.sweep_grace_ms == 0 {
            return Err(BridgeError::Configuration(
                "sweepGraceMs must be greater than zero".into(),
            ));
        }
        for (field, value) in [
            ("entryPoint", &self.entry_point),
            ("postMessage", &self.post_message),
            ("replyModule", &self.reply_module),
            ("replyFunction", &self.reply_function),
            ("readyFunction", &self.ready_function),
        ] {
            if value.trim().is_empty() {
                return Err(BridgeError::Configuration(format!("{field} must not be empty")));
            }
        }
        if self.reply_function == self.ready_function {
            return Err(BridgeError::Configuration(
                "replyFunction and readyFunction must differ".into(),
            ));
        }
        Ok(())
    }

    /// Load a config file, falling back to defaults when it does not exist.
    ///
    /// Missing keys take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;

        info!(path = %path.display(), "bridge config loaded");
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.call_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = BridgeConfig::load(dir.path().join("absent.json")).expect("load");
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "callTimeoutMs": 250, "entryPoint": "window.app" }"#)
            .expect("write");

        let config = BridgeConfig::load(&path).expect("load");
        assert_eq!(config.call_timeout_ms, 250);
        assert_eq!(config.entry_point, "window.app");
        assert_eq!(config.reply_module, "bridge");
    }

    #[test]
    fn persist_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        let config = BridgeConfig {
            call_timeout_ms: 1_500,
            ..BridgeConfig::default()
        };
        config.persist(&path).expect("persist");
        assert_eq!(BridgeConfig::load(&path).expect("load"), config);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "callTimeoutMs": 0 }"#).expect("write");

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn zero_sweep_grace_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{ "sweepGraceMs": 0 }"#).expect("write");

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));

        let config = BridgeConfig {
            sweep_grace_ms: 0,
            ..BridgeConfig::default()
        };
        assert!(matches!(config.validate(), Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn malformed_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, "not json").expect("write");

        let err = BridgeConfig::load(&path).unwrap_err();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }
}
