// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Newline-delimited JSON host loop.
//
// Input lines are either inbound envelopes from the scripted side or host
// commands (`{"host": "ready" | "unload" | "pending" | "resources" | "sweep"}`).
// Output lines are scripts to evaluate (`{"evaluate": "..."}`) plus replies
// to host commands and envelope errors.

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use tether_bridge::{ArbiterState, Bridge, PendingSnapshot};
use tether_core::envelope::InboundCall;
use tether_core::error::Result;

/// One line written to the host's output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HostLine {
    Evaluate(String),
    Pending(Vec<PendingSnapshot>),
    Resources(Vec<(String, ArbiterState)>),
    Swept(usize),
    Error(String),
}

/// Pump `input` into the bridge and the bridge's scripts into `output` until
/// `input` ends, then shut the bridge down and flush what it produced.
pub async fn run<R, W>(
    bridge: &Bridge,
    mut scripts: UnboundedReceiver<String>,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut sweep = tokio::time::interval(bridge.config().sweep_grace());

    loop {
        tokio::select! {
            // Scripts first, so output follows the order input produced it.
            biased;

            Some(script) = scripts.recv() => {
                write_line(&mut output, &HostLine::Evaluate(script)).await?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(answer) = handle_line(bridge, &line) {
                    write_line(&mut output, &answer).await?;
                }
            }
            _ = sweep.tick() => {
                let swept = bridge.correlation().sweep_expired();
                if swept > 0 {
                    warn!(swept, "stale pending calls swept");
                }
            }
        }
    }

    info!("input closed");
    bridge.shutdown();
    while let Ok(script) = scripts.try_recv() {
        write_line(&mut output, &HostLine::Evaluate(script)).await?;
    }
    output.flush().await?;
    Ok(())
}

fn handle_line(bridge: &Bridge, line: &str) -> Option<HostLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "input line is not JSON");
            return Some(HostLine::Error(format!("malformed input line: {e}")));
        }
    };

    if let Some(command) = value.get("host") {
        return host_command(bridge, command.as_str().unwrap_or_default());
    }

    match InboundCall::decode_value(value) {
        Ok(call) => {
            debug!(function = %call.path, "inbound call");
            bridge.handle_call(call);
            None
        }
        Err(e) => Some(HostLine::Error(e.to_string())),
    }
}

fn host_command(bridge: &Bridge, command: &str) -> Option<HostLine> {
    match command {
        "ready" => {
            bridge.set_environment_ready(true);
            None
        }
        "unload" => {
            bridge.set_environment_ready(false);
            None
        }
        "pending" => Some(HostLine::Pending(bridge.correlation().pending())),
        "resources" => Some(HostLine::Resources(bridge.resource_states())),
        "sweep" => Some(HostLine::Swept(bridge.correlation().sweep_expired())),
        other => Some(HostLine::Error(format!("unknown host command {other:?}"))),
    }
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &HostLine) -> Result<()> {
    let mut text = serde_json::to_string(line)?;
    text.push('\n');
    output.write_all(text.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use tether_bridge::ChannelEvaluator;
    use tether_core::config::BridgeConfig;

    use super::*;
    use crate::modules;

    async fn session(input: &str) -> Vec<Value> {
        let (evaluator, scripts) = ChannelEvaluator::new();
        let bridge = modules::install(Bridge::builder(
            BridgeConfig::default(),
            Arc::new(evaluator),
        ))
        .build()
        .expect("build");

        let mut output = Vec::new();
        run(&bridge, scripts, input.as_bytes(), &mut output)
            .await
            .expect("run");
        String::from_utf8(output)
            .expect("utf-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[test]
    fn evaluate_line_shape() {
        let line = serde_json::to_value(HostLine::Evaluate("f();".into())).expect("json");
        assert_eq!(line, json!({ "evaluate": "f();" }));
    }

    #[tokio::test]
    async fn echo_round_trip_over_lines() {
        let output = session(concat!(
            r#"{"function":"app.echo","callback":"window.cb","params":[1,2]}"#,
            "\n",
            "\n",
            r#"{"host":"pending"}"#,
            "\n",
        ))
        .await;

        assert_eq!(
            output,
            vec![
                json!({ "evaluate": "window.cb(null, [1,2]);" }),
                json!({ "pending": [] }),
            ]
        );
    }

    #[tokio::test]
    async fn bad_lines_are_reported_not_fatal() {
        let output = session(concat!(
            "not json\n",
            r#"{"params":1}"#,
            "\n",
            r#"{"host":"reboot"}"#,
            "\n",
            r#"{"host":"resources"}"#,
            "\n",
        ))
        .await;

        assert_eq!(output.len(), 4);
        assert!(output[0]["error"].as_str().unwrap().starts_with("malformed input line"));
        assert!(output[1]["error"].as_str().unwrap().starts_with("invalid argument"));
        assert_eq!(output[2], json!({ "error": "unknown host command \"reboot\"" }));
        assert_eq!(output[3], json!({ "resources": [["login", { "state": "idle" }]] }));
    }

    #[tokio::test]
    async fn ready_command_lets_events_through() {
        let output = session(concat!(
            r#"{"function":"events.emit","params":{"name":"early"}}"#,
            "\n",
            r#"{"host":"ready"}"#,
            "\n",
            r#"{"function":"events.emit","params":{"name":"tick","detail":1}}"#,
            "\n",
        ))
        .await;

        assert_eq!(
            output,
            vec![json!({ "evaluate": "window.__tether.dispatchEvent(\"tick\", 1);" })]
        );
    }
}
