// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// JSON envelopes exchanged across the host/script boundary.
//
// Inbound (script -> native):
//   { "function": "module.function", "callback": "path", "params": <any> }
//   { "module": "module", "function": "function", ... }
//
// Native answers a call by evaluating `callback(error, result)` with exactly
// one of the two non-null; failures add the error kind name as a third
// argument. Correlated replies arrive as the params of an
// ordinary call: `{ "callerId": "<uuid>", "result": <any> }` or
// `{ "callerId": "<uuid>", "error": "<message>" }`.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{BridgeError, Result};
use crate::template::js_literal;
use crate::types::{CallerId, FunctionPath, Outcome};

/// An argument as it arrives from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RawArgument {
    Absent,
    Json(Value),
    /// Not yet parsed JSON text.
    Text(String),
}

impl RawArgument {
    /// Parse into a JSON value. Absent, blank text and `null` all become
    /// `None`.
    pub fn into_value(self) -> Result<Option<Value>> {
        match self {
            Self::Absent | Self::Json(Value::Null) => Ok(None),
            Self::Json(value) => Ok(Some(value)),
            Self::Text(text) if text.trim().is_empty() => Ok(None),
            Self::Text(text) => match serde_json::from_str(&text) {
                Ok(Value::Null) => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(e) => Err(BridgeError::Argument(format!("argument is not JSON: {e}"))),
            },
        }
    }
}

impl From<Option<Value>> for RawArgument {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Json)
    }
}

impl From<Value> for RawArgument {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(default)]
    module: Option<String>,
    function: String,
    #[serde(default)]
    callback: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// A decoded inbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundCall {
    pub path: FunctionPath,
    /// Scripted-side function to invoke with the outcome, if any.
    pub callback: Option<String>,
    pub params: RawArgument,
}

impl InboundCall {
    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| BridgeError::Argument(format!("malformed envelope: {e}")))?;
        Self::from_wire(wire)
    }

    pub fn decode_value(value: Value) -> Result<Self> {
        let wire: WireEnvelope = serde_json::from_value(value)
            .map_err(|e| BridgeError::Argument(format!("malformed envelope: {e}")))?;
        Self::from_wire(wire)
    }

    fn from_wire(wire: WireEnvelope) -> Result<Self> {
        let path = match wire.module {
            Some(module) if !module.is_empty() && !wire.function.is_empty() => {
                FunctionPath::new(module, wire.function)
            }
            Some(_) => {
                return Err(BridgeError::Argument(
                    "envelope module and function must not be empty".into(),
                ));
            }
            None => FunctionPath::parse(&wire.function)?,
        };

        if let Some(callback) = &wire.callback {
            validate_callback_path(callback)?;
        }

        Ok(Self {
            path,
            callback: wire.callback,
            params: wire.params.into(),
        })
    }
}

/// Only dotted identifier paths may be called back; anything else would let
/// an envelope smuggle arbitrary script into the reply.
fn validate_callback_path(path: &str) -> Result<()> {
    let valid = !path.is_empty()
        && path.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(BridgeError::Argument(format!("invalid callback path {path:?}")))
    }
}

/// Outbound JSON form of an outcome: `{"result": v}`, or
/// `{"error": msg, "kind": "NotFoundError"}` with the wire-level kind name.
pub fn encode_outcome(outcome: &Outcome) -> Value {
    match outcome {
        Ok(value) => json!({ "result": value }),
        Err(err) => json!({ "error": err.to_string(), "kind": err.kind().as_str() }),
    }
}

/// Script invoking a scripted-side callback with `(error, result)`. Failures
/// pass the error kind as a third argument.
pub fn callback_script(callback: &str, outcome: &Outcome) -> String {
    match outcome {
        Ok(value) => format!("{callback}(null, {});", js_literal(value)),
        Err(err) => format!(
            "{callback}({}, null, {});",
            js_literal(&Value::String(err.to_string())),
            js_literal(&Value::String(err.kind().as_str().into()))
        ),
    }
}

/// A correlated answer sent back by the scripted side.
#[derive(Debug)]
pub struct ScriptReply {
    pub caller_id: CallerId,
    /// `Ok(result)`, or `Err(JsIssued)` carrying the scripted error message.
    pub outcome: Outcome,
}

impl ScriptReply {
    /// Decode the params of a reply call. A present-but-null `result` is a
    /// successful `null`; carrying both or neither of `result`/`error` is an
    /// argument error.
    pub fn decode(params: Option<Value>) -> Result<Self> {
        let Some(Value::Object(mut fields)) = params else {
            return Err(BridgeError::Argument("reply must be a JSON object".into()));
        };

        let caller_id = match fields.remove("callerId") {
            Some(Value::String(id)) => id.parse::<CallerId>()?,
            _ => return Err(BridgeError::Argument("reply is missing callerId".into())),
        };

        let outcome = match (fields.remove("result"), fields.remove("error")) {
            (Some(result), None) => Ok(result),
            (None, Some(error)) => Err(BridgeError::JsIssued(error_message(error))),
            (Some(_), Some(_)) => {
                return Err(BridgeError::Argument(
                    "reply carries both result and error".into(),
                ));
            }
            (None, None) => {
                return Err(BridgeError::Argument(
                    "reply carries neither result nor error".into(),
                ));
            }
        };

        Ok(Self { caller_id, outcome })
    }

    /// Encode in the shape the scripted side sends.
    pub fn encode(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("callerId".into(), Value::String(self.caller_id.to_string()));
        match &self.outcome {
            Ok(value) => fields.insert("result".into(), value.clone()),
            Err(BridgeError::JsIssued(message)) => {
                fields.insert("error".into(), Value::String(message.clone()))
            }
            Err(other) => fields.insert("error".into(), Value::String(other.to_string())),
        };
        Value::Object(fields)
    }
}

/// Scripted errors are usually strings, sometimes `{ message }` objects.
fn error_message(error: Value) -> String {
    match error {
        Value::String(message) => message,
        Value::Object(ref fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => error.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_qualified_function() {
        let call = InboundCall::decode(
            r#"{ "function": "test.echo", "callback": "cb.c1", "params": "hi" }"#,
        )
        .expect("decode");
        assert_eq!(call.path, FunctionPath::new("test", "echo"));
        assert_eq!(call.callback.as_deref(), Some("cb.c1"));
        assert_eq!(call.params, RawArgument::Json(json!("hi")));
    }

    #[test]
    fn decodes_separate_module_field() {
        let call = InboundCall::decode(r#"{ "module": "device.battery", "function": "level" }"#)
            .expect("decode");
        assert_eq!(call.path, FunctionPath::new("device.battery", "level"));
        assert_eq!(call.callback, None);
        assert_eq!(call.params, RawArgument::Absent);
    }

    #[test]
    fn rejects_script_in_callback_path() {
        let err = InboundCall::decode(
            r#"{ "function": "test.echo", "callback": "x);alert(1" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));
    }

    #[test]
    fn rejects_envelope_without_function() {
        assert!(InboundCall::decode(r#"{ "params": 1 }"#).is_err());
        assert!(InboundCall::decode("[]").is_err());
    }

    #[test]
    fn raw_text_argument_is_parsed() {
        let value = RawArgument::Text(r#"{"a":1}"#.into()).into_value().expect("parse");
        assert_eq!(value, Some(json!({ "a": 1 })));
        assert_eq!(RawArgument::Text("null".into()).into_value().expect("null"), None);
        assert!(RawArgument::Text("{".into()).into_value().is_err());
    }

    #[test]
    fn outcome_carries_result_or_error_with_kind() {
        let ok = encode_outcome(&Ok(json!("hi")));
        assert_eq!(ok, json!({ "result": "hi" }));

        let err = encode_outcome(&Err(BridgeError::NotFound("test.missing".into())));
        assert_eq!(
            err,
            json!({ "error": "not found: test.missing", "kind": "NotFoundError" })
        );
    }

    #[test]
    fn callback_script_passes_error_first() {
        assert_eq!(callback_script("cb", &Ok(json!([1, 2]))), "cb(null, [1,2]);");
        assert_eq!(
            callback_script("cb", &Err(BridgeError::Superseded)),
            r#"cb("superseded by a newer request", null, "Superseded");"#
        );
    }

    #[test]
    fn reply_with_result() {
        let id = CallerId::new();
        let reply = ScriptReply::decode(Some(json!({ "callerId": id.to_string(), "result": 5 })))
            .expect("decode");
        assert_eq!(reply.caller_id, id);
        assert_eq!(reply.outcome.expect("ok"), json!(5));
    }

    #[test]
    fn reply_with_null_result_is_success() {
        let id = CallerId::new();
        let reply =
            ScriptReply::decode(Some(json!({ "callerId": id.to_string(), "result": null })))
                .expect("decode");
        assert_eq!(reply.outcome.expect("ok"), Value::Null);
    }

    #[test]
    fn reply_with_error_object_uses_message() {
        let id = CallerId::new();
        let reply = ScriptReply::decode(Some(json!({
            "callerId": id.to_string(),
            "error": { "message": "user declined", "code": 4 }
        })))
        .expect("decode");
        match reply.outcome {
            Err(BridgeError::JsIssued(message)) => assert_eq!(message, "user declined"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn reply_must_carry_exactly_one_of_result_or_error() {
        let id = CallerId::new().to_string();
        assert!(ScriptReply::decode(Some(json!({ "callerId": id }))).is_err());
        assert!(
            ScriptReply::decode(Some(json!({ "callerId": id, "result": 1, "error": "x" })))
                .is_err()
        );
        assert!(ScriptReply::decode(Some(json!({ "result": 1 }))).is_err());
        assert!(ScriptReply::decode(None).is_err());
    }

    #[test]
    fn reply_encode_matches_decode_shape() {
        let reply = ScriptReply {
            caller_id: CallerId::new(),
            outcome: Err(BridgeError::JsIssued("nope".into())),
        };
        let decoded = ScriptReply::decode(Some(reply.encode())).expect("decode");
        assert_eq!(decoded.caller_id, reply.caller_id);
        assert!(matches!(decoded.outcome, Err(BridgeError::JsIssued(m)) if m == "nope"));
    }
}
