// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal script templating: `{{name}}` placeholders replaced by JSON values
// rendered as script literals.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Placeholder the correlation engine fills with the call's id.
pub const CALLER_ID: &str = "callerId";
/// Placeholder filled with the configured entry point object.
pub const ENTRY_POINT: &str = "entryPoint";

/// Named values substituted into a template.
///
/// Values are embedded as literals. Raw entries are spliced verbatim and
/// exist only for trusted, bridge-generated text such as the entry point path.
/// Each name holds one binding; binding it again replaces the previous one
/// whatever its kind.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: BTreeMap<String, Binding>,
}

#[derive(Debug, Clone)]
enum Binding {
    Literal(Value),
    Raw(String),
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to any serializable value.
    pub fn with(self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.with_value(name, value))
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.entries.insert(name.into(), Binding::Literal(value));
        self
    }

    pub fn with_raw(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.insert(name.into(), Binding::Raw(text.into()));
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match self.entries.get(name)? {
            Binding::Literal(value) => Some(js_literal(value)),
            Binding::Raw(text) => Some(text.clone()),
        }
    }
}

/// A script snippet with `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    source: String,
}

impl ScriptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of every placeholder, in order of first appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let mut rest = self.source.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            let name = after[..end].trim();
            if !names.contains(&name) {
                names.push(name);
            }
            rest = &after[end + 2..];
        }
        names
    }

    /// Substitute every placeholder. An unbound name is an argument error,
    /// as is an unterminated `{{`.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        let mut rest = self.source.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                BridgeError::Argument("unterminated placeholder in script template".into())
            })?;
            let name = after[..end].trim();
            let text = bindings.lookup(name).ok_or_else(|| {
                BridgeError::Argument(format!("no binding for template placeholder {name:?}"))
            })?;
            out.push_str(&text);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Render a JSON value as a script literal.
///
/// JSON is nearly a subset of the script grammar; U+2028 and U+2029 are the
/// exceptions and must be escaped inside string literals.
pub fn js_literal(value: &Value) -> String {
    let json = value.to_string();
    if json.contains(['\u{2028}', '\u{2029}']) {
        json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
    } else {
        json
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn renders_literals_and_raw_text() {
        let template = ScriptTemplate::new("{{entryPoint}}.ask({{callerId}}, {{ question }});");
        let bindings = Bindings::new()
            .with_raw(ENTRY_POINT, "window.__tether")
            .with_value(CALLER_ID, json!("abc"))
            .with("question", "Continue?")
            .expect("bind");

        let script = template.render(&bindings).expect("render");
        assert_eq!(script, r#"window.__tether.ask("abc", "Continue?");"#);
    }

    #[test]
    fn rebinding_a_name_replaces_either_kind() {
        let template = ScriptTemplate::new("f({{a}}, {{b}})");
        let bindings = Bindings::new()
            .with_raw("a", "evil()")
            .with_value("a", json!("safe"))
            .with_value("b", json!(1))
            .with_raw("b", "window.x");

        let script = template.render(&bindings).expect("render");
        assert_eq!(script, r#"f("safe", window.x)"#);
    }

    #[test]
    fn unbound_placeholder_is_an_argument_error() {
        let template = ScriptTemplate::new("f({{missing}})");
        let err = template.render(&Bindings::new()).unwrap_err();
        assert!(matches!(err, BridgeError::Argument(_)));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        let template = ScriptTemplate::new("f({{oops)");
        assert!(template.render(&Bindings::new()).is_err());
    }

    #[test]
    fn placeholders_listed_once_in_order() {
        let template = ScriptTemplate::new("{{b}} {{a}} {{b}}");
        assert_eq!(template.placeholders(), vec!["b", "a"]);
    }

    #[test]
    fn line_separators_are_escaped() {
        let literal = js_literal(&json!("a\u{2028}b\u{2029}c"));
        assert_eq!(literal, r#""a\u2028b\u2029c""#);
    }

    #[test]
    fn quotes_cannot_break_out_of_a_string() {
        let template = ScriptTemplate::new("say({{text}})");
        let bindings = Bindings::new().with("text", "\"); evil(\"").expect("bind");
        let script = template.render(&bindings).expect("render");
        assert_eq!(script, r#"say("\"); evil(\"")"#);
    }
}
