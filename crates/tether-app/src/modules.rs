// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Demonstration modules registered by the headless host.
//
//   app.echo          returns its argument
//   app.version       host version
//   app.ask           asks the scripted side via a correlated call
//   events.emit       broadcasts an event to scripted listeners
//   auth.presentLogin shows the (headless) login sheet, newest request wins
//   auth.dismissLogin closes the login sheet with a value

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use tether_bridge::arbiter::DismissFuture;
use tether_bridge::{
    Arbiter, BridgeBuilder, CorrelationEngine, EventBroadcaster, Function, Module, Presenter,
};
use tether_core::error::{BridgeError, Result};
use tether_core::template::{Bindings, ScriptTemplate};

/// Time the login sheet takes to animate away.
const SHEET_ANIMATION: Duration = Duration::from_millis(250);

const PROMPT: &str =
    "{{entryPoint}}.respond({{callerId}}, function () { return window.prompt({{question}}); });";

pub const LOGIN_PRESENTED: &str = "auth.loginPresented";
pub const LOGIN_DISMISSED: &str = "auth.loginDismissed";

/// Register every demonstration module and the login arbiter.
pub fn install(builder: BridgeBuilder) -> BridgeBuilder {
    let correlation = builder.correlation().clone();
    let events = Arc::clone(builder.events());
    let entry_point = builder.config().entry_point.clone();
    let login = Arbiter::new("login", LoginSheet::new(Arc::clone(&events)));

    builder
        .module(app_module(correlation))
        .module(events_module(events))
        .module(auth_module(login.clone(), &entry_point))
        .resource(Arc::new(login))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn app_module(correlation: CorrelationEngine) -> Module {
    let prompt = ScriptTemplate::new(PROMPT);
    Module::new("app")
        .function(Function::raw("echo", |argument, reply| reply.ok(argument)))
        .function(Function::sync("version", |_: Option<Value>| {
            Ok(env!("CARGO_PKG_VERSION"))
        }))
        .function(Function::future("ask", move |question: Question| {
            let correlation = correlation.clone();
            let prompt = prompt.clone();
            async move {
                let bindings =
                    Bindings::new().with_value("question", Value::String(question.question));
                let timeout = question.timeout_ms.map(Duration::from_millis);
                correlation.call::<Value>(&prompt, bindings, timeout).await
            }
        }))
}

#[derive(Debug, Deserialize)]
pub struct Emit {
    pub name: String,
    #[serde(default)]
    pub detail: Value,
}

fn events_module(events: Arc<EventBroadcaster>) -> Module {
    Module::new("events").function(Function::sync("emit", move |emit: Emit| {
        Ok(events.publish(&emit.name, emit.detail))
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub realm: String,
}

fn auth_module(login: Arbiter<LoginSheet>, entry_point: &str) -> Module {
    let dismisser = login.clone();
    Module::new("auth")
        .with_script(format!(
            "{entry_point}.login = function (realm) {{ \
             return {entry_point}.call(\"auth\", \"presentLogin\", {{ realm: realm }}); }};"
        ))
        .function(Function::future("presentLogin", move |request: LoginRequest| {
            let login = login.clone();
            async move { login.present(request).await }
        }))
        .function(Function::sync("dismissLogin", move |value: Option<Value>| {
            dismisser.dismiss_active(value.unwrap_or(Value::Null))
        }))
}

/// Headless stand-in for a login sheet: presenting and dismissing are
/// announced as events instead of drawn.
pub struct LoginSheet {
    events: Arc<EventBroadcaster>,
}

pub struct LoginSurface {
    realm: String,
}

impl LoginSheet {
    pub fn new(events: Arc<EventBroadcaster>) -> Self {
        Self { events }
    }
}

impl Presenter for LoginSheet {
    type Descriptor = LoginRequest;
    type Surface = LoginSurface;

    fn prepare(&self, request: LoginRequest) -> Result<LoginSurface> {
        if request.realm.trim().is_empty() {
            return Err(BridgeError::Presentation("login realm must not be empty".into()));
        }
        Ok(LoginSurface {
            realm: request.realm,
        })
    }

    fn present(&self, surface: &LoginSurface) {
        self.events
            .publish(LOGIN_PRESENTED, json!({ "realm": surface.realm }));
    }

    fn dismiss(&self, surface: Arc<LoginSurface>) -> DismissFuture {
        let events = Arc::clone(&self.events);
        Box::pin(async move {
            tokio::time::sleep(SHEET_ANIMATION).await;
            events.publish(LOGIN_DISMISSED, json!({ "realm": surface.realm }));
        })
    }
}
