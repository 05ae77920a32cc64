// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the inbound path (envelope decode, registry
// lookup, argument decode, outcome encode) and script template rendering.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde::Deserialize;
use serde_json::json;

use tether_bridge::{Dispatcher, Function, Module, Registry};
use tether_core::envelope::{InboundCall, callback_script};
use tether_core::template::{Bindings, ScriptTemplate};
use tether_core::types::Outcome;

#[derive(Deserialize)]
struct Point {
    x: f64,
    y: f64,
}

fn dispatcher() -> Dispatcher {
    let mut registry = Registry::new();
    for i in 0..32 {
        let filler = Module::new(format!("filler{i}"))
            .function(Function::raw("noop", |_, reply| reply.ok(())));
        registry.register(filler).expect("register filler");
    }
    registry
        .register(
            Module::new("test")
                .function(Function::raw("echo", |argument, reply| reply.ok(argument)))
                .function(Function::sync("norm", |p: Point| Ok((p.x * p.x + p.y * p.y).sqrt()))),
        )
        .expect("register test");
    Dispatcher::new(Arc::new(registry))
}

fn bench_decode_envelope(c: &mut Criterion) {
    let text = r#"{"function":"test.echo","callback":"window.__tether.callbacks.cb12","params":{"a":[1,2,3],"b":"text"}}"#;
    c.bench_function("decode_envelope", |b| {
        b.iter(|| InboundCall::decode(black_box(text)).expect("decode"))
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let dispatcher = dispatcher();

    c.bench_function("dispatch (raw echo)", |b| {
        b.iter(|| {
            let call = InboundCall::decode(black_box(r#"{"function":"test.echo","params":"hi"}"#))
                .expect("decode");
            dispatcher.dispatch_encoded(&call.path.module, &call.path.function, call.params, |v| {
                black_box(v);
            });
        })
    });

    c.bench_function("dispatch (typed argument)", |b| {
        b.iter(|| {
            dispatcher.dispatch_encoded(
                "test",
                "norm",
                json!({ "x": 3.0, "y": 4.0 }).into(),
                |v| {
                    black_box(v);
                },
            );
        })
    });
}

fn bench_scripts(c: &mut Criterion) {
    let template = ScriptTemplate::new(
        "{{entryPoint}}.respond({{callerId}}, function () { return prompt({{question}}); });",
    );
    let bindings = Bindings::new()
        .with_raw("entryPoint", "window.__tether")
        .with_value("callerId", json!("5a1f6c2e-0d7b-4f51-9a34-1c2b3d4e5f60"))
        .with_value("question", json!("What is your name?"));

    c.bench_function("render_template", |b| {
        b.iter(|| template.render(black_box(&bindings)).expect("render"))
    });

    let outcome: Outcome = Ok(json!({ "items": (0..64).collect::<Vec<u32>>() }));
    c.bench_function("callback_script (64 items)", |b| {
        b.iter(|| callback_script(black_box("window.cb"), black_box(&outcome)))
    });

}

criterion_group!(benches, bench_decode_envelope, bench_dispatch, bench_scripts);
criterion_main!(benches);
