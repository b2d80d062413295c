//! Shared helpers for ripple-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use ripple_core::{CellEvent, CellKey, ChannelObserver, Produced, Program, Runtime};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

/// Install a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What an observer saw, without keys and names.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Done(Value),
    Pending,
    Rejected(Option<String>),
}

/// Attach a channel observer to a cell.
pub fn observe(runtime: &mut Runtime, key: CellKey) -> UnboundedReceiver<CellEvent> {
    let (observer, rx) = ChannelObserver::channel();
    runtime
        .include_observer(key, Arc::new(observer))
        .expect("cell should exist");
    rx
}

/// Everything delivered so far.
pub fn drain(rx: &mut UnboundedReceiver<CellEvent>) -> Vec<Seen> {
    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        seen.push(match event {
            CellEvent::Fulfilled { value, .. } => Seen::Done(value),
            CellEvent::Pending { .. } => Seen::Pending,
            CellEvent::Rejected { reason, .. } => Seen::Rejected(reason),
        });
    }
    seen
}

pub fn number(value: &Value) -> i64 {
    value.as_i64().unwrap_or_default()
}

pub fn identity() -> Program {
    Program::function(|args| Ok(Produced::value(args[0].clone())))
}

pub fn double() -> Program {
    Program::function(|args| Ok(Produced::value(number(&args[0]) * 2)))
}

pub fn sum() -> Program {
    Program::function(|args| Ok(Produced::value(args.iter().map(number).sum::<i64>())))
}

/// Create a named cell holding a literal.
pub fn literal(runtime: &mut Runtime, module: ripple_core::ModuleId, name: &str, value: Value) -> CellKey {
    let key = runtime
        .cell(module, Some(name), None)
        .expect("module should exist");
    runtime
        .define(key, &[], Program::Constant(value))
        .expect("cell should exist");
    key
}

/// Create a named cell computed from dependencies.
pub fn derived(
    runtime: &mut Runtime,
    module: ripple_core::ModuleId,
    name: &str,
    dependencies: &[&str],
    program: Program,
) -> CellKey {
    let key = runtime
        .cell(module, Some(name), None)
        .expect("module should exist");
    runtime
        .define(key, dependencies, program)
        .expect("cell should exist");
    key
}
