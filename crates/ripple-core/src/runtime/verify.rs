//! Cell verification.
//!
//! `verify` rebinds a cell's dependency values, bumps its sequence, runs its
//! program if everything is bound, and classifies the outcome. Deferred and
//! generator outcomes suspend into the scheduler; when they come back,
//! `resume` applies them only if no newer verification has started since.

use std::panic::AssertUnwindSafe;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::graph::{CalculationPolicy, CellKey};
use crate::program::{Deferred, Generator, Produced, Program};
use crate::result::CellResult;

use super::scheduler::{Continuation, Resumption};
use super::{Runtime, panic_message};

/// Classified outcome of one verification.
enum Evaluation {
    Settled(CellResult),
    Deferred(Deferred),
    Generator(Generator),
}

impl From<Produced> for Evaluation {
    fn from(produced: Produced) -> Self {
        match produced {
            Produced::Immediate(value) => Evaluation::Settled(CellResult::Done(value)),
            Produced::Deferred(deferred) => Evaluation::Deferred(deferred),
            Produced::Generator(generator) => Evaluation::Generator(generator),
        }
    }
}

impl Runtime {
    pub(crate) fn verify(&mut self, key: CellKey) {
        let Some(cell) = self.get(key) else {
            return;
        };
        // Non-okay cells already carry their structural error.
        if !cell.status.is_okay() {
            return;
        }
        let dependencies = cell.dependencies.clone();
        let program = cell.program.clone();
        let policy = cell.policy;
        let previous = cell.result.clone();
        let literal = match &cell.program {
            Program::Constant(value) if cell.dependencies.is_empty() => Some(value.clone()),
            _ => None,
        };

        let bindings: FxHashMap<String, Value> = dependencies
            .iter()
            .filter_map(|dep| {
                let found = self.find(key.module, dep.as_str())?;
                let value = self.get(found)?.result.value()?;
                Some((dep.clone(), value.clone()))
            })
            .collect();
        let arguments: Option<Vec<Value>> = dependencies
            .iter()
            .map(|dep| bindings.get(dep).cloned())
            .collect();

        let Ok(cell) = self.cell_mut(key) else {
            return;
        };
        cell.bindings = bindings;
        let sequence = cell.begin_verification();
        tracing::trace!(cell = %key, sequence, "verifying");
        self.scheduler.cancel(key);

        let evaluation = if policy == CalculationPolicy::Dormant {
            Evaluation::Settled(CellResult::Dormant)
        } else if let Some(value) = literal {
            // No dependencies and nothing to call: the program is the value.
            Evaluation::Settled(CellResult::Done(value))
        } else if let Some(arguments) = arguments {
            invoke(&program, &arguments)
        } else {
            let unresolved: Vec<&str> = dependencies
                .iter()
                .map(String::as_str)
                .filter(|dep| self.find(key.module, *dep).is_none())
                .collect();
            if unresolved.is_empty() {
                Evaluation::Settled(CellResult::pending_from(&previous))
            } else {
                Evaluation::Settled(CellResult::Error(format!(
                    "Undefined name: {}",
                    unresolved.join(", ")
                )))
            }
        };

        match evaluation {
            Evaluation::Settled(result) => self.update_result(key, result),
            Evaluation::Deferred(deferred) => {
                self.update_result(key, CellResult::pending_from(&previous));
                self.scheduler.defer(key, sequence, deferred);
            }
            Evaluation::Generator(generator) => self.pull(key, sequence, generator),
        }
    }

    /// Store a result, notifying observers only if it changed.
    fn update_result(&mut self, key: CellKey, result: CellResult) {
        let changed = self
            .cell_mut(key)
            .map(|cell| cell.set_result(result))
            .unwrap_or(false);
        if changed {
            self.notify(key);
        }
    }

    /// Pull the next generator item and suspend until it may be accepted.
    fn pull(&mut self, key: CellKey, sequence: u64, mut generator: Generator) {
        let item = std::panic::catch_unwind(AssertUnwindSafe(|| generator.next()));
        match item {
            Ok(None) => tracing::trace!(cell = %key, sequence, "generator finished"),
            Ok(Some(Err(reason))) => self.update_result(key, CellResult::Error(reason)),
            Ok(Some(Ok(item))) => {
                let throttle = self.config.generator_throttle;
                self.scheduler.step(key, sequence, item, generator, throttle);
            }
            Err(panic) => self.update_result(
                key,
                CellResult::Error(format!(
                    "generator panicked: {}",
                    panic_message(panic.as_ref())
                )),
            ),
        }
    }

    pub(crate) fn resume(&mut self, continuation: Continuation) {
        let Continuation {
            key,
            sequence,
            resumption,
        } = continuation;

        let current = self.get(key).is_some_and(|cell| cell.is_current(sequence));
        if !current {
            tracing::debug!(cell = %key, sequence, "dropping stale continuation");
            return;
        }

        match resumption {
            Resumption::Settled(Ok(value)) => self.update_result(key, CellResult::Done(value)),
            Resumption::Settled(Err(reason)) => self.update_result(key, CellResult::Error(reason)),
            Resumption::Step {
                item: Ok(Some(value)),
                rest,
            } => {
                self.update_result(key, CellResult::Done(value));
                self.pull(key, sequence, rest);
            }
            Resumption::Step {
                item: Ok(None),
                rest,
            } => self.pull(key, sequence, rest),
            Resumption::Step { item: Err(reason), .. } => {
                self.update_result(key, CellResult::Error(reason))
            }
        }
    }
}

/// Call a program over its positional arguments.
fn invoke(program: &Program, arguments: &[Value]) -> Evaluation {
    let Program::Function(function) = program else {
        return Evaluation::Settled(CellResult::Error("program is not callable".to_string()));
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| function(arguments))) {
        Ok(Ok(produced)) => produced.into(),
        Ok(Err(reason)) => Evaluation::Settled(CellResult::Error(reason)),
        Err(panic) => Evaluation::Settled(CellResult::Error(format!(
            "program panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}
