//! Integration tests for deferred values, generators and stale continuations.
//!
//! Tokio time is paused, so throttle intervals elapse deterministically.

mod common;

use std::time::Duration;

use ripple_core::{CellResult, Produced, Program, Runtime, RuntimeConfig, Yield};
use serde_json::{Value, json};
use tokio::time::Instant;

use common::{Seen, derived, double, drain, init_tracing, literal, number, observe};

fn delayed(millis: u64, value: Value) -> Program {
    Program::function(move |_| {
        let value = value.clone();
        Ok(Produced::deferred(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(value)
        }))
    })
}

// =============================================================================
// Deferred values
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_deferred_value_settles() {
    init_tracing();
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(&mut runtime, module, "x", &[], delayed(50, json!(21)));
    let y = derived(&mut runtime, module, "y", &["x"], double());
    assert!(runtime.result(x).unwrap().is_pending());
    assert!(runtime.result(y).unwrap().is_pending());
    // Every module validation re-verifies x; only the latest settlement is live.
    assert_eq!(runtime.outstanding(), 1);

    let mut seen = observe(&mut runtime, y);
    runtime.settle().await;

    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!(21))));
    assert_eq!(runtime.result(y), Some(&CellResult::Done(json!(42))));
    assert_eq!(drain(&mut seen), vec![Seen::Pending, Seen::Done(json!(42))]);
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_deferred_pending_carries_last_value() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = literal(&mut runtime, module, "x", json!(1));
    runtime.define(x, &[], delayed(10, json!(2))).unwrap();
    assert_eq!(runtime.result(x), Some(&CellResult::Pending(Some(json!(1)))));

    runtime.settle().await;
    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!(2))));
}

#[tokio::test(start_paused = true)]
async fn test_deferred_rejection() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(
        &mut runtime,
        module,
        "x",
        &[],
        Program::function(|_| Ok(Produced::deferred(async { Err("timeout".to_string()) }))),
    );
    let y = derived(&mut runtime, module, "y", &["x"], double());

    runtime.settle().await;
    assert_eq!(runtime.result(x), Some(&CellResult::Error("timeout".to_string())));
    assert!(runtime.result(y).unwrap().is_pending());
}

#[tokio::test(start_paused = true)]
async fn test_redefinition_discards_outstanding_settlement() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(&mut runtime, module, "x", &[], delayed(500, json!("stale")));
    let mut seen = observe(&mut runtime, x);
    runtime.define(x, &[], Program::constant("fresh")).unwrap();
    assert_eq!(runtime.outstanding(), 0);

    runtime.settle().await;

    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!("fresh"))));
    let seen = drain(&mut seen);
    assert!(!seen.contains(&Seen::Done(json!("stale"))));
    assert_eq!(seen.last(), Some(&Seen::Done(json!("fresh"))));
}

#[tokio::test(start_paused = true)]
async fn test_superseded_settlement_that_never_resolves() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(
        &mut runtime,
        module,
        "x",
        &[],
        Program::function(|_| Ok(Produced::deferred(futures::future::pending()))),
    );
    assert_eq!(runtime.outstanding(), 1);
    runtime.define(x, &[], Program::constant(1)).unwrap();
    assert_eq!(runtime.outstanding(), 0);

    let settled = tokio::time::timeout(Duration::from_secs(3600), runtime.settle()).await;
    assert!(settled.is_ok());
    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!(1))));
}

#[tokio::test(start_paused = true)]
async fn test_unrelated_cells_do_not_accumulate_work() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(&mut runtime, module, "x", &[], delayed(60_000, json!("late")));
    // Each named cell revalidates the module, re-verifying x.
    for i in 0..100 {
        runtime
            .cell(module, Some(&format!("other_{i}")), None)
            .unwrap();
    }
    assert_eq!(runtime.outstanding(), 1);

    runtime.settle().await;
    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!("late"))));
}

#[tokio::test(start_paused = true)]
async fn test_only_latest_of_overlapping_settlements_wins() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    // The older definition resolves later than the newer one.
    let x = derived(&mut runtime, module, "x", &[], delayed(100, json!("old")));
    runtime.define(x, &[], delayed(10, json!("new"))).unwrap();

    runtime.settle().await;
    assert_eq!(runtime.result(x), Some(&CellResult::Done(json!("new"))));
}

#[tokio::test(start_paused = true)]
async fn test_structural_error_discards_outstanding_settlement() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(&mut runtime, module, "x", &[], delayed(50, json!(1)));
    literal(&mut runtime, module, "x", json!(2));
    assert_eq!(runtime.outstanding(), 0);

    runtime.settle().await;
    assert_eq!(
        runtime.result(x),
        Some(&CellResult::Error("Duplicate name".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_removed_cell_drops_unresolved_settlement() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(
        &mut runtime,
        module,
        "x",
        &[],
        Program::function(|_| Ok(Produced::deferred(futures::future::pending()))),
    );
    runtime.remove_cell(x).unwrap();
    assert_eq!(runtime.outstanding(), 0);

    let settled = tokio::time::timeout(Duration::from_secs(3600), runtime.settle()).await;
    assert!(settled.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_removed_cell_ignores_settlement() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let x = derived(&mut runtime, module, "x", &[], delayed(50, json!(1)));
    runtime.remove_cell(x).unwrap();

    runtime.settle().await;
    assert!(runtime.get(x).is_none());
    assert_eq!(runtime.outstanding(), 0);
}

// =============================================================================
// Generators
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_generator_is_drained_with_throttle() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let g = derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| Ok(Produced::generator(vec![json!(1), json!(2)]))),
    );
    let mut seen = observe(&mut runtime, g);
    // Nothing settles before the first item is accepted.
    assert_eq!(drain(&mut seen), vec![Seen::Done(Value::Null)]);

    let start = Instant::now();
    assert!(runtime.step().await);
    assert_eq!(drain(&mut seen), vec![Seen::Done(json!(1))]);
    assert!(start.elapsed() >= Duration::from_millis(100));

    runtime.settle().await;
    assert_eq!(drain(&mut seen), vec![Seen::Done(json!(2))]);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert_eq!(runtime.outstanding(), 0);
    assert_eq!(runtime.result(g), Some(&CellResult::Done(json!(2))));
}

#[tokio::test(start_paused = true)]
async fn test_generator_throttle_is_configurable() {
    let config = RuntimeConfig::default().with_generator_throttle(Duration::from_millis(10));
    let mut runtime = Runtime::with_config(config);
    let module = runtime.module();

    derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| Ok(Produced::generator((1..=3).map(|i| json!(i))))),
    );

    let start = Instant::now();
    runtime.settle().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(30));
    assert!(elapsed < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_generator_feeds_dependents() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| Ok(Produced::generator(vec![json!(1), json!(2)]))),
    );
    let y = derived(&mut runtime, module, "y", &["g"], double());
    let mut seen = observe(&mut runtime, y);
    drain(&mut seen);

    runtime.settle().await;
    assert_eq!(
        drain(&mut seen),
        vec![Seen::Done(json!(2)), Seen::Done(json!(4))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_generator_skips_undefined_items() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let g = derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| {
            Ok(Produced::generator(vec![
                Some(json!("a")),
                None,
                Some(json!("b")),
            ]))
        }),
    );
    let mut seen = observe(&mut runtime, g);
    drain(&mut seen);

    runtime.settle().await;
    assert_eq!(
        drain(&mut seen),
        vec![Seen::Done(json!("a")), Seen::Done(json!("b"))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_generator_deferred_items_skip_throttle() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let g = derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| {
            Ok(Produced::generator(
                (1..=3).map(|i| Yield::deferred(async move { Ok(json!(i)) })),
            ))
        }),
    );

    let start = Instant::now();
    runtime.settle().await;
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(runtime.result(g), Some(&CellResult::Done(json!(3))));
}

#[tokio::test(start_paused = true)]
async fn test_generator_step_failure() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let g = derived(
        &mut runtime,
        module,
        "g",
        &[],
        Program::function(|_| {
            Ok(Produced::fallible_generator(vec![
                Ok(Yield::Value(json!(1))),
                Err("step failed".to_string()),
                Ok(Yield::Value(json!(3))),
            ]))
        }),
    );
    let mut seen = observe(&mut runtime, g);
    drain(&mut seen);

    runtime.settle().await;
    assert_eq!(
        drain(&mut seen),
        vec![
            Seen::Done(json!(1)),
            Seen::Rejected(Some("step failed".to_string()))
        ]
    );
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_generator_stops() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let counter = derived(
        &mut runtime,
        module,
        "counter",
        &[],
        Program::function(|_| Ok(Produced::generator((0..).map(|i: i64| json!(i))))),
    );

    assert!(runtime.step().await);
    assert!(runtime.step().await);
    assert_eq!(runtime.result(counter), Some(&CellResult::Done(json!(1))));

    runtime.define(counter, &[], Program::constant("stopped")).unwrap();
    // The endless generator's last step is stale and is not pulled again.
    runtime.settle().await;
    assert_eq!(runtime.result(counter), Some(&CellResult::Done(json!("stopped"))));
    assert_eq!(runtime.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_generator_restarts_when_dependency_changes() {
    let mut runtime = Runtime::new();
    let module = runtime.module();

    let start = literal(&mut runtime, module, "start", json!(10));
    let g = derived(
        &mut runtime,
        module,
        "g",
        &["start"],
        Program::function(|args| {
            let base = number(&args[0]);
            Ok(Produced::generator(vec![json!(base), json!(base + 1)]))
        }),
    );

    assert!(runtime.step().await);
    assert_eq!(runtime.result(g), Some(&CellResult::Done(json!(10))));

    runtime.define(start, &[], Program::constant(100)).unwrap();
    runtime.settle().await;
    assert_eq!(runtime.result(g), Some(&CellResult::Done(json!(101))));
}
