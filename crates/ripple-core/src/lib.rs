//! Core engine for Ripple reactive dataflow graphs.
//!
//! This crate provides:
//! - Modules of named cells with a shared builtins fallback scope
//! - Whole-module validation (duplicate names, dependency cycles)
//! - Liveness propagation through calculation policies
//! - Verification of cells with immediate, deferred and generator results
//! - Sequence-guarded settlement, so only the latest recomputation wins
//!
//! Cell programs arrive ready-made as a `{name, dependencies, program}`
//! triple; results leave through [`Observer`]s.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ripple_core::{CalculationPolicy, CellResult, Produced, Program, Runtime};
//! use serde_json::json;
//!
//! # async fn demo() -> ripple_core::Result<()> {
//! let mut runtime = Runtime::new();
//! let module = runtime.module();
//!
//! let x = runtime.cell(module, Some("x"), None)?;
//! runtime.define(x, &[], Program::constant(10))?;
//!
//! let y = runtime.cell(module, None, Some(CalculationPolicy::Always))?;
//! runtime.redefine(
//!     y,
//!     "y",
//!     &["x"],
//!     Program::function(|args| Ok(Produced::value(args[0].as_i64().unwrap_or(0) * 2))),
//! )?;
//!
//! runtime.settle().await;
//! assert_eq!(runtime.result(y), Some(&CellResult::Done(json!(20))));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod observer;
pub mod program;
pub mod result;
pub mod runtime;

pub use config::RuntimeConfig;
pub use error::{Error, Result};
pub use graph::{CalculationPolicy, CellId, CellKey, CellStatus, Lookup, ModuleId};
pub use observer::{CellEvent, ChannelObserver, Observer};
pub use program::{Deferred, Generator, Produced, Program, Yield};
pub use result::CellResult;
pub use runtime::{Cell, CellSnapshot, Module, Runtime};
