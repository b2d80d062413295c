//! Graph identities and structural validation.
//!
//! This module provides:
//! - Module and cell identifiers
//! - Calculation policies and structural statuses
//! - Name binding, duplicate detection and cycle detection over a snapshot

mod types;
mod validate;

pub use types::{CalculationPolicy, CellId, CellKey, CellStatus, Lookup, ModuleId};
pub use validate::{CellEntry, StatusAssignment, Verdict, validate};
