//! Error types for ripple-core.

use thiserror::Error;

use crate::graph::{CellKey, ModuleId};

/// Result type for ripple-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ripple-core.
///
/// These cover misuse of the runtime API only. Failures of cell programs
/// never surface here; they settle the cell to [`CellResult::Error`].
///
/// [`CellResult::Error`]: crate::result::CellResult::Error
#[derive(Debug, Error)]
pub enum Error {
    /// Module not registered with this runtime.
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// Cell not found (never created, or already removed).
    #[error("cell not found: {0}")]
    CellNotFound(String),

    /// Invalid operation (e.g., registering an unknown module as builtins).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn cell_not_found(key: CellKey) -> Self {
        Error::CellNotFound(key.to_string())
    }
}
