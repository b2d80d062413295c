//! The settled outcome of a cell.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A cell's current result.
///
/// Compared by value: the runtime only notifies observers when the
/// `(kind, value)` pair actually changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellResult {
    /// The cell's policy suppresses computation.
    Dormant,
    /// Waiting on dependencies or on a deferred value. Carries the last
    /// settled value, if any.
    Pending(Option<Value>),
    /// Settled successfully.
    Done(Value),
    /// Settled with a failure reason.
    Error(String),
}

impl CellResult {
    /// `Pending`, carrying forward whatever value this result holds.
    pub fn pending_from(previous: &CellResult) -> Self {
        match previous {
            CellResult::Done(value) => CellResult::Pending(Some(value.clone())),
            CellResult::Pending(value) => CellResult::Pending(value.clone()),
            CellResult::Dormant | CellResult::Error(_) => CellResult::Pending(None),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, CellResult::Done(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CellResult::Pending(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellResult::Error(_))
    }

    /// The settled value, if `Done`.
    pub fn value(&self) -> Option<&Value> {
        match self {
            CellResult::Done(value) => Some(value),
            _ => None,
        }
    }

    /// The failure reason, if `Error`.
    pub fn reason(&self) -> Option<&str> {
        match self {
            CellResult::Error(reason) => Some(reason),
            _ => None,
        }
    }
}

impl Default for CellResult {
    fn default() -> Self {
        CellResult::Pending(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_carries_last_value() {
        let done = CellResult::Done(json!(10));
        assert_eq!(
            CellResult::pending_from(&done),
            CellResult::Pending(Some(json!(10)))
        );
        assert_eq!(
            CellResult::pending_from(&CellResult::pending_from(&done)),
            CellResult::Pending(Some(json!(10)))
        );
        assert_eq!(
            CellResult::pending_from(&CellResult::Error("boom".into())),
            CellResult::Pending(None)
        );
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(CellResult::Done(json!({"a": [1, 2]})), CellResult::Done(json!({"a": [1, 2]})));
        assert_ne!(CellResult::Done(json!(1)), CellResult::Pending(Some(json!(1))));
    }

    #[test]
    fn test_serialized_shape() {
        assert_eq!(
            serde_json::to_value(CellResult::Done(json!(20))).unwrap(),
            json!({"type": "DONE", "value": 20})
        );
        assert_eq!(
            serde_json::to_value(CellResult::Dormant).unwrap(),
            json!({"type": "DORMANT"})
        );
        assert_eq!(
            serde_json::to_value(CellResult::Error("Undefined name: b".into())).unwrap(),
            json!({"type": "ERROR", "value": "Undefined name: b"})
        );
    }

    #[test]
    fn test_accessors() {
        let done = CellResult::Done(json!("x"));
        assert!(done.is_done());
        assert_eq!(done.value(), Some(&json!("x")));
        assert_eq!(done.reason(), None);
        assert_eq!(CellResult::Error("e".into()).reason(), Some("e"));
        assert!(CellResult::default().is_pending());
    }
}
