//! Types for the dependency graph.

use serde::{Deserialize, Serialize};

/// Identifier of a module within a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "module_{}", self.0)
    }
}

/// Unique identifier for a cell within a module.
///
/// Ids are assigned in creation order and never reused, so iteration by id
/// is discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub(crate) usize);

impl CellId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Runtime-wide address of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub module: ModuleId,
    pub cell: CellId,
}

impl CellKey {
    pub fn new(module: ModuleId, cell: CellId) -> Self {
        Self { module, cell }
    }
}

impl std::fmt::Display for CellKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.module, self.cell)
    }
}

/// A cell lookup, either by id or by bound name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(CellId),
    Name(&'a str),
}

impl From<CellId> for Lookup<'_> {
    fn from(id: CellId) -> Self {
        Lookup::Id(id)
    }
}

impl<'a> From<&'a str> for Lookup<'a> {
    fn from(name: &'a str) -> Self {
        Lookup::Name(name)
    }
}

impl<'a> From<&'a String> for Lookup<'a> {
    fn from(name: &'a String) -> Self {
        Lookup::Name(name.as_str())
    }
}

/// Liveness of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationPolicy {
    /// Never computed; the result stays `Dormant`.
    Dormant,
    /// Computed because some `Always` cell transitively depends on it.
    /// Assigned by liveness propagation, reset on every pass.
    Dependent,
    /// Always computed; makes its dependency closure `Dependent`.
    #[default]
    Always,
}

/// Structural validity of a cell within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    #[default]
    Okay,
    /// Another cell in the module has the same name.
    DuplicateName,
    /// The cell's name is reachable from its own dependencies.
    DependencyCycle,
    /// Reserved: unresolved names surface as a result-level error, never
    /// as a structural status.
    UndefinedName,
}

impl CellStatus {
    pub fn is_okay(&self) -> bool {
        matches!(self, CellStatus::Okay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let key = CellKey::new(ModuleId(2), CellId::new(7));
        assert_eq!(key.to_string(), "module_2/cell_7");
    }

    #[test]
    fn test_lookup_conversions() {
        assert_eq!(Lookup::from("x"), Lookup::Name("x"));
        assert_eq!(Lookup::from(CellId::new(3)), Lookup::Id(CellId::new(3)));
        let owned = String::from("y");
        assert_eq!(Lookup::from(&owned), Lookup::Name("y"));
    }

    #[test]
    fn test_defaults() {
        assert_eq!(CalculationPolicy::default(), CalculationPolicy::Always);
        assert!(CellStatus::default().is_okay());
        assert!(!CellStatus::DependencyCycle.is_okay());
    }
}
