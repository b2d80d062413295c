//! A namespace of cells.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::graph::{CellEntry, CellId, CellKey, Lookup, ModuleId};

use super::cell::Cell;

/// Owns a set of cells and the derived name bindings.
///
/// The binding table is rebuilt from scratch on every structural change.
pub struct Module {
    pub(crate) id: ModuleId,
    pub(crate) cells: BTreeMap<CellId, Cell>,
    pub(crate) bindings: FxHashMap<String, CellId>,
    next_id: usize,
}

impl Module {
    pub(crate) fn new(id: ModuleId) -> Self {
        Self {
            id,
            cells: BTreeMap::new(),
            bindings: FxHashMap::default(),
            next_id: 0,
        }
    }

    pub(crate) fn next_cell_id(&mut self) -> CellId {
        let id = CellId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Local lookup, no builtins fallback.
    pub fn find_local(&self, lookup: Lookup<'_>) -> Option<CellId> {
        match lookup {
            Lookup::Id(id) => self.cells.contains_key(&id).then_some(id),
            Lookup::Name(name) => self.bindings.get(name).copied(),
        }
    }

    pub fn has(&self, lookup: Lookup<'_>) -> bool {
        self.find_local(lookup).is_some()
    }

    pub fn get(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// Cells in discovery order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn cell_keys(&self) -> Vec<CellKey> {
        self.cells.keys().map(|&id| CellKey::new(self.id, id)).collect()
    }

    /// Cells whose dependency list names `name`.
    pub fn dependents_of(&self, name: &str) -> Vec<CellKey> {
        self.cells
            .values()
            .filter(|cell| cell.depends_on(name))
            .map(Cell::key)
            .collect()
    }

    /// Name to bound cell.
    pub fn bindings(&self) -> &FxHashMap<String, CellId> {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = CellEntry<'_>> {
        self.cells.values().map(|cell| CellEntry {
            id: cell.id,
            name: cell.name.as_deref(),
            dependencies: &cell.dependencies,
        })
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("cells", &self.cells.len())
            .field("bindings", &self.bindings)
            .finish()
    }
}
