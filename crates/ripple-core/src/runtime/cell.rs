//! A single reactive cell.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::graph::{CalculationPolicy, CellId, CellKey, CellStatus, ModuleId};
use crate::observer::Observer;
use crate::program::Program;
use crate::result::CellResult;

/// An entry in a cell's observer list.
#[derive(Clone)]
pub(crate) enum ObserverSlot {
    /// The runtime's shared reactive observer.
    Runtime,
    External(Arc<dyn Observer>),
}

impl ObserverSlot {
    fn is_same(&self, other: &ObserverSlot) -> bool {
        match (self, other) {
            (ObserverSlot::Runtime, ObserverSlot::Runtime) => true,
            (ObserverSlot::External(a), ObserverSlot::External(b)) => same_observer(a, b),
            _ => false,
        }
    }
}

pub(crate) fn same_observer(a: &Arc<dyn Observer>, b: &Arc<dyn Observer>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// One reactive unit: a name, its dependencies, a program, and the live result.
///
/// Cells are owned by their module and only mutated through the
/// [`Runtime`](super::Runtime).
pub struct Cell {
    pub(crate) id: CellId,
    pub(crate) module: ModuleId,
    pub(crate) name: Option<String>,
    pub(crate) dependencies: Vec<String>,
    pub(crate) program: Program,
    pub(crate) policy: CalculationPolicy,
    pub(crate) status: CellStatus,
    pub(crate) result: CellResult,
    /// Bumped once per verification; stale continuations compare against it.
    pub(crate) sequence: u64,
    /// Values of the dependencies whose cells are currently `Done`.
    pub(crate) bindings: FxHashMap<String, Value>,
    pub(crate) observers: Vec<ObserverSlot>,
}

impl Cell {
    pub(crate) fn new(id: CellId, module: ModuleId, policy: CalculationPolicy) -> Self {
        Self {
            id,
            module,
            name: None,
            dependencies: Vec::new(),
            program: Program::default(),
            policy,
            status: CellStatus::Okay,
            result: CellResult::default(),
            sequence: 0,
            bindings: FxHashMap::default(),
            observers: Vec::new(),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn key(&self) -> CellKey {
        CellKey::new(self.module, self.id)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn policy(&self) -> CalculationPolicy {
        self.policy
    }

    pub fn status(&self) -> CellStatus {
        self.status
    }

    pub fn result(&self) -> &CellResult {
        &self.result
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn bindings(&self) -> &FxHashMap<String, Value> {
        &self.bindings
    }

    /// Number of registered observers, the runtime's own included.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d == name)
    }

    /// Replace dependencies and program. Duplicate dependency names are
    /// collapsed, keeping the first occurrence.
    pub(crate) fn set_definition(&mut self, dependencies: &[&str], program: Program) {
        let mut unique: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !unique.iter().any(|d| d == dep) {
                unique.push((*dep).to_string());
            }
        }
        self.dependencies = unique;
        self.program = program;
    }

    /// Returns `true` if the name changed.
    pub(crate) fn set_name(&mut self, name: Option<&str>) -> bool {
        if self.name.as_deref() == name {
            return false;
        }
        self.name = name.map(str::to_string);
        true
    }

    /// Start a verification attempt and return its sequence number.
    pub(crate) fn begin_verification(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub(crate) fn is_current(&self, sequence: u64) -> bool {
        self.status.is_okay() && self.sequence == sequence
    }

    /// Returns `true` if the result changed.
    pub(crate) fn set_result(&mut self, result: CellResult) -> bool {
        if self.result == result {
            return false;
        }
        self.result = result;
        true
    }

    /// Returns `true` if the slot was added.
    pub(crate) fn add_observer(&mut self, slot: ObserverSlot) -> bool {
        if self.observers.iter().any(|o| o.is_same(&slot)) {
            return false;
        }
        self.observers.push(slot);
        true
    }

    pub(crate) fn remove_observer(&mut self, observer: &Arc<dyn Observer>) -> bool {
        let slot = ObserverSlot::External(observer.clone());
        let before = self.observers.len();
        self.observers.retain(|o| !o.is_same(&slot));
        self.observers.len() != before
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("key", &self.key())
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("policy", &self.policy)
            .field("status", &self.status)
            .field("result", &self.result)
            .field("sequence", &self.sequence)
            .finish()
    }
}
