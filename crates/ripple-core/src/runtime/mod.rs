//! The reactive runtime.
//!
//! Provides modules of named cells, whole-module validation, liveness
//! propagation, and the shared observer that turns one cell's settlement
//! into the re-verification of its dependents.
//!
//! # Architecture
//!
//! ```text
//! Runtime
//!     │
//!     ├── Module (one per namespace, optionally one designated builtins)
//!     │       │
//!     │       └── Cell ── program ── result ── observers
//!     │
//!     ├── propagation queue   (module, name) of every settled cell
//!     │
//!     └── Scheduler           deferred values and generator steps,
//!                             resumed only if the cell's sequence matches
//! ```
//!
//! Every mutation runs synchronously to completion: validation, liveness,
//! verification of all cells, then the propagation queue is drained to a
//! fixpoint. Asynchronous work only advances inside [`Runtime::settle`] or
//! [`Runtime::step`].
//!
//! # Module Structure
//!
//! - `cell` - Cell state and observer slots
//! - `module` - Cell ownership and name bindings
//! - `verify` - The per-cell verification state machine
//! - `liveness` - Calculation policy propagation
//! - `scheduler` - Continuations guarded by sequence numbers

mod cell;
mod liveness;
mod module;
mod scheduler;
mod verify;

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};
use crate::graph::{CalculationPolicy, CellKey, CellStatus, Lookup, ModuleId, validate};
use crate::observer::Observer;
use crate::program::Program;
use crate::result::CellResult;

pub use cell::Cell;
pub use module::Module;

use cell::ObserverSlot;
use scheduler::Scheduler;

/// Owns modules, the optional builtins module, and all suspended cell work.
pub struct Runtime {
    modules: Vec<Module>,
    builtins: Option<ModuleId>,
    config: RuntimeConfig,
    scheduler: Scheduler,
    /// Settled cells waiting for their dependents to be re-verified.
    propagation: VecDeque<(ModuleId, String)>,
}

/// Inspection view of a cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub key: CellKey,
    pub name: Option<String>,
    pub dependencies: Vec<String>,
    pub policy: CalculationPolicy,
    pub status: CellStatus,
    pub result: CellResult,
    pub sequence: u64,
}

impl From<&Cell> for CellSnapshot {
    fn from(cell: &Cell) -> Self {
        Self {
            key: cell.key(),
            name: cell.name.clone(),
            dependencies: cell.dependencies.clone(),
            policy: cell.policy,
            status: cell.status,
            result: cell.result.clone(),
            sequence: cell.sequence,
        }
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            modules: Vec::new(),
            builtins: None,
            config,
            scheduler: Scheduler::default(),
            propagation: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Create and register a new, empty module.
    pub fn module(&mut self) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(Module::new(id));
        tracing::debug!(module = %id, "module created");
        id
    }

    /// Designate the module every other module falls back to for names it
    /// does not bind. Locals see builtins; builtins never see locals.
    ///
    /// Existing cells are not re-verified; register builtins before defining
    /// cells that rely on them, or mutate those cells afterwards.
    pub fn register_builtins(&mut self, builtins: Option<ModuleId>) -> Result<()> {
        if let Some(id) = builtins {
            if self.modules.get(id.0).is_none() {
                return Err(Error::InvalidOperation(format!(
                    "cannot register unknown {} as builtins",
                    id
                )));
            }
        }
        self.builtins = builtins;
        Ok(())
    }

    pub fn builtins(&self) -> Option<ModuleId> {
        self.builtins
    }

    pub fn module_ref(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    fn module_mut(&mut self, id: ModuleId) -> Result<&mut Module> {
        self.modules.get_mut(id.0).ok_or(Error::ModuleNotFound(id))
    }

    fn ensure_module(&self, id: ModuleId) -> Result<()> {
        self.module_ref(id).map(|_| ()).ok_or(Error::ModuleNotFound(id))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Resolve a cell by id or bound name, falling back to the builtins
    /// module when `module` is not itself the builtins module.
    pub fn find<'a>(&self, module: ModuleId, lookup: impl Into<Lookup<'a>>) -> Option<CellKey> {
        let lookup = lookup.into();
        let local = self.modules.get(module.0)?;
        if let Some(id) = local.find_local(lookup) {
            return Some(CellKey::new(module, id));
        }
        match self.builtins {
            Some(builtins) if builtins != module => {
                let id = self.modules.get(builtins.0)?.find_local(lookup)?;
                Some(CellKey::new(builtins, id))
            }
            _ => None,
        }
    }

    /// Local existence check, without the builtins fallback.
    pub fn has<'a>(&self, module: ModuleId, lookup: impl Into<Lookup<'a>>) -> bool {
        self.modules
            .get(module.0)
            .is_some_and(|m| m.has(lookup.into()))
    }

    pub fn get(&self, key: CellKey) -> Option<&Cell> {
        self.modules.get(key.module.0)?.cells.get(&key.cell)
    }

    pub fn result(&self, key: CellKey) -> Option<&CellResult> {
        self.get(key).map(Cell::result)
    }

    pub fn status(&self, key: CellKey) -> Option<CellStatus> {
        self.get(key).map(Cell::status)
    }

    fn cell_mut(&mut self, key: CellKey) -> Result<&mut Cell> {
        self.modules
            .get_mut(key.module.0)
            .and_then(|m| m.cells.get_mut(&key.cell))
            .ok_or_else(|| Error::cell_not_found(key))
    }

    /// Snapshot of every cell in a module, in discovery order.
    pub fn snapshot(&self, module: ModuleId) -> Result<Vec<CellSnapshot>> {
        let module = self.module_ref(module).ok_or(Error::ModuleNotFound(module))?;
        Ok(module.cells().map(CellSnapshot::from).collect())
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Create a cell in `module`. The policy defaults to `Always`.
    ///
    /// The new cell is verified once, gets the runtime's reactive observer,
    /// and, if named, triggers validation of the module.
    pub fn cell(
        &mut self,
        module: ModuleId,
        name: Option<&str>,
        policy: Option<CalculationPolicy>,
    ) -> Result<CellKey> {
        let owner = self.module_mut(module)?;
        let id = owner.next_cell_id();
        owner
            .cells
            .insert(id, Cell::new(id, module, policy.unwrap_or_default()));
        let key = CellKey::new(module, id);
        tracing::trace!(cell = %key, "cell created");

        self.verify(key);
        self.include_slot(key, ObserverSlot::Runtime);
        if let Some(name) = name {
            self.rename(key, name);
        }
        self.propagate();
        Ok(key)
    }

    /// Detach a cell from its module and re-validate what remains.
    ///
    /// Dependents are not told the name vanished; the re-validation
    /// re-verifies them and they settle on their own (`Pending` if another
    /// cell still answers to the name, `Error("Undefined name: ..")` if not).
    pub fn remove_cell(&mut self, key: CellKey) -> Result<()> {
        let removed = self
            .module_mut(key.module)?
            .cells
            .remove(&key.cell)
            .ok_or_else(|| Error::cell_not_found(key))?;
        tracing::debug!(cell = %key, name = ?removed.name, "cell removed");
        drop(removed);
        self.scheduler.cancel(key);

        self.revalidate(key.module);
        self.propagate();
        Ok(())
    }

    /// Replace name, dependencies and program.
    pub fn redefine(
        &mut self,
        key: CellKey,
        name: &str,
        dependencies: &[&str],
        program: Program,
    ) -> Result<()> {
        let cell = self.cell_mut(key)?;
        cell.set_definition(dependencies, program);
        cell.set_name(Some(name));
        self.revalidate(key.module);
        self.propagate();
        Ok(())
    }

    /// Replace dependencies and program, keeping the name.
    pub fn define(&mut self, key: CellKey, dependencies: &[&str], program: Program) -> Result<()> {
        self.cell_mut(key)?.set_definition(dependencies, program);
        self.revalidate(key.module);
        self.propagate();
        Ok(())
    }

    /// Rename a cell. Re-validates only if the name actually changed.
    pub fn change_name(&mut self, key: CellKey, name: &str) -> Result<()> {
        self.cell_mut(key)?;
        self.rename(key, name);
        self.propagate();
        Ok(())
    }

    fn rename(&mut self, key: CellKey, name: &str) {
        let changed = self
            .cell_mut(key)
            .map(|cell| cell.set_name(Some(name)))
            .unwrap_or(false);
        if changed {
            self.revalidate(key.module);
        }
    }

    /// Change a cell's calculation policy.
    ///
    /// Liveness is not local: making a cell `Always` can wake its whole
    /// dependency closure, so the module's policies are recomputed.
    pub fn set_policy(&mut self, key: CellKey, policy: CalculationPolicy) -> Result<()> {
        let cell = self.cell_mut(key)?;
        if cell.policy == policy {
            return Ok(());
        }
        cell.policy = policy;
        self.propagate_liveness(key.module);
        self.propagate();
        Ok(())
    }

    /// Run the full validation pass for a module: bindings, duplicates,
    /// cycles, statuses, then liveness and verification.
    pub fn cell_renamed(&mut self, module: ModuleId) -> Result<()> {
        self.ensure_module(module)?;
        self.revalidate(module);
        self.propagate();
        Ok(())
    }

    /// Recompute `Dependent` policies for the builtins module and `module`,
    /// then re-verify their cells.
    pub fn reset_dependent_policies(&mut self, module: ModuleId) -> Result<()> {
        self.ensure_module(module)?;
        self.propagate_liveness(module);
        self.propagate();
        Ok(())
    }

    fn revalidate(&mut self, module: ModuleId) {
        let Some(owner) = self.modules.get(module.0) else {
            return;
        };
        let verdict = validate(owner.entries());
        tracing::debug!(
            module = %module,
            bound = verdict.bindings.len(),
            invalid = verdict.statuses.iter().filter(|a| !a.status.is_okay()).count(),
            "module validated"
        );

        if let Some(owner) = self.modules.get_mut(module.0) {
            owner.bindings = verdict.bindings;
        }
        for assignment in verdict.statuses {
            self.set_status(
                CellKey::new(module, assignment.id),
                assignment.status,
                assignment.reason,
            );
        }

        self.propagate_liveness(module);
    }

    /// Leaving `Okay` forces `Error(reason)`, drops the cell's suspended
    /// work and notifies. Moving between non-okay statuses notifies only if
    /// the reason changed. Returning to `Okay` re-verifies.
    fn set_status(&mut self, key: CellKey, status: CellStatus, reason: Option<String>) {
        let Ok(cell) = self.cell_mut(key) else {
            return;
        };
        let previous = cell.status;
        cell.status = status;

        if status.is_okay() {
            if !previous.is_okay() {
                self.verify(key);
            }
            return;
        }
        let reason = reason.unwrap_or_else(|| format!("{:?}", status));
        let changed = cell.set_result(CellResult::Error(reason));
        if previous.is_okay() || changed {
            self.scheduler.cancel(key);
            self.notify(key);
        }
    }

    // =========================================================================
    // Observers
    // =========================================================================

    /// Register an observer. A newly added observer immediately receives
    /// the current result; registering the same observer twice is a no-op.
    pub fn include_observer(&mut self, key: CellKey, observer: Arc<dyn Observer>) -> Result<()> {
        self.cell_mut(key)?;
        self.include_slot(key, ObserverSlot::External(observer));
        self.propagate();
        Ok(())
    }

    /// Unregister an observer. Returns whether it was registered.
    pub fn remove_observer(&mut self, key: CellKey, observer: &Arc<dyn Observer>) -> Result<bool> {
        Ok(self.cell_mut(key)?.remove_observer(observer))
    }

    fn include_slot(&mut self, key: CellKey, slot: ObserverSlot) {
        let Ok(cell) = self.cell_mut(key) else {
            return;
        };
        if !cell.add_observer(slot.clone()) {
            return;
        }
        match slot {
            ObserverSlot::Runtime => self.enqueue_settled(key),
            ObserverSlot::External(observer) => {
                if let Some(cell) = self.get(key) {
                    deliver(cell, observer.as_ref());
                }
            }
        }
    }

    /// Deliver the current result to every observer in registration order.
    pub(crate) fn notify(&mut self, key: CellKey) {
        let Some(cell) = self
            .modules
            .get(key.module.0)
            .and_then(|m| m.cells.get(&key.cell))
        else {
            return;
        };

        let mut reactive = false;
        for slot in &cell.observers {
            match slot {
                ObserverSlot::Runtime => reactive = true,
                ObserverSlot::External(observer) => deliver(cell, observer.as_ref()),
            }
        }
        if reactive {
            if let Some(name) = &cell.name {
                self.propagation.push_back((key.module, name.clone()));
            }
        }
    }

    fn enqueue_settled(&mut self, key: CellKey) {
        if let Some(name) = self.get(key).and_then(|cell| cell.name.clone()) {
            self.propagation.push_back((key.module, name));
        }
    }

    // =========================================================================
    // Propagation
    // =========================================================================

    /// Drain the propagation queue: re-verify the dependents of every
    /// settled name until nothing changes any more.
    fn propagate(&mut self) {
        while let Some((module, name)) = self.propagation.pop_front() {
            for target in self.dependent_scopes(module, &name) {
                let dependents = self
                    .modules
                    .get(target.0)
                    .map(|m| m.dependents_of(&name))
                    .unwrap_or_default();
                for key in dependents {
                    self.verify(key);
                }
            }
        }
    }

    /// Modules whose cells may resolve `name` to a cell of `module`.
    ///
    /// A builtins name is visible in the builtins module itself and in every
    /// module that does not shadow it with a local binding.
    fn dependent_scopes(&self, module: ModuleId, name: &str) -> Vec<ModuleId> {
        if self.builtins != Some(module) {
            return vec![module];
        }
        self.modules
            .iter()
            .filter(|m| m.id == module || !m.has(Lookup::Name(name)))
            .map(|m| m.id)
            .collect()
    }

    // =========================================================================
    // Asynchronous settlement
    // =========================================================================

    /// Number of cells with suspended work that may still settle them.
    pub fn outstanding(&self) -> usize {
        self.scheduler.len()
    }

    /// Resume exactly one continuation, waiting for it if necessary.
    /// Returns `false` when nothing is outstanding.
    pub async fn step(&mut self) -> bool {
        match self.scheduler.next().await {
            Some(continuation) => {
                self.resume(continuation);
                self.propagate();
                true
            }
            None => false,
        }
    }

    /// Drive all suspended work until none remains.
    ///
    /// A generator that never finishes keeps this running; bound it with
    /// `tokio::time::timeout` or drive [`step`](Self::step) directly.
    pub async fn settle(&mut self) {
        while self.step().await {}
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(cell: &Cell, observer: &dyn Observer) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| match cell.result() {
        CellResult::Done(value) => observer.fulfilled(cell, value),
        CellResult::Pending(_) => observer.pending(cell),
        CellResult::Error(reason) => observer.rejected(cell, Some(reason)),
        CellResult::Dormant => observer.rejected(cell, None),
    }));
    if let Err(panic) = outcome {
        tracing::error!(
            "observer of cell {} ({:?}) panicked: {}",
            cell.key(),
            cell.name(),
            panic_message(panic.as_ref())
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
