//! Calculation policy propagation.
//!
//! `Always` cells make every cell they transitively depend on `Dependent`;
//! everything else stays `Dormant`. The builtins module is handled first,
//! since local cells resolve names into it.

use crate::graph::{CalculationPolicy, CellKey, ModuleId};

use super::Runtime;

impl Runtime {
    /// Recompute `Dependent` policies for the builtins module and `module`,
    /// then re-verify every cell of both, builtins first.
    pub(crate) fn propagate_liveness(&mut self, module: ModuleId) {
        let scope: Vec<ModuleId> = match self.builtins {
            Some(builtins) if builtins != module => vec![builtins, module],
            _ => vec![module],
        };

        for &target in &scope {
            self.reset_policies(target);
        }
        if let Some(builtins) = self.builtins {
            self.retain_builtins_liveness(builtins, &scope);
        }

        for &target in &scope {
            let keys = self
                .modules
                .get(target.0)
                .map(|m| m.cell_keys())
                .unwrap_or_default();
            for key in keys {
                self.verify(key);
            }
        }
    }

    fn reset_policies(&mut self, module: ModuleId) {
        let Some(owner) = self.modules.get_mut(module.0) else {
            return;
        };
        for cell in owner.cells.values_mut() {
            if cell.policy == CalculationPolicy::Dependent {
                cell.policy = CalculationPolicy::Dormant;
            }
        }

        let roots: Vec<CellKey> = owner
            .cells
            .values()
            .filter(|cell| cell.policy == CalculationPolicy::Always)
            .map(|cell| cell.key())
            .collect();
        for root in roots {
            let dependencies = self.resolved_dependencies(root);
            self.mark_live(dependencies);
        }
    }

    /// Builtins cells stay live while a live cell of a module outside this
    /// pass still depends on them.
    fn retain_builtins_liveness(&mut self, builtins: ModuleId, scope: &[ModuleId]) {
        let reached: Vec<CellKey> = self
            .modules
            .iter()
            .filter(|m| !scope.contains(&m.id))
            .flat_map(|m| {
                m.cells()
                    .filter(|cell| cell.policy != CalculationPolicy::Dormant)
                    .map(|cell| cell.key())
            })
            .flat_map(|key| self.resolved_dependencies(key))
            .filter(|dep| dep.module == builtins)
            .collect();
        self.mark_live(reached);
    }

    /// Mark dormant cells dependent, walking into their dependencies.
    /// Cells that are already live are not walked again, which keeps the
    /// walk linear in edges even through cycles.
    fn mark_live(&mut self, mut stack: Vec<CellKey>) {
        while let Some(key) = stack.pop() {
            let Ok(cell) = self.cell_mut(key) else {
                continue;
            };
            if cell.policy != CalculationPolicy::Dormant {
                continue;
            }
            cell.policy = CalculationPolicy::Dependent;
            tracing::trace!(cell = %key, "marked dependent");
            stack.extend(self.resolved_dependencies(key));
        }
    }

    /// Dependencies of a cell that resolve to some cell, from its own module.
    fn resolved_dependencies(&self, key: CellKey) -> Vec<CellKey> {
        let Some(cell) = self.get(key) else {
            return Vec::new();
        };
        cell.dependencies
            .iter()
            .filter_map(|dep| self.find(key.module, dep.as_str()))
            .collect()
    }
}
