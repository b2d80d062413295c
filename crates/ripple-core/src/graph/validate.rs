//! Whole-module structural validation.
//!
//! [`validate`] is a pure function over a snapshot of `(id, name, dependencies)`
//! entries. It is re-run in full after every structural change; nothing is
//! maintained incrementally.

use rustc_hash::{FxHashMap, FxHashSet};

use super::types::{CellId, CellStatus};

/// One cell as seen by validation.
#[derive(Debug, Clone, Copy)]
pub struct CellEntry<'a> {
    pub id: CellId,
    pub name: Option<&'a str>,
    pub dependencies: &'a [String],
}

/// Status decided for one cell, with the reason reported for non-okay statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusAssignment {
    pub id: CellId,
    pub status: CellStatus,
    pub reason: Option<String>,
}

/// Outcome of validating a module.
#[derive(Debug, Clone, Default)]
pub struct Verdict {
    /// Name to the first cell discovered with that name.
    pub bindings: FxHashMap<String, CellId>,
    /// One assignment per entry, in input order.
    pub statuses: Vec<StatusAssignment>,
}

impl Verdict {
    pub fn status_of(&self, id: CellId) -> Option<CellStatus> {
        self.statuses.iter().find(|a| a.id == id).map(|a| a.status)
    }
}

/// Validate a snapshot of cells, given in discovery order.
///
/// The first cell per name wins the binding. Every cell carrying a name that
/// occurs more than once gets `DuplicateName`. A named cell whose transitive
/// dependency closure contains its own name gets `DependencyCycle`.
pub fn validate<'a>(entries: impl IntoIterator<Item = CellEntry<'a>>) -> Verdict {
    let entries: Vec<CellEntry<'a>> = entries.into_iter().collect();

    let mut bindings = FxHashMap::default();
    let mut bound: Vec<&'a str> = Vec::new();
    let mut duplicates: FxHashSet<&'a str> = FxHashSet::default();
    let mut closure: FxHashMap<&'a str, FxHashSet<&'a str>> = FxHashMap::default();

    for entry in &entries {
        let Some(name) = entry.name else { continue };
        if bindings.contains_key(name) {
            duplicates.insert(name);
        } else {
            bindings.insert(name.to_string(), entry.id);
            bound.push(name);
            closure.insert(name, entry.dependencies.iter().map(String::as_str).collect());
        }
    }

    relax(&bound, &mut closure);

    let statuses = entries
        .iter()
        .map(|entry| {
            let (status, reason) = match entry.name {
                None => (CellStatus::Okay, None),
                Some(name) if duplicates.contains(name) => {
                    (CellStatus::DuplicateName, Some("Duplicate name".to_string()))
                }
                Some(name) if closure.get(name).is_some_and(|deps| deps.contains(name)) => (
                    CellStatus::DependencyCycle,
                    Some(format!(
                        "Dependency cycle: {}",
                        cycle_members(name, &bound, &closure).join(", ")
                    )),
                ),
                Some(_) => (CellStatus::Okay, None),
            };
            StatusAssignment {
                id: entry.id,
                status,
                reason,
            }
        })
        .collect();

    if !duplicates.is_empty() {
        tracing::debug!("duplicate names: {:?}", duplicates);
    }

    Verdict { bindings, statuses }
}

/// Grow every dependency set by the sets of the names it already contains,
/// until no set grows. Sets only grow and are bounded by the name universe,
/// so this terminates.
fn relax<'a>(order: &[&'a str], closure: &mut FxHashMap<&'a str, FxHashSet<&'a str>>) {
    let mut changed = true;
    while changed {
        changed = false;
        for name in order {
            let current = &closure[name];
            let mut grown = current.clone();
            for dep in current {
                if let Some(further) = closure.get(dep) {
                    grown.extend(further.iter().copied());
                }
            }
            if grown.len() != current.len() {
                closure.insert(*name, grown);
                changed = true;
            }
        }
    }
}

/// Names on a cycle through `name`, in discovery order.
fn cycle_members<'a>(
    name: &str,
    order: &[&'a str],
    closure: &FxHashMap<&'a str, FxHashSet<&'a str>>,
) -> Vec<&'a str> {
    let reaches = |from: &str, to: &str| closure.get(from).is_some_and(|deps| deps.contains(to));
    order
        .iter()
        .copied()
        .filter(|&other| other == name || (reaches(name, other) && reaches(other, name)))
        .collect()
}
