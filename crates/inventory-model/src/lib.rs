//! # inventory-model
//!
//! Typed representation of a machine fleet: names, roles, static
//! network addresses, dependency edges, and per-machine provisioning
//! steps.
//!
//! The only way to obtain an [`Inventory`] is through
//! [`Inventory::validate`], which checks:
//!
//! - machine names are unique, non-empty, and usable as state keys
//! - static addresses are unique
//! - every `depends_on` entry names a known machine, never itself
//! - the dependency graph is acyclic
//! - step ids are unique within each machine
//!
//! A validated inventory is an immutable snapshot: machines keep their
//! declaration order, and everything downstream (planning, execution)
//! treats the snapshot as read-only.

pub mod error;
pub mod types;

pub use error::{Result, ValidationError};
pub use types::{CommandSpec, Machine, RetryPolicy, Role, Step};

use std::collections::{HashMap, HashSet};

/// A validated, immutable snapshot of machine definitions.
#[derive(Debug, Clone)]
pub struct Inventory {
    machines: Vec<Machine>,
    index: HashMap<String, usize>,
}

impl Inventory {
    /// Validate a set of machine definitions into an inventory snapshot.
    ///
    /// Declaration order is preserved and later used as the planner's
    /// tie-break, so validation never reorders machines.
    pub fn validate(machines: Vec<Machine>) -> Result<Self> {
        let mut index = HashMap::with_capacity(machines.len());
        let mut addresses: HashMap<std::net::IpAddr, &str> = HashMap::new();

        for (pos, machine) in machines.iter().enumerate() {
            if machine.name.is_empty() {
                return Err(ValidationError::EmptyName);
            }
            // Names double as state store keys (one file per machine),
            // so reject anything that cannot name a file safely.
            if machine.name.contains(['/', '\\']) || machine.name.starts_with('.') {
                return Err(ValidationError::InvalidName {
                    name: machine.name.clone(),
                });
            }
            if index.insert(machine.name.clone(), pos).is_some() {
                return Err(ValidationError::DuplicateName {
                    name: machine.name.clone(),
                });
            }
            if let Some(first) = addresses.insert(machine.static_address, &machine.name) {
                return Err(ValidationError::DuplicateAddress {
                    address: machine.static_address,
                    first: first.to_string(),
                    second: machine.name.clone(),
                });
            }

            let mut step_ids = HashSet::new();
            for step in &machine.steps {
                if !step_ids.insert(step.id.as_str()) {
                    return Err(ValidationError::DuplicateStepId {
                        machine: machine.name.clone(),
                        step: step.id.clone(),
                    });
                }
            }
        }

        for machine in &machines {
            for dep in &machine.depends_on {
                if dep == &machine.name {
                    return Err(ValidationError::SelfDependency {
                        machine: machine.name.clone(),
                    });
                }
                if !index.contains_key(dep) {
                    return Err(ValidationError::UnknownDependency {
                        machine: machine.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        detect_cycle(&machines, &index)?;

        Ok(Self { machines, index })
    }

    /// Machines in declaration order.
    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Look up a machine by name.
    pub fn get(&self, name: &str) -> Option<&Machine> {
        self.index.get(name).map(|&i| &self.machines[i])
    }

    /// Declaration position of a machine, used for stable ordering.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Depth-first cycle detection over depends_on edges.
///
/// On a cycle, reports the offending path with the entry machine
/// repeated at the end, e.g. `a -> b -> a`.
fn detect_cycle(machines: &[Machine], index: &HashMap<String, usize>) -> Result<()> {
    let mut marks = vec![Mark::White; machines.len()];

    for start in 0..machines.len() {
        if marks[start] != Mark::White {
            continue;
        }
        let mut path: Vec<usize> = Vec::new();
        // (machine, next dependency edge to follow)
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
        marks[start] = Mark::Grey;
        path.push(start);

        while let Some(top) = stack.last_mut() {
            let (node, edge) = *top;
            if edge < machines[node].depends_on.len() {
                top.1 += 1;
                let next = index[machines[node].depends_on[edge].as_str()];
                match marks[next] {
                    Mark::White => {
                        marks[next] = Mark::Grey;
                        path.push(next);
                        stack.push((next, 0));
                    }
                    Mark::Grey => {
                        let entry = path.iter().position(|&n| n == next).unwrap_or(0);
                        let mut cycle: Vec<String> = path[entry..]
                            .iter()
                            .map(|&n| machines[n].name.clone())
                            .collect();
                        cycle.push(machines[next].name.clone());
                        return Err(ValidationError::DependencyCycle { path: cycle });
                    }
                    Mark::Black => {}
                }
            } else {
                marks[node] = Mark::Black;
                stack.pop();
                path.pop();
            }
        }
    }

    Ok(())
}
