//! Dependency planner: orders machines into ready-set waves.
//!
//! Wave k holds every machine whose dependencies all live in waves
//! before k. Machines inside a wave have no ordering relationship and
//! may be provisioned in parallel; the flattened wave sequence is a
//! topological order of the whole fleet.

use crate::error::PlanError;
use inventory_model::Inventory;
use std::collections::HashMap;

/// Derived execution order. Computed fresh from the inventory on every
/// run; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    waves: Vec<Vec<String>>,
}

impl Plan {
    /// Batches of machines whose dependencies are all in earlier waves.
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    /// Flattened total order over all machines.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }

    pub fn machine_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Compute the wave plan for a validated inventory.
///
/// Ties (machines eligible in the same wave) break by declaration
/// order, so the plan is reproducible run to run. The cycle re-check
/// is defensive: [`Inventory::validate`] already rejects cycles.
pub fn plan(inventory: &Inventory) -> Result<Plan, PlanError> {
    let names: Vec<&str> = inventory
        .machines()
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    let deps: HashMap<&str, Vec<&str>> = inventory
        .machines()
        .iter()
        .map(|m| {
            (
                m.name.as_str(),
                m.depends_on.iter().map(String::as_str).collect(),
            )
        })
        .collect();

    build_waves(&names, &deps)
}

/// Kahn's algorithm, wave by wave, preserving `names` order inside
/// each wave.
fn build_waves(names: &[&str], deps: &HashMap<&str, Vec<&str>>) -> Result<Plan, PlanError> {
    let mut remaining: Vec<&str> = names.to_vec();
    let mut placed: HashMap<&str, usize> = HashMap::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|name| {
                deps.get(name)
                    .is_none_or(|d| d.iter().all(|dep| placed.contains_key(dep)))
            })
            .collect();

        if ready.is_empty() {
            // Only a cycle can starve the ready set
            return Err(PlanError::Cycle {
                remaining: remaining.iter().map(|s| (*s).to_string()).collect(),
            });
        }

        let wave_index = waves.len();
        for name in &ready {
            placed.insert(*name, wave_index);
        }
        remaining.retain(|name| !placed.contains_key(name));
        waves.push(ready.iter().map(|s| (*s).to_string()).collect());
    }

    Ok(Plan { waves })
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_model::{Machine, Role};
    use std::net::IpAddr;

    fn machine(name: &str, last: u8, depends_on: &[&str]) -> Machine {
        let addr: IpAddr = format!("10.0.0.{last}").parse().unwrap();
        Machine {
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            ..Machine::new(name, Role::Host, addr)
        }
    }

    fn plan_of(machines: Vec<Machine>) -> Plan {
        plan(&Inventory::validate(machines).unwrap()).unwrap()
    }

    #[test]
    fn test_every_machine_after_its_dependencies() {
        let plan = plan_of(vec![
            machine("node2", 3, &["dc"]),
            machine("dc", 1, &[]),
            machine("node1", 2, &["dc"]),
            machine("app", 4, &["node1", "node2"]),
        ]);

        let order: Vec<&str> = plan.order().collect();
        let pos = |n: &str| order.iter().position(|&m| m == n).unwrap();
        assert!(pos("dc") < pos("node1"));
        assert!(pos("dc") < pos("node2"));
        assert!(pos("node1") < pos("app"));
        assert!(pos("node2") < pos("app"));
    }

    #[test]
    fn test_waves_are_minimal_depth() {
        let plan = plan_of(vec![
            machine("dc", 1, &[]),
            machine("standalone", 2, &[]),
            machine("node1", 3, &["dc"]),
            machine("app", 4, &["node1"]),
        ]);

        assert_eq!(
            plan.waves(),
            [
                vec!["dc".to_string(), "standalone".to_string()],
                vec!["node1".to_string()],
                vec!["app".to_string()],
            ]
        );
    }

    #[test]
    fn test_tie_break_is_declaration_order() {
        let plan = plan_of(vec![
            machine("zeta", 1, &[]),
            machine("alpha", 2, &[]),
            machine("mid", 3, &[]),
        ]);

        // Alphabetical would say otherwise; declaration order wins.
        assert_eq!(plan.waves()[0], ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_plan_is_deterministic() {
        let build = || {
            plan_of(vec![
                machine("dc", 1, &[]),
                machine("node1", 2, &["dc"]),
                machine("node2", 3, &["dc"]),
            ])
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_empty_inventory_gives_empty_plan() {
        let plan = plan_of(vec![]);
        assert!(plan.is_empty());
        assert_eq!(plan.machine_count(), 0);
    }

    #[test]
    fn test_defensive_cycle_check() {
        // Validation rejects cycles before planning, so exercise the
        // re-check directly with a hand-built graph.
        let names = ["a", "b"];
        let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
        deps.insert("a", vec!["b"]);
        deps.insert("b", vec!["a"]);

        let err = build_waves(&names, &deps).unwrap_err();
        assert_eq!(
            err,
            PlanError::Cycle {
                remaining: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn test_partial_cycle_schedules_acyclic_part_first() {
        let names = ["ok", "a", "b"];
        let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
        deps.insert("ok", vec![]);
        deps.insert("a", vec!["b"]);
        deps.insert("b", vec!["a"]);

        let err = build_waves(&names, &deps).unwrap_err();
        // The cycle error names only the unschedulable machines.
        assert_eq!(
            err,
            PlanError::Cycle {
                remaining: vec!["a".into(), "b".into()],
            }
        );
    }
}
