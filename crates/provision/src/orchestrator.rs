//! Top-level driver: plan, dispatch waves, propagate failure,
//! aggregate the run report.
//!
//! Machines with no dependency relationship run in parallel inside a
//! wave; machines linked by `depends_on` are strictly sequenced across
//! waves. Before a machine is dispatched its dependencies' terminal
//! statuses are checked, so a failed (or skipped) prerequisite marks
//! every dependent machine skipped without invoking a single command.

use crate::context::{CancelToken, CommandRunner, NoProgress, ProgressCallback};
use crate::planner;
use crate::report::{MachineReport, MachineStatus, RunReport};
use crate::runner::ActionRunner;
use anyhow::{Context, Result};
use inventory_model::Inventory;
use rayon::prelude::*;
use statestore::StateStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Options for an orchestrated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Don't invoke commands or touch state, just report what would run
    pub dry_run: bool,
    /// Parallelism within a wave
    pub jobs: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
        }
    }
}

/// Drives a full fleet run against a validated inventory.
pub struct Orchestrator {
    store: Arc<dyn StateStore>,
    commands: Arc<dyn CommandRunner>,
    opts: RunOptions,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn StateStore>, commands: Arc<dyn CommandRunner>) -> Self {
        Self {
            store,
            commands,
            opts: RunOptions::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, opts: RunOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the whole fleet, one ready-set wave at a time.
    pub fn run(&self, inventory: &Inventory) -> Result<RunReport> {
        self.run_with_progress(inventory, &mut NoProgress)
    }

    pub fn run_with_progress<P: ProgressCallback>(
        &self,
        inventory: &Inventory,
        progress: &mut P,
    ) -> Result<RunReport> {
        let plan = planner::plan(inventory).context("planning machine order")?;
        let total_waves = plan.waves().len();

        // Terminal status per machine, filled in wave by wave
        let mut terminal: HashMap<String, bool> = HashMap::new();
        let mut reports: Vec<MachineReport> = Vec::with_capacity(inventory.len());

        for (wave_index, wave) in plan.waves().iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("run cancelled; not dispatching wave {}", wave_index + 1);
                for name in plan.waves()[wave_index..].iter().flatten() {
                    reports.push(MachineReport::new(name, MachineStatus::Cancelled));
                }
                break;
            }

            let wave_names: Vec<&str> = wave.iter().map(String::as_str).collect();
            progress.on_wave_start(wave_index + 1, total_waves, &wave_names);

            // Dependency gate: a machine whose prerequisites did not
            // all succeed is skipped, never dispatched.
            let mut ready = Vec::new();
            for name in wave {
                let machine = inventory
                    .get(name)
                    .expect("planned machine exists in inventory");
                let unmet: Vec<String> = machine
                    .depends_on
                    .iter()
                    .filter(|dep| !terminal.get(dep.as_str()).copied().unwrap_or(false))
                    .cloned()
                    .collect();

                if unmet.is_empty() {
                    ready.push(machine);
                } else {
                    log::info!("{name}: skipped, unmet dependencies: {}", unmet.join(", "));
                    // Terminal but not successful, so dependents of
                    // this machine are skipped in later waves too.
                    terminal.insert(name.clone(), false);
                    reports.push(MachineReport::new(name, MachineStatus::Skipped { unmet }));
                }
            }

            let wave_reports = self.run_wave(&ready)?;
            for report in wave_reports {
                terminal.insert(report.name.clone(), report.status.is_success());
                reports.push(report);
            }

            for name in &wave_names {
                if let Some(report) = reports.iter().find(|r| &r.name == name) {
                    progress.on_machine_complete(name, &report.status);
                }
            }
        }

        // Report in inventory declaration order, independent of wave
        // and completion order.
        reports.sort_by_key(|r| inventory.position(&r.name).unwrap_or(usize::MAX));
        Ok(RunReport { machines: reports })
    }

    /// Execute one ready set, in parallel when it has more than one
    /// machine and jobs allow.
    fn run_wave(&self, machines: &[&inventory_model::Machine]) -> Result<Vec<MachineReport>> {
        if machines.is_empty() {
            return Ok(Vec::new());
        }

        if self.opts.jobs <= 1 || machines.len() == 1 {
            let mut reports = Vec::with_capacity(machines.len());
            for machine in machines {
                reports.push(self.run_machine(machine)?);
            }
            return Ok(reports);
        }

        let results: Arc<Mutex<Vec<Result<MachineReport>>>> =
            Arc::new(Mutex::new(Vec::with_capacity(machines.len())));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.jobs.min(machines.len()))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to create thread pool: {e}"))?;

        pool.install(|| {
            machines.par_iter().for_each(|machine| {
                let result = self.run_machine(machine);
                results.lock().unwrap().push(result);
            });
        });

        let results = Arc::try_unwrap(results)
            .map_err(|_| anyhow::anyhow!("wave results still shared"))?
            .into_inner()
            .unwrap();

        results.into_iter().collect()
    }

    fn run_machine(&self, machine: &inventory_model::Machine) -> Result<MachineReport> {
        log::info!("provisioning {} ({})", machine.name, machine.static_address);
        ActionRunner::new(self.store.as_ref(), self.commands.as_ref())
            .dry_run(self.opts.dry_run)
            .with_cancel(self.cancel.clone())
            .run_machine(machine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CommandOutput;
    use crate::error::StepError;
    use crate::report::StepOutcome;
    use inventory_model::{CommandSpec, Machine, RetryPolicy, Role, Step};
    use statestore::{MemoryStore, StepStatus};
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::time::Duration;

    #[derive(Default)]
    struct ScriptedRunner {
        fail: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn failing(programs: &[&str]) -> Self {
            Self {
                fail: programs.iter().map(|s| (*s).to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(
            &self,
            cmd: &CommandSpec,
            _timeout: Option<Duration>,
        ) -> std::result::Result<CommandOutput, StepError> {
            self.calls.lock().unwrap().push(cmd.program.clone());
            Ok(CommandOutput {
                stdout: Vec::new(),
                stderr: b"boom".to_vec(),
                success: !self.fail.contains(&cmd.program),
            })
        }
    }

    fn step(id: &str, program: &str) -> Step {
        Step {
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay_secs: 0.0,
                backoff_factor: 1.0,
                max_delay_secs: 0.0,
            },
            ..Step::new(id, CommandSpec::new(program, &[]))
        }
    }

    fn machine(name: &str, last: u8, deps: &[&str], steps: Vec<Step>) -> Machine {
        let addr: IpAddr = format!("10.0.0.{last}").parse().unwrap();
        Machine {
            depends_on: deps.iter().map(|s| (*s).to_string()).collect(),
            steps,
            ..Machine::new(name, Role::Host, addr)
        }
    }

    fn orchestrator(commands: ScriptedRunner) -> (Orchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let orch = Orchestrator::new(store.clone(), Arc::new(commands));
        (orch, store)
    }

    #[test]
    fn test_full_fleet_succeeds() {
        let (orch, _store) = orchestrator(ScriptedRunner::default());
        let inv = Inventory::validate(vec![
            machine("dc", 1, &[], vec![step("promote", "promoter")]),
            machine("node1", 2, &["dc"], vec![step("join", "joiner")]),
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();
        assert!(report.is_success());
        assert_eq!(report.machines.len(), 2);
    }

    #[test]
    fn test_failed_dependency_skips_downstream() {
        // The concrete scenario: dc's "promote-to-controller" fails,
        // node1 must be skipped with no attempt records at all.
        let commands = ScriptedRunner::failing(&["promoter"]);
        let (orch, store) = orchestrator(commands);
        let inv = Inventory::validate(vec![
            Machine {
                depends_on: vec![],
                steps: vec![step("promote-to-controller", "promoter")],
                ..Machine::new("dc", Role::DomainController, "10.0.0.1".parse().unwrap())
            },
            Machine {
                depends_on: vec!["dc".into()],
                steps: vec![step("join-domain", "joiner")],
                ..Machine::new("node1", Role::DomainMember, "10.0.0.2".parse().unwrap())
            },
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();

        assert_eq!(report.get("dc").unwrap().status, MachineStatus::Failed);
        assert_eq!(
            report.get("node1").unwrap().status,
            MachineStatus::Skipped { unmet: vec!["dc".into()] }
        );
        assert!(store.records_for("node1").unwrap().is_empty());
        assert_eq!(
            store.get("dc", "promote-to-controller").unwrap().unwrap().status,
            StepStatus::Failed
        );
    }

    #[test]
    fn test_skip_propagates_transitively() {
        let commands = ScriptedRunner::failing(&["promoter"]);
        let (orch, _store) = orchestrator(commands);
        let inv = Inventory::validate(vec![
            machine("dc", 1, &[], vec![step("promote", "promoter")]),
            machine("node1", 2, &["dc"], vec![step("join", "joiner")]),
            machine("app", 3, &["node1"], vec![step("deploy", "deployer")]),
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();

        assert_eq!(
            report.get("node1").unwrap().status,
            MachineStatus::Skipped { unmet: vec!["dc".into()] }
        );
        // app's unmet dependency is node1, not dc: failure propagates
        // along each edge exactly once.
        assert_eq!(
            report.get("app").unwrap().status,
            MachineStatus::Skipped { unmet: vec!["node1".into()] }
        );
    }

    #[test]
    fn test_sibling_machines_unaffected_by_failure() {
        let commands = ScriptedRunner::failing(&["promoter"]);
        let (orch, _store) = orchestrator(commands);
        let inv = Inventory::validate(vec![
            machine("dc", 1, &[], vec![step("promote", "promoter")]),
            machine("standalone", 2, &[], vec![step("setup", "setupper")]),
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();

        assert_eq!(report.get("dc").unwrap().status, MachineStatus::Failed);
        assert_eq!(report.get("standalone").unwrap().status, MachineStatus::Succeeded);
    }

    #[test]
    fn test_parallel_wave_runs_all_machines() {
        let (orch, _store) = orchestrator(ScriptedRunner::default());
        let orch = orch.with_options(RunOptions {
            jobs: 4,
            ..RunOptions::default()
        });
        let inv = Inventory::validate(vec![
            machine("a", 1, &[], vec![step("s", "pa")]),
            machine("b", 2, &[], vec![step("s", "pb")]),
            machine("c", 3, &[], vec![step("s", "pc")]),
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();

        assert!(report.is_success());
        // Declaration order regardless of parallel completion order
        let names: Vec<&str> = report.machines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_cancellation_before_later_wave() {
        let (orch, store) = orchestrator(ScriptedRunner::default());
        let cancel = CancelToken::new();

        struct CancelAfterFirstWave {
            cancel: CancelToken,
        }
        impl ProgressCallback for CancelAfterFirstWave {
            fn on_wave_start(&mut self, _w: usize, _t: usize, _m: &[&str]) {}
            fn on_machine_complete(&mut self, _name: &str, _status: &MachineStatus) {
                self.cancel.cancel();
            }
        }

        let orch = orch.with_cancel(cancel.clone());
        let inv = Inventory::validate(vec![
            machine("dc", 1, &[], vec![step("promote", "promoter")]),
            machine("node1", 2, &["dc"], vec![step("join", "joiner")]),
        ])
        .unwrap();

        let mut progress = CancelAfterFirstWave { cancel };
        let report = orch.run_with_progress(&inv, &mut progress).unwrap();

        assert_eq!(report.get("dc").unwrap().status, MachineStatus::Succeeded);
        assert_eq!(report.get("node1").unwrap().status, MachineStatus::Cancelled);
        // Recorded state from before the cancellation is preserved
        assert_eq!(
            store.get("dc", "promote").unwrap().unwrap().status,
            StepStatus::Succeeded
        );
        assert!(store.records_for("node1").unwrap().is_empty());
    }

    #[test]
    fn test_dry_run_invokes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let commands = Arc::new(ScriptedRunner::default());
        let orch = Orchestrator::new(store.clone(), commands.clone()).with_options(RunOptions {
            dry_run: true,
            jobs: 1,
        });
        let inv = Inventory::validate(vec![
            machine("dc", 1, &[], vec![step("promote", "promoter")]),
        ])
        .unwrap();

        let report = orch.run(&inv).unwrap();

        assert_eq!(report.get("dc").unwrap().steps[0].outcome, StepOutcome::WouldApply);
        assert!(commands.calls().is_empty());
        assert!(store.records_for("dc").unwrap().is_empty());
    }
}
