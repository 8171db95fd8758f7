//! Action runner: executes one machine's step list in declared order.
//!
//! The runner is what makes reruns safe and cheap. Before invoking
//! anything it consults the state store: a recorded success whose
//! fingerprint still matches the step definition is skipped outright.
//! Every state transition is persisted (durably) before the next step
//! starts, so a crash after step N leaves the store reflecting steps
//! 1..N exactly and a rerun resumes at N+1.

use crate::context::{CancelToken, CommandRunner};
use crate::error::StepError;
use crate::report::{MachineReport, MachineStatus, StepOutcome, StepReport};
use anyhow::{Context, Result};
use inventory_model::{Machine, Step};
use statestore::{RunRecord, StateStore, StepStatus};
use std::thread;

/// Executes the ordered step list of a single machine.
pub struct ActionRunner<'a> {
    store: &'a dyn StateStore,
    commands: &'a dyn CommandRunner,
    dry_run: bool,
    cancel: CancelToken,
}

impl<'a> ActionRunner<'a> {
    pub fn new(store: &'a dyn StateStore, commands: &'a dyn CommandRunner) -> Self {
        Self {
            store,
            commands,
            dry_run: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the machine's steps strictly in declared order, fail-fast.
    ///
    /// Returns `Err` only for state store failures; a failing command
    /// is a recorded outcome, not an error.
    pub fn run_machine(&self, machine: &Machine) -> Result<MachineReport> {
        let mut steps = Vec::with_capacity(machine.steps.len());
        let mut failed = false;
        let mut cancelled = false;

        for (index, step) in machine.steps.iter().enumerate() {
            if failed || cancelled {
                steps.push(StepReport::new(&step.id, StepOutcome::NotAttempted, 0));
                continue;
            }
            if self.cancel.is_cancelled() {
                // In-flight steps finish; further steps do not start.
                cancelled = true;
                steps.push(
                    StepReport::new(&step.id, StepOutcome::NotAttempted, 0)
                        .with_detail("run cancelled"),
                );
                continue;
            }

            let report = self.run_step(machine, step)?;
            log::debug!(
                "{}: step {}/{} '{}' -> {}",
                machine.name,
                index + 1,
                machine.steps.len(),
                step.id,
                report.outcome
            );
            failed = report.outcome == StepOutcome::Failed;
            steps.push(report);
        }

        let status = if failed {
            MachineStatus::Failed
        } else if cancelled {
            MachineStatus::Cancelled
        } else {
            MachineStatus::Succeeded
        };

        Ok(MachineReport {
            name: machine.name.clone(),
            status,
            steps,
        })
    }

    fn run_step(&self, machine: &Machine, step: &Step) -> Result<StepReport> {
        let fingerprint = step.fingerprint();
        let existing = self
            .store
            .get(&machine.name, &step.id)
            .with_context(|| format!("reading state for {}/{}", machine.name, step.id))?;

        // Idempotent short-circuit: an unchanged, already-applied step
        // costs one store read and nothing else.
        if let Some(record) = &existing
            && record.status == StepStatus::Succeeded
            && record.fingerprint == fingerprint
        {
            return Ok(StepReport::new(&step.id, StepOutcome::UpToDate, 0));
        }

        if self.dry_run {
            return Ok(StepReport::new(&step.id, StepOutcome::WouldApply, 0));
        }

        let prior_attempts = existing.map_or(0, |r| r.attempt_count);

        // Precondition: opaque command, exit zero means the step applies.
        if let Some(condition) = &step.applies_if {
            match self.commands.run(condition, step.timeout()) {
                Ok(output) if !output.success => {
                    self.put(
                        machine,
                        step,
                        RunRecord::new(StepStatus::Skipped, prior_attempts, &fingerprint),
                    )?;
                    return Ok(StepReport::new(&step.id, StepOutcome::Skipped, 0)
                        .with_detail("precondition not met"));
                }
                Ok(_) => {}
                Err(err) => {
                    // A precondition that cannot run is a step failure:
                    // it is not safe to guess whether the step applies.
                    // No rollback: the command itself never executed,
                    // so there is nothing to compensate.
                    let detail = format!("precondition '{}': {}", condition, err);
                    self.put(
                        machine,
                        step,
                        RunRecord::new(StepStatus::Failed, prior_attempts, &fingerprint)
                            .with_error(&detail),
                    )?;
                    return Ok(
                        StepReport::new(&step.id, StepOutcome::Failed, 0).with_detail(detail)
                    );
                }
            }
        }

        // Mark in-flight before invoking, so a crash mid-command is
        // visible as an attempted-but-unfinished step.
        self.put(
            machine,
            step,
            RunRecord::new(StepStatus::Pending, prior_attempts, &fingerprint),
        )?;

        self.execute_with_retry(machine, step, &fingerprint, prior_attempts)
    }

    fn execute_with_retry(
        &self,
        machine: &Machine,
        step: &Step,
        fingerprint: &str,
        prior_attempts: u32,
    ) -> Result<StepReport> {
        let max_attempts = step.retry.max_attempts.max(1);
        let mut attempt = 0;

        let error = loop {
            attempt += 1;
            let outcome = match self.commands.run(&step.command, step.timeout()) {
                Ok(output) if output.success => {
                    self.put(
                        machine,
                        step,
                        RunRecord::new(
                            StepStatus::Succeeded,
                            prior_attempts + attempt,
                            fingerprint,
                        ),
                    )?;
                    return Ok(StepReport::new(&step.id, StepOutcome::Succeeded, attempt));
                }
                Ok(output) => {
                    let stderr = output.stderr_str().trim().to_string();
                    StepError::CommandFailed {
                        detail: if stderr.is_empty() {
                            "command reported failure".to_string()
                        } else {
                            stderr
                        },
                    }
                }
                Err(err) => err,
            };

            if attempt >= max_attempts || !outcome.is_retryable() {
                break outcome;
            }

            let delay = step.retry.delay_after_attempt(attempt);
            log::warn!(
                "{}/{}: attempt {}/{} failed: {}. Retrying in {:.0}s...",
                machine.name,
                step.id,
                attempt,
                max_attempts,
                outcome,
                delay.as_secs_f64()
            );
            thread::sleep(delay);
        };

        let detail = error.to_string();
        self.put(
            machine,
            step,
            RunRecord::new(StepStatus::Failed, prior_attempts + attempt, fingerprint)
                .with_error(&detail),
        )?;
        self.rollback(machine, step);

        Ok(StepReport::new(&step.id, StepOutcome::Failed, attempt).with_detail(detail))
    }

    /// Best-effort compensating action after a terminal failure.
    /// Errors are logged, never propagated.
    fn rollback(&self, machine: &Machine, step: &Step) {
        let Some(rollback) = &step.rollback else {
            return;
        };
        log::info!("{}/{}: running rollback '{}'", machine.name, step.id, rollback);
        match self.commands.run(rollback, step.timeout()) {
            Ok(output) if output.success => {}
            Ok(output) => log::warn!(
                "{}/{}: rollback reported failure: {}",
                machine.name,
                step.id,
                output.stderr_str().trim()
            ),
            Err(err) => log::warn!("{}/{}: rollback error: {}", machine.name, step.id, err),
        }
    }

    fn put(&self, machine: &Machine, step: &Step, record: RunRecord) -> Result<()> {
        self.store
            .put(&machine.name, &step.id, record)
            .with_context(|| format!("recording state for {}/{}", machine.name, step.id))
    }
}
