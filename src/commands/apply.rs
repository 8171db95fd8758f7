//! `muster apply` - validate, plan, execute, report.

use crate::Context;
use crate::cli::ApplyArgs;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use provision::{
    MachineStatus, Orchestrator, ProgressCallback, RunOptions, RunReport, ShellRunner, plan,
};
use statestore::{FileStore, StateStore};
use std::path::Path;
use std::sync::Arc;

pub fn run(ctx: &Context, file: Option<&Path>, args: &ApplyArgs) -> Result<()> {
    let (state_dir, inventory) = super::load_inventory(file)?;

    if inventory.is_empty() {
        ui::warn("inventory is empty; nothing to do");
        return Ok(());
    }

    let machine_plan = plan(&inventory)?;
    if !ctx.quiet && !args.json {
        ui::info(&format!(
            "{} machine(s) in {} wave(s)",
            machine_plan.machine_count(),
            machine_plan.waves().len()
        ));
    }

    if !args.yes && !args.dry_run && !args.json && !confirm_apply(&inventory)? {
        ui::warn("aborted");
        return Ok(());
    }

    // Dry runs read the durable store too, so already-applied steps
    // report up-to-date; the runner never writes in dry-run mode.
    let store: Arc<dyn StateStore> = Arc::new(FileStore::open(&state_dir)?);

    let orchestrator = Orchestrator::new(store, Arc::new(ShellRunner)).with_options(RunOptions {
        dry_run: args.dry_run,
        jobs: args.jobs.max(1) as usize,
    });

    let report = if ctx.quiet || args.json {
        orchestrator.run(&inventory)?
    } else {
        orchestrator.run_with_progress(&inventory, &mut CliProgress)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(ctx, &report, args.dry_run);
    }

    let failed = report.count(|s| matches!(s, MachineStatus::Failed));
    if failed > 0 {
        bail!("{failed} machine(s) failed");
    }
    Ok(())
}

fn confirm_apply(inventory: &inventory_model::Inventory) -> Result<bool> {
    let prompt = format!("Provision {} machine(s)?", inventory.len());
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(true)
        .interact()?)
}

struct CliProgress;

impl ProgressCallback for CliProgress {
    fn on_wave_start(&mut self, wave: usize, total_waves: usize, machines: &[&str]) {
        println!(
            "{} {}",
            format!("[wave {}/{}]", wave, total_waves).blue().bold(),
            machines.join(", ")
        );
    }

    fn on_machine_complete(&mut self, name: &str, status: &MachineStatus) {
        println!("  {} {}", name, ui::machine_status(status));
    }
}

fn render_report(ctx: &Context, report: &RunReport, dry_run: bool) {
    ui::header(if dry_run { "Plan (dry run)" } else { "Run report" });

    for machine in &report.machines {
        println!("{}  {}", machine.name.bold(), ui::machine_status(&machine.status));
        for step in &machine.steps {
            let attempts = if step.attempts > 1 {
                format!(" ({} attempts)", step.attempts)
            } else {
                String::new()
            };
            println!(
                "    {} {}{}",
                step.id.dimmed(),
                ui::step_outcome(&step.outcome),
                attempts
            );
            if let Some(detail) = &step.detail
                && (ctx.verbose > 0 || step.outcome == provision::StepOutcome::Failed)
            {
                println!("      {}", detail.dimmed());
            }
        }
    }

    println!();
    let summary = format!(
        "{} succeeded, {} failed, {} skipped, {} cancelled",
        report.count(MachineStatus::is_success),
        report.count(|s| matches!(s, MachineStatus::Failed)),
        report.count(|s| matches!(s, MachineStatus::Skipped { .. })),
        report.count(|s| matches!(s, MachineStatus::Cancelled)),
    );
    if report.is_success() {
        ui::success(&summary);
    } else {
        ui::error(&summary);
    }
}
