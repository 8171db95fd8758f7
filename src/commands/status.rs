//! `muster status` - last-known provisioning state per machine.

use crate::Context;
use crate::cli::StatusArgs;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use statestore::{FileStore, StateStore, StepStatus};
use std::path::Path;

pub fn run(_ctx: &Context, file: Option<&Path>, args: &StatusArgs) -> Result<()> {
    let (state_dir, inventory) = super::load_inventory(file)?;
    let store = FileStore::open(&state_dir)?;

    let names: Vec<String> = match &args.machine {
        Some(name) => {
            if inventory.get(name).is_none() {
                bail!("unknown machine '{name}'");
            }
            vec![name.clone()]
        }
        // Inventory declaration order, not store listing order
        None => inventory.machines().iter().map(|m| m.name.clone()).collect(),
    };

    ui::header("Provisioning state");
    for name in names {
        let records = store.records_for(&name)?;
        let machine = inventory.get(&name).expect("machine in inventory");

        println!("{}", name.bold());
        if machine.steps.is_empty() {
            ui::dim("no steps defined");
            continue;
        }

        for step in &machine.steps {
            match records.get(&step.id) {
                None => println!("  {}  {}", step.id, "never attempted".dimmed()),
                Some(record) => {
                    let status = match record.status {
                        StepStatus::Succeeded => record.status.to_string().green(),
                        StepStatus::Failed => record.status.to_string().red(),
                        StepStatus::Skipped => record.status.to_string().yellow(),
                        StepStatus::Pending => record.status.to_string().cyan(),
                    };
                    let stale = if record.fingerprint != step.fingerprint() {
                        "  (definition changed)".yellow().to_string()
                    } else {
                        String::new()
                    };
                    println!(
                        "  {}  {}  {}{}",
                        step.id,
                        status,
                        format!(
                            "attempts: {}, last: {}",
                            record.attempt_count,
                            record.last_attempt.format("%Y-%m-%d %H:%M:%S UTC")
                        )
                        .dimmed(),
                        stale
                    );
                    if let Some(detail) = &record.error_detail {
                        println!("      {}", detail.dimmed());
                    }
                }
            }
        }
    }
    Ok(())
}
