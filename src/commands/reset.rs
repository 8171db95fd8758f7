//! `muster reset` - clear recorded state to force re-execution.

use crate::Context;
use crate::cli::ResetArgs;
use crate::ui;
use anyhow::{Result, bail};
use statestore::{FileStore, StateStore};
use std::path::Path;

pub fn run(_ctx: &Context, file: Option<&Path>, args: &ResetArgs) -> Result<()> {
    let (state_dir, inventory) = super::load_inventory(file)?;

    if inventory.get(&args.machine).is_none() {
        bail!("unknown machine '{}'", args.machine);
    }

    let scope = match &args.step {
        Some(step) => format!("step '{}' of '{}'", step, args.machine),
        None => format!("all steps of '{}'", args.machine),
    };

    if !args.yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Clear recorded state for {scope}? The next apply will re-execute."
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            ui::warn("aborted");
            return Ok(());
        }
    }

    let store = FileStore::open(&state_dir)?;
    store.reset(&args.machine, args.step.as_deref())?;
    ui::success(&format!("cleared {scope}"));
    Ok(())
}
