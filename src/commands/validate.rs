//! `muster validate` - check the inventory file without executing.

use crate::Context;
use crate::ui;
use anyhow::Result;
use std::path::Path;

pub fn run(_ctx: &Context, file: Option<&Path>) -> Result<()> {
    let (state_dir, inventory) = super::load_inventory(file)?;

    let steps: usize = inventory.machines().iter().map(|m| m.steps.len()).sum();
    ui::success("inventory valid");
    ui::kv("machines", &inventory.len().to_string());
    ui::kv("steps", &steps.to_string());
    ui::kv("state dir", &state_dir.display().to_string());
    Ok(())
}
