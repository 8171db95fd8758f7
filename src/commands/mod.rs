pub mod apply;
pub mod plan;
pub mod reset;
pub mod status;
pub mod validate;

use crate::config::FleetConfig;
use anyhow::Result;
use inventory_model::Inventory;
use std::path::{Path, PathBuf};

/// Load and validate the inventory: the common front half of every
/// command that needs machines. Re-reads the file on every call.
pub fn load_inventory(file: Option<&Path>) -> Result<(PathBuf, Inventory)> {
    let config = FleetConfig::load(file)?;
    let state_dir = config.state_dir()?;
    let inventory = Inventory::validate(config.into_machines()?)?;
    Ok((state_dir, inventory))
}
