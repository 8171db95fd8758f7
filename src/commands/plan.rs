//! `muster plan` - show the computed provisioning order.

use crate::Context;
use crate::ui;
use anyhow::Result;
use colored::Colorize;
use provision::plan;
use std::path::Path;

pub fn run(_ctx: &Context, file: Option<&Path>) -> Result<()> {
    let (_state_dir, inventory) = super::load_inventory(file)?;
    let machine_plan = plan(&inventory)?;

    if machine_plan.is_empty() {
        ui::warn("inventory is empty");
        return Ok(());
    }

    ui::header("Provisioning plan");
    for (index, wave) in machine_plan.waves().iter().enumerate() {
        println!("{}", format!("wave {}", index + 1).blue().bold());
        for name in wave {
            let machine = inventory.get(name).expect("planned machine in inventory");
            let deps = if machine.depends_on.is_empty() {
                String::new()
            } else {
                format!("  after: {}", machine.depends_on.join(", "))
            };
            println!(
                "  {}  {} {}{}",
                machine.name,
                machine.role.to_string().dimmed(),
                machine.static_address.to_string().dimmed(),
                deps.dimmed()
            );
        }
    }

    println!();
    ui::dim(&format!(
        "{} machine(s), {} wave(s); machines in the same wave may run in parallel",
        machine_plan.machine_count(),
        machine_plan.waves().len()
    ));
    Ok(())
}
