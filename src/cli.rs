use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "muster")]
#[command(version)]
#[command(about = "Declarative provisioning orchestrator for small VM fleets", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Inventory file (defaults to ./muster.toml)
    #[arg(short, long, global = true, env = "MUSTER_FILE")]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision the fleet: validate, plan, execute, report
    Apply(ApplyArgs),

    /// Show the computed provisioning order without executing
    Plan,

    /// Show last-known provisioning state per machine and step
    Status(StatusArgs),

    /// Validate the inventory file and exit
    Validate,

    /// Clear recorded state to force re-execution
    Reset(ResetArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Don't make changes, just show what would happen
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Parallel machines per wave
    #[arg(short, long, default_value = "4")]
    pub jobs: u32,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Emit the run report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct StatusArgs {
    /// Only show this machine
    pub machine: Option<String>,
}

#[derive(Parser)]
pub struct ResetArgs {
    /// Machine whose state to clear
    pub machine: String,

    /// Clear only this step (default: all steps of the machine)
    pub step: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
