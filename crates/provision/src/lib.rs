//! # provision
//!
//! Dependency-ordered, idempotent provisioning engine for a small
//! fleet of machines.
//!
//! ## Core Concepts
//!
//! - **Plan**: machines batched into ready-set waves by their
//!   `depends_on` edges ([`planner`])
//! - **ActionRunner**: runs one machine's steps in order, skipping
//!   anything already applied, retrying with backoff, persisting every
//!   transition before the next step ([`runner`])
//! - **Orchestrator**: drives waves, parallelizes independent
//!   machines, propagates failure to dependents, aggregates the
//!   [`RunReport`] ([`orchestrator`])
//!
//! ## Example
//!
//! ```ignore
//! use provision::{Orchestrator, RunOptions, ShellRunner};
//! use inventory_model::Inventory;
//! use statestore::FileStore;
//! use std::sync::Arc;
//!
//! let inventory = Inventory::validate(machines)?;
//! let store = Arc::new(FileStore::open("/var/lib/muster")?);
//! let report = Orchestrator::new(store, Arc::new(ShellRunner))
//!     .with_options(RunOptions { jobs: 4, dry_run: false })
//!     .run(&inventory)?;
//!
//! if !report.is_success() {
//!     for machine in report.failed() {
//!         eprintln!("{} failed", machine.name);
//!     }
//! }
//! ```
//!
//! ## Provider Traits
//!
//! The engine talks to the outside world through traits:
//!
//! - [`CommandRunner`]: invokes a step's external command
//! - [`statestore::StateStore`]: durable run records
//! - [`ProgressCallback`]: run-level progress updates
//!
//! so it can be driven from a CLI, a test harness, or an automation
//! pipeline without touching real processes or disk.

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod runner;

// Re-export main types at crate root
pub use context::{CancelToken, CommandOutput, CommandRunner, NoProgress, ProgressCallback, ShellRunner};
pub use error::{PlanError, StepError};
pub use orchestrator::{Orchestrator, RunOptions};
pub use planner::{Plan, plan};
pub use report::{MachineReport, MachineStatus, RunReport, StepOutcome, StepReport};
pub use runner::ActionRunner;
