//! Run report: per-machine and per-step outcomes of one orchestrated
//! run, suitable for rendering or for automation pipelines as JSON.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to a single step during this run.
///
/// Distinct from the persisted [`statestore::StepStatus`]: the report
/// also has to say "nothing was done because nothing needed doing"
/// (`UpToDate`) and "we never got there" (`NotAttempted`), neither of
/// which touches the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepOutcome {
    /// A matching success was already recorded; the command was not
    /// invoked
    UpToDate,
    /// Dry run: the step would have been executed
    WouldApply,
    /// The precondition did not hold; recorded as skipped
    Skipped,
    /// The command ran and succeeded
    Succeeded,
    /// The command failed terminally after all attempts
    Failed,
    /// Aborted before this step because an earlier step failed
    NotAttempted,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::UpToDate => "up-to-date",
            Self::WouldApply => "would apply",
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NotAttempted => "not attempted",
        };
        write!(f, "{label}")
    }
}

/// Per-step detail in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub id: String,
    pub outcome: StepOutcome,
    /// Attempts made during this run (0 for skips and short-circuits)
    pub attempts: u32,
    /// Error or diagnostic detail, if any
    #[serde(default)]
    pub detail: Option<String>,
}

impl StepReport {
    pub fn new(id: impl Into<String>, outcome: StepOutcome, attempts: u32) -> Self {
        Self {
            id: id.into(),
            outcome,
            attempts,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Terminal status of one machine's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum MachineStatus {
    /// Every step succeeded, was up to date, or was skipped by its
    /// precondition
    Succeeded,
    /// A step failed terminally; remaining steps were not attempted
    Failed,
    /// Never attempted: one or more dependencies did not succeed
    Skipped {
        /// The dependencies that did not reach success
        unmet: Vec<String>,
    },
    /// Never attempted: the run was cancelled before dispatch
    Cancelled,
}

impl MachineStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped { unmet } => write!(f, "skipped (unmet: {})", unmet.join(", ")),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One machine's portion of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReport {
    pub name: String,
    pub status: MachineStatus,
    #[serde(default)]
    pub steps: Vec<StepReport>,
}

impl MachineReport {
    pub fn new(name: impl Into<String>, status: MachineStatus) -> Self {
        Self {
            name: name.into(),
            status,
            steps: Vec::new(),
        }
    }
}

/// Aggregated result of an orchestrated run, in inventory declaration
/// order. Every machine the run touched or deliberately did not touch
/// appears here; nothing is silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub machines: Vec<MachineReport>,
}

impl RunReport {
    pub fn get(&self, name: &str) -> Option<&MachineReport> {
        self.machines.iter().find(|m| m.name == name)
    }

    /// Whether every machine reached success.
    pub fn is_success(&self) -> bool {
        self.machines.iter().all(|m| m.status.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &MachineReport> {
        self.machines
            .iter()
            .filter(|m| matches!(m.status, MachineStatus::Failed))
    }

    pub fn count(&self, pred: impl Fn(&MachineStatus) -> bool) -> usize {
        self.machines.iter().filter(|m| pred(&m.status)).count()
    }
}
