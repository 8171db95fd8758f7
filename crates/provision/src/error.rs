//! Error types for planning and step execution.

use std::time::Duration;
use thiserror::Error;

/// Errors from dependency planning.
///
/// A cycle here should be unreachable when the inventory was validated
/// first; the planner re-checks anyway so a hand-built graph cannot
/// slip through.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Machines that could not be scheduled because they form (or
    /// depend on) a cycle
    #[error("dependency cycle among machines: {}", remaining.join(", "))]
    Cycle { remaining: Vec<String> },
}

/// Errors from executing a single step's command.
#[derive(Debug, Error)]
pub enum StepError {
    /// The command ran and reported failure
    #[error("command failed: {detail}")]
    CommandFailed { detail: String },

    /// The command exceeded its wall-clock limit and was killed.
    /// Distinct from a command-reported failure so reports can tell
    /// the two apart.
    #[error("command timed out after {:.0}s", limit.as_secs_f64())]
    Timeout { limit: Duration },

    /// The command could not be spawned at all
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

impl StepError {
    /// Whether another attempt could plausibly succeed. Spawn errors
    /// (missing binary, bad path) will not fix themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Timeout { .. })
    }
}
