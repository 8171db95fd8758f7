//! Run record types persisted per (machine, step) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal or pending status of one provisioning step on one machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// Recorded but not yet attempted
    Pending,
    /// Command ran and reported success
    Succeeded,
    /// Command failed terminally (retries exhausted)
    Failed,
    /// Precondition did not hold; command was not invoked
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Persisted record of the last known outcome of a (machine, step)
/// pair. Created on first attempt, updated on every attempt after
/// that, and never deleted except through an explicit reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub status: StepStatus,
    /// When the step was last attempted (or skipped)
    pub last_attempt: DateTime<Utc>,
    /// Total attempts across all runs
    pub attempt_count: u32,
    /// Error detail for failed attempts
    #[serde(default)]
    pub error_detail: Option<String>,
    /// Fingerprint of the step definition at record time; a stored
    /// success only short-circuits reruns while this still matches
    pub fingerprint: String,
}

impl RunRecord {
    pub fn new(status: StepStatus, attempt_count: u32, fingerprint: impl Into<String>) -> Self {
        Self {
            status,
            last_attempt: Utc::now(),
            attempt_count,
            error_detail: None,
            fingerprint: fingerprint.into(),
        }
    }

    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status != StepStatus::Pending
    }
}
