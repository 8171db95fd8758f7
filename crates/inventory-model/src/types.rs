//! Core inventory types: machines, roles, and provisioning steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Role a machine plays in the fleet.
///
/// Roles carry no behavior of their own; ordering between roles is
/// expressed through explicit `depends_on` edges (a domain member
/// declares a dependency on its domain controller, not on the role).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Directory/domain controller that other machines join
    DomainController,
    /// Machine joined to a domain controller
    DomainMember,
    /// Generic host with no domain relationship
    #[default]
    Host,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainController => write!(f, "domain-controller"),
            Self::DomainMember => write!(f, "domain-member"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// An opaque external invocation: a program and its arguments.
///
/// The core never interprets commands; it only runs them through the
/// command boundary and looks at the exit status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Retry policy for a step: maximum attempts and exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retries)
    pub max_attempts: u32,
    /// Base delay between attempts, in seconds
    pub base_delay_secs: f64,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Cap on the delay between attempts, in seconds
    pub max_delay_secs: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_secs: 2.0,
            backoff_factor: 2.0,
            max_delay_secs: 60.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the backoff delay after a given attempt (1-indexed).
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        let delay = self.base_delay_secs * self.backoff_factor.powi(exp as i32);
        Duration::from_secs_f64(delay.min(self.max_delay_secs))
    }
}

/// A named, idempotent unit of work in a machine's provisioning plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Identifier, unique within the machine and stable across reruns.
    /// Used as the key for state tracking.
    pub id: String,
    /// The external command that applies this step
    pub command: CommandSpec,
    /// Optional precondition; the step applies only if this command
    /// exits successfully
    #[serde(default)]
    pub applies_if: Option<CommandSpec>,
    /// Optional compensating action run best-effort after a terminal
    /// failure of this step
    #[serde(default)]
    pub rollback: Option<CommandSpec>,
    /// Retry policy for the command invocation
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Wall-clock limit for a single command invocation, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Step {
    pub fn new(id: impl Into<String>, command: CommandSpec) -> Self {
        Self {
            id: id.into(),
            command,
            applies_if: None,
            rollback: None,
            retry: RetryPolicy::default(),
            timeout_secs: None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Content fingerprint of the step definition.
    ///
    /// Covers the command and the precondition, which is exactly what
    /// determines whether a previously recorded success still stands.
    /// Retry and rollback settings are deliberately excluded: changing
    /// them must not force re-execution.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hash_command(&mut hasher, &self.command);
        if let Some(cond) = &self.applies_if {
            hasher.update(b"if");
            hash_command(&mut hasher, cond);
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_command(hasher: &mut blake3::Hasher, cmd: &CommandSpec) {
    // Length-prefix each component so ["a", "bc"] and ["ab", "c"]
    // cannot collide.
    hasher.update(&(cmd.program.len() as u64).to_le_bytes());
    hasher.update(cmd.program.as_bytes());
    for arg in &cmd.args {
        hasher.update(&(arg.len() as u64).to_le_bytes());
        hasher.update(arg.as_bytes());
    }
}

/// A machine in the fleet: identity, network address, role, and its
/// ordered provisioning steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Unique name across the inventory
    pub name: String,
    /// Role in the fleet
    #[serde(default)]
    pub role: Role,
    /// Stable network identity, unique across the inventory
    pub static_address: IpAddr,
    /// Machines that must be fully provisioned before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Provisioning steps, executed strictly in this order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Machine {
    pub fn new(name: impl Into<String>, role: Role, static_address: IpAddr) -> Self {
        Self {
            name: name.into(),
            role,
            static_address,
            depends_on: Vec::new(),
            steps: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_with(command: CommandSpec, applies_if: Option<CommandSpec>) -> Step {
        Step {
            applies_if,
            ..Step::new("s", command)
        }
    }

    #[test]
    fn test_retry_policy_backoff() {
        let retry = RetryPolicy {
            max_attempts: 5,
            base_delay_secs: 10.0,
            backoff_factor: 2.0,
            max_delay_secs: 60.0,
        };

        assert_eq!(retry.delay_after_attempt(1), Duration::from_secs(10));
        assert_eq!(retry.delay_after_attempt(2), Duration::from_secs(20));
        assert_eq!(retry.delay_after_attempt(3), Duration::from_secs(40));
        // Capped at max_delay
        assert_eq!(retry.delay_after_attempt(4), Duration::from_secs(60));
    }

    #[test]
    fn test_fingerprint_stable() {
        let a = step_with(CommandSpec::new("apt-get", &["install", "sssd"]), None);
        let b = step_with(CommandSpec::new("apt-get", &["install", "sssd"]), None);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_command() {
        let a = step_with(CommandSpec::new("apt-get", &["install", "sssd"]), None);
        let b = step_with(CommandSpec::new("apt-get", &["install", "krb5"]), None);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_condition() {
        let cmd = CommandSpec::new("systemctl", &["restart", "sssd"]);
        let a = step_with(cmd.clone(), None);
        let b = step_with(cmd, Some(CommandSpec::new("test", &["-f", "/etc/sssd/sssd.conf"])));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_no_arg_boundary_collision() {
        let a = step_with(CommandSpec::new("echo", &["ab", "c"]), None);
        let b = step_with(CommandSpec::new("echo", &["a", "bc"]), None);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_retry_and_rollback() {
        let cmd = CommandSpec::new("realm", &["join", "corp.example"]);
        let a = step_with(cmd.clone(), None);
        let b = Step {
            retry: RetryPolicy {
                max_attempts: 5,
                ..RetryPolicy::default()
            },
            rollback: Some(CommandSpec::new("realm", &["leave"])),
            ..step_with(cmd, None)
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::new("dpkg", &["-s", "sssd"]);
        assert_eq!(cmd.to_string(), "dpkg -s sssd");
    }
}
