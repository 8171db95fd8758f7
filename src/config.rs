//! Inventory file loading.
//!
//! The inventory is re-read and re-validated on every run; nothing
//! about it is cached across invocations.

use anyhow::{Context, Result, bail};
use inventory_model::{CommandSpec, Machine, RetryPolicy, Role, Step};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE: &str = "muster.toml";

/// Top-level inventory file.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct FleetConfig {
    /// Where run records live (default: ~/.local/state/muster)
    #[serde(default)]
    pub state_dir: Option<String>,

    /// Fleet-wide step defaults
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub machines: Vec<MachineConfig>,
}

/// Fleet-wide defaults a step can override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub max_attempts: u32,
    pub base_delay_secs: f64,
    pub backoff_factor: f64,
    pub max_delay_secs: f64,
    pub timeout_secs: Option<u64>,
}

impl Default for Defaults {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_secs: retry.base_delay_secs,
            backoff_factor: retry.backoff_factor,
            max_delay_secs: retry.max_delay_secs,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MachineConfig {
    pub name: String,
    #[serde(default)]
    pub role: Role,
    pub address: IpAddr,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepConfig {
    pub id: String,
    /// Program and arguments, e.g. ["apt-get", "install", "-y", "sssd"]
    pub command: Vec<String>,
    #[serde(default)]
    pub applies_if: Option<Vec<String>>,
    #[serde(default)]
    pub rollback: Option<Vec<String>>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl FleetConfig {
    /// Load the inventory file, defaulting to ./muster.toml.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(DEFAULT_FILE));
        if !path.exists() {
            bail!("inventory file not found: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid inventory file {}", path.display()))?;

        log::debug!(
            "loaded {} machine(s) from {}",
            config.machines.len(),
            path.display()
        );
        Ok(config)
    }

    /// Build machine definitions ready for validation.
    pub fn into_machines(self) -> Result<Vec<Machine>> {
        let defaults = self.defaults;
        self.machines
            .into_iter()
            .map(|m| m.into_machine(&defaults))
            .collect()
    }

    /// Resolve the state directory, expanding `~`.
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(PathBuf::from(shellexpand::tilde(dir).as_ref())),
            None => {
                let home = dirs::home_dir().context("could not determine home directory")?;
                Ok(home.join(".local").join("state").join("muster"))
            }
        }
    }
}

impl MachineConfig {
    fn into_machine(self, defaults: &Defaults) -> Result<Machine> {
        let name = self.name;
        let steps = self
            .steps
            .into_iter()
            .map(|s| s.into_step(&name, defaults))
            .collect::<Result<Vec<_>>>()?;

        Ok(Machine {
            name,
            role: self.role,
            static_address: self.address,
            depends_on: self.depends_on,
            steps,
        })
    }
}

impl StepConfig {
    fn into_step(self, machine: &str, defaults: &Defaults) -> Result<Step> {
        let command = parse_command(&self.command)
            .with_context(|| format!("machine '{machine}', step '{}'", self.id))?;
        let applies_if = self
            .applies_if
            .as_deref()
            .map(parse_command)
            .transpose()
            .with_context(|| format!("machine '{machine}', step '{}': applies_if", self.id))?;
        let rollback = self
            .rollback
            .as_deref()
            .map(parse_command)
            .transpose()
            .with_context(|| format!("machine '{machine}', step '{}': rollback", self.id))?;

        Ok(Step {
            id: self.id,
            command,
            applies_if,
            rollback,
            retry: RetryPolicy {
                max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
                base_delay_secs: defaults.base_delay_secs,
                backoff_factor: defaults.backoff_factor,
                max_delay_secs: defaults.max_delay_secs,
            },
            timeout_secs: self.timeout_secs.or(defaults.timeout_secs),
        })
    }
}

fn parse_command(parts: &[String]) -> Result<CommandSpec> {
    let (program, args) = parts
        .split_first()
        .context("command may not be empty")?;
    Ok(CommandSpec {
        program: program.clone(),
        args: args.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
state_dir = "~/fleet-state"

[defaults]
max_attempts = 3
base_delay_secs = 1.0
timeout_secs = 600

[[machines]]
name = "dc"
role = "domain-controller"
address = "10.0.0.1"

[[machines.steps]]
id = "promote-to-controller"
command = ["samba-tool", "domain", "provision"]
rollback = ["samba-tool", "domain", "demote"]
timeout_secs = 900

[[machines]]
name = "node1"
role = "domain-member"
address = "10.0.0.2"
depends_on = ["dc"]

[[machines.steps]]
id = "join-domain"
command = ["realm", "join", "corp.example"]
applies_if = ["realm", "list", "--name-only"]
max_attempts = 5
"#;

    fn parse(toml_str: &str) -> FleetConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_sample_parses() {
        let config = parse(SAMPLE);
        assert_eq!(config.machines.len(), 2);
        assert_eq!(config.defaults.max_attempts, 3);
        assert_eq!(config.state_dir.as_deref(), Some("~/fleet-state"));
    }

    #[test]
    fn test_into_machines_applies_defaults_and_overrides() {
        let machines = parse(SAMPLE).into_machines().unwrap();

        let dc = &machines[0];
        assert_eq!(dc.role, Role::DomainController);
        assert_eq!(dc.static_address, "10.0.0.1".parse::<IpAddr>().unwrap());
        let promote = &dc.steps[0];
        assert_eq!(promote.retry.max_attempts, 3); // fleet default
        assert_eq!(promote.timeout_secs, Some(900)); // step override
        assert!(promote.rollback.is_some());

        let node1 = &machines[1];
        assert_eq!(node1.depends_on, vec!["dc"]);
        let join = &node1.steps[0];
        assert_eq!(join.retry.max_attempts, 5); // step override
        assert_eq!(join.timeout_secs, Some(600)); // fleet default
        assert_eq!(join.command.program, "realm");
        assert_eq!(join.applies_if.as_ref().unwrap().program, "realm");
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = parse(
            r#"
[[machines]]
name = "dc"
address = "10.0.0.1"

[[machines.steps]]
id = "broken"
command = []
"#,
        );
        let err = config.into_machines().unwrap_err();
        assert!(err.to_string().contains("step 'broken'"), "{err:#}");
    }

    #[test]
    fn test_bad_address_rejected_at_parse() {
        let result: std::result::Result<FleetConfig, _> = toml::from_str(
            r#"
[[machines]]
name = "dc"
address = "not-an-address"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_reads_fresh_file_each_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("muster.toml");
        fs::write(&path, SAMPLE).unwrap();

        let first = FleetConfig::load(Some(&path)).unwrap();
        assert_eq!(first.machines.len(), 2);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(
            file,
            "\n[[machines]]\nname = \"extra\"\naddress = \"10.0.0.3\"\n"
        )
        .unwrap();

        let second = FleetConfig::load(Some(&path)).unwrap();
        assert_eq!(second.machines.len(), 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = FleetConfig::load(Some(Path::new("/nonexistent/muster.toml"))).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_state_dir_tilde_expansion() {
        let config = parse(SAMPLE);
        let dir = config.state_dir().unwrap();
        assert!(!dir.to_string_lossy().contains('~'));
        assert!(dir.ends_with("fleet-state"));
    }
}
