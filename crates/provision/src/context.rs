//! Execution context: the command boundary, progress callbacks, and
//! run cancellation.
//!
//! These traits keep the engine free of hard dependencies on a
//! specific process launcher or UI. Commands are opaque collaborators:
//! the engine hands over a [`CommandSpec`], gets back an exit status
//! and diagnostic text, and interprets nothing else.

use crate::error::StepError;
use crate::report::MachineStatus;
use inventory_model::CommandSpec;
use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Output from an external command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Boundary for invoking a step's external command.
///
/// A non-success [`CommandOutput`] means the command ran and reported
/// failure; `Err` means it could not run to completion (spawn failure
/// or timeout).
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &CommandSpec, timeout: Option<Duration>)
    -> Result<CommandOutput, StepError>;
}

/// Runs commands as local child processes.
pub struct ShellRunner;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl CommandRunner for ShellRunner {
    fn run(
        &self,
        cmd: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, StepError> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let Some(limit) = timeout else {
            return Ok(command.output()?.into());
        };

        let mut child = command.spawn()?;

        // Drain pipes on separate threads so a chatty command cannot
        // deadlock against a full pipe buffer while we poll for exit.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_reader = thread::spawn(move || drain(stdout));
        let err_reader = thread::spawn(move || drain(stderr));

        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(CommandOutput {
                    stdout: out_reader.join().unwrap_or_default(),
                    stderr: err_reader.join().unwrap_or_default(),
                    success: status.success(),
                });
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                let _ = out_reader.join();
                let _ = err_reader.join();
                return Err(StepError::Timeout { limit });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

// ============================================================================
// Cancellation
// ============================================================================

/// Cooperative run-level cancellation signal.
///
/// Cancelling stops the orchestrator from dispatching further machines
/// and the runner from starting further steps; an in-flight command is
/// allowed to finish so no step is left half-applied.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Progress callback for run-level reporting.
///
/// Machines inside a wave run in parallel, so completions are reported
/// after the wave finishes rather than interleaved.
pub trait ProgressCallback: Send {
    /// Called before a wave of independent machines is dispatched
    fn on_wave_start(&mut self, wave: usize, total_waves: usize, machines: &[&str]);

    /// Called once per machine after its wave completes
    fn on_machine_complete(&mut self, name: &str, status: &MachineStatus);
}

/// No-op progress callback.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _wave: usize, _total_waves: usize, _machines: &[&str]) {}
    fn on_machine_complete(&mut self, _name: &str, _status: &MachineStatus) {}
}
