use colored::Colorize;
use provision::{MachineStatus, StepOutcome};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.len()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Colored rendering of a machine's terminal status
pub fn machine_status(status: &MachineStatus) -> String {
    match status {
        MachineStatus::Succeeded => "succeeded".green().to_string(),
        MachineStatus::Failed => "failed".red().to_string(),
        MachineStatus::Skipped { unmet } => {
            format!("{} (unmet: {})", "skipped".yellow(), unmet.join(", "))
        }
        MachineStatus::Cancelled => "cancelled".yellow().to_string(),
    }
}

/// Colored rendering of a step outcome
pub fn step_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::UpToDate => "up-to-date".dimmed().to_string(),
        StepOutcome::WouldApply => "would apply".cyan().to_string(),
        StepOutcome::Skipped => "skipped".yellow().to_string(),
        StepOutcome::Succeeded => "succeeded".green().to_string(),
        StepOutcome::Failed => "failed".red().to_string(),
        StepOutcome::NotAttempted => "not attempted".dimmed().to_string(),
    }
}
