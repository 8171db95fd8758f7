mod cli;
mod commands;
mod config;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let file = cli.file.as_deref();

    match cli.command {
        Command::Apply(args) => commands::apply::run(&ctx, file, &args),
        Command::Plan => commands::plan::run(&ctx, file),
        Command::Status(args) => commands::status::run(&ctx, file, &args),
        Command::Validate => commands::validate::run(&ctx, file),
        Command::Reset(args) => commands::reset::run(&ctx, file, &args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "muster", &mut io::stdout());
            Ok(())
        }
    }
}
