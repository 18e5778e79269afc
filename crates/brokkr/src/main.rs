//! Brokkr CLI - a package manager for game mod archives
//!
//! This is the main entry point for the Brokkr command-line interface.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let instance = cli.instance.clone();
    let result = match cli.command {
        Commands::Install(args) => commands::install::run(args, instance.as_deref()).await,
        Commands::Remove(args) => commands::remove::run(args, instance.as_deref()),
        Commands::Upgrade(args) => commands::upgrade::run(args, instance.as_deref()).await,
        Commands::Update(args) => commands::update::run(args, instance.as_deref()).await,
        Commands::List(args) => commands::list::run(args, instance.as_deref()),
        Commands::Show(args) => commands::show::run(args, instance.as_deref()),
        Commands::Available(args) => commands::available::run(args, instance.as_deref()),
        Commands::Compare(args) => commands::compare::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}
