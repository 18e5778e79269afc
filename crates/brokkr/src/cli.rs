//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Brokkr - a package manager for game mod archives
#[derive(Parser, Debug)]
#[command(name = "brokkr")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the game instance (default: current directory)
    #[arg(short, long, global = true)]
    pub instance: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install mods, resolving their dependencies
    Install(InstallArgs),

    /// Remove mods and everything depending on them
    Remove(RemoveArgs),

    /// Upgrade installed mods to newer versions
    Upgrade(UpgradeArgs),

    /// Refresh available mods from the metadata repository
    Update(UpdateArgs),

    /// List installed mods
    List(ListArgs),

    /// Show metadata for one mod
    Show(ShowArgs),

    /// List mods installable against this instance
    Available(AvailableArgs),

    /// Compare two version strings
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Mods to install, as name or name=version
    #[arg(required = true)]
    pub mods: Vec<String>,

    /// Do not install recommended mods
    #[arg(long)]
    pub no_recommends: bool,

    /// Install suggested mods (one level deep)
    #[arg(long)]
    pub with_suggests: bool,

    /// Install suggested mods, and their suggestions, recursively
    #[arg(long)]
    pub with_all_suggests: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Mods to remove
    #[arg(required_unless_present = "all")]
    pub mods: Vec<String>,

    /// Remove every installed mod
    #[arg(long)]
    pub all: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    /// Mods to upgrade, as name or name=version
    #[arg(required_unless_present = "all")]
    pub mods: Vec<String>,

    /// Upgrade every installed mod
    #[arg(long)]
    pub all: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Repository archive URL or local path (default: from brokkr.yaml)
    #[arg(long)]
    pub repo: Option<String>,

    /// List new and removed releases after the refresh
    #[arg(long)]
    pub list_changes: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Plain "name version" lines for scripts
    #[arg(long)]
    pub porcelain: bool,

    /// Export the list instead of printing a table
    #[arg(long, value_enum)]
    pub export: Option<ExportFormat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Mod identifier
    pub name: String,
}

#[derive(Args, Debug)]
pub struct AvailableArgs {
    /// Include every known version, not just the latest
    #[arg(long)]
    pub all_versions: bool,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// First version
    pub left: String,

    /// Second version
    pub right: String,
}
