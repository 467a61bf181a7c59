use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand, ValueEnum};
use sigmux_stream::MetadataPolicy;

use crate::exit::{io_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod check;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a streaming pipeline from connection definitions.
    Run(RunArgs),
    /// Parse connection definitions and display them.
    Check(CheckArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args),
        Command::Check(args) => check::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Connection definition text.
    #[arg(value_name = "DEFINITIONS", conflicts_with = "file")]
    pub definitions: Option<String>,

    /// Read connection definitions from a file.
    #[arg(long, short = 'f', value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// How additional metadata is generated for new recordings.
    #[arg(long, value_enum, default_value_t = MetadataArg::Auto)]
    pub metadata: MetadataArg,

    /// Parse and validate the definitions without moving any data.
    #[arg(long)]
    pub no_stream: bool,

    /// Repository root directory.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Connection definition text.
    #[arg(value_name = "DEFINITIONS", conflicts_with = "file")]
    pub definitions: Option<String>,

    /// Read connection definitions from a file.
    #[arg(long, short = 'f', value_name = "FILE")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MetadataArg {
    /// Link sources only when no metadata fragment is supplied.
    Auto,
    /// Never generate additional metadata.
    None,
    /// Always link every source recording.
    All,
}

impl From<MetadataArg> for MetadataPolicy {
    fn from(arg: MetadataArg) -> Self {
        match arg {
            MetadataArg::Auto => MetadataPolicy::Auto,
            MetadataArg::None => MetadataPolicy::None,
            MetadataArg::All => MetadataPolicy::All,
        }
    }
}

/// Definitions come from the command line or a file, never both.
pub fn read_definitions(text: Option<&str>, file: Option<&Path>) -> CliResult<String> {
    if let Some(path) = file {
        return fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    if let Some(text) = text {
        return Ok(text.to_string());
    }
    Err(CliError::new(
        USAGE,
        "connection definitions required (inline or via --file)",
    ))
}
