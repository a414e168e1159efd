//! CLI command definitions.
//!
//! This module defines the command structure for the dctk CLI.
//! Each subcommand maps to one operation of `dctk_templates`.

use clap::{Parser, Subcommand, ValueEnum};

pub mod apply;
pub mod inspect;
pub mod package;

/// dctk - dev container template kit
#[derive(Parser)]
#[command(name = "dctk")]
#[command(version, about = "dctk - package and apply dev container templates")]
#[command(long_about = r#"
dctk packages folders of dev container templates into distributable archives
and applies a template into a workspace.

COMMANDS:
  package  → Archive templates and write devcontainer-collection.json
  apply    → Materialize a template into a workspace folder
  inspect  → Show the collection entry one template would get

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid input
  3 - Invalid manifest
  4 - Archive write error
  5 - Apply conflict
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log verbosity (RUST_LOG overrides it)
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info, env = "DCTK_LOG_LEVEL")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package templates into archives plus a collection manifest
    Package(package::PackageArgs),

    /// Apply a template into a workspace folder
    Apply(apply::ApplyArgs),

    /// Print the metadata computed for one template
    Inspect(inspect::InspectArgs),
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from([
            "dctk",
            "apply",
            "--workspace-folder",
            "ws",
            "--template-id",
            "ghcr.io/devcontainers/templates/alpine:latest",
            "--log-level",
            "trace",
        ]);
        assert_eq!(cli.log_level, LogLevel::Trace);
        assert!(matches!(cli.command, Commands::Apply(_)));
    }
}
