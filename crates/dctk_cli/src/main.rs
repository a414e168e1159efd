//! dctk CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid input
//! - 3: Invalid manifest
//! - 4: Archive write error
//! - 5: Apply conflict

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

use commands::{Cli, Commands};
use dctk_templates::TemplateError;

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_INPUT: u8 = 2;
    pub const INVALID_MANIFEST: u8 = 3;
    pub const ARCHIVE_ERROR: u8 = 4;
    pub const APPLY_CONFLICT: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for command output
    let level = cli.log_level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,dctk={level},dctk_cli={level},dctk_templates={level}"))
    });
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Package(args) => commands::package::execute(args).await,
        Commands::Apply(args) => commands::apply::execute(args).await,
        Commands::Inspect(args) => commands::inspect::execute(args).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

/// Map an error to its exit code.
fn categorize_error(e: &anyhow::Error) -> u8 {
    let template_error = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<TemplateError>());

    match template_error {
        Some(TemplateError::InvalidInput(_)) => ExitCodes::INVALID_INPUT,
        Some(TemplateError::InvalidManifest { .. }) => ExitCodes::INVALID_MANIFEST,
        Some(TemplateError::ArchiveWrite { .. }) => ExitCodes::ARCHIVE_ERROR,
        Some(TemplateError::ApplyConflict { .. }) => ExitCodes::APPLY_CONFLICT,
        Some(TemplateError::Io(_)) | Some(TemplateError::Json(_)) | None => {
            ExitCodes::GENERAL_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_categorize_through_context() {
        let err: anyhow::Result<()> = Err(TemplateError::ApplyConflict {
            path: "a".into(),
        })
        .context("Failed to apply template");
        assert_eq!(categorize_error(&err.unwrap_err()), ExitCodes::APPLY_CONFLICT);
    }

    #[test]
    fn test_categorize_unknown_error() {
        let err = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&err), ExitCodes::GENERAL_ERROR);
    }
}
