//! Error types for template packaging and application.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur during template operations.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid manifest in template {template}: {message}")]
    InvalidManifest { template: String, message: String },

    #[error("Failed to write archive {path}: {message}")]
    ArchiveWrite { path: PathBuf, message: String },

    #[error("Refusing to overwrite {path}: existing content differs from template output")]
    ApplyConflict { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TemplateError {
    pub(crate) fn invalid_manifest(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            template: template.into(),
            message: message.into(),
        }
    }

    pub(crate) fn archive_write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::ArchiveWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
