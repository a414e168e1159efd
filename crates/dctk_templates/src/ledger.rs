//! Record of what earlier applies wrote into a workspace.
//!
//! The ledger lives at `.dctk/applied.json` under the workspace root and maps
//! each template id to the SHA-256 of every file that template last wrote. A
//! destination still matching its recorded digest is template-owned and may be
//! replaced without `overwrite`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{TemplateError, TemplateResult};

/// Ledger location relative to the workspace root.
pub const LEDGER_FILE: &str = ".dctk/applied.json";

/// Per-template digests of applied files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyLedger {
    #[serde(default)]
    templates: BTreeMap<String, BTreeMap<String, String>>,
}

impl ApplyLedger {
    /// Path of the ledger inside `workspace`.
    pub fn path(workspace: &Path) -> PathBuf {
        workspace.join(LEDGER_FILE)
    }

    /// Load the ledger of `workspace`; a missing or unreadable ledger is empty.
    pub fn load(workspace: &Path) -> Self {
        let path = Self::path(workspace);
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!("Ignoring unreadable apply ledger {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Whether `contents` is exactly what `template` last wrote at `relative`.
    pub fn owns(&self, template: &str, relative: &str, contents: &[u8]) -> bool {
        self.templates
            .get(template)
            .and_then(|files| files.get(relative))
            .map_or(false, |digest| *digest == sha256_hex(contents))
    }

    /// Remember the files `template` has just written.
    pub fn record<'a>(&mut self, template: &str, files: impl IntoIterator<Item = (&'a str, &'a [u8])>) {
        let entry = self.templates.entry(template.to_string()).or_default();
        for (relative, contents) in files {
            entry.insert(relative.to_string(), sha256_hex(contents));
        }
    }

    /// Write the ledger into `workspace` through a temporary file.
    pub fn save(&self, workspace: &Path) -> TemplateResult<()> {
        let path = Self::path(workspace);
        let parent = path.parent().unwrap_or(workspace);
        fs::create_dir_all(parent)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".applied.")
            .suffix(".partial")
            .tempfile_in(parent)?;
        serde_json::to_writer_pretty(&mut staged, self)?;
        staged.write_all(b"\n")?;
        staged
            .persist(&path)
            .map_err(|e| TemplateError::Io(e.error))?;

        debug!("Updated apply ledger {:?}", path);
        Ok(())
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
