//! Template tree walking.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::TemplateResult;

/// One file or folder inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Path relative to the template root, `/`-separated
    pub relative: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// List a template tree in sorted order, skipping `exclude` and everything under it.
pub fn walk(root: &Path, exclude: Option<&Path>) -> TemplateResult<Vec<TreeEntry>> {
    let exclude = exclude.and_then(|path| path.canonicalize().ok());
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match &exclude {
            Some(excluded) => entry
                .path()
                .canonicalize()
                .map_or(true, |path| &path != excluded),
            None => true,
        });

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        entries.push(TreeEntry {
            relative: to_slash(relative),
            path: entry.path().to_path_buf(),
            is_dir: entry.file_type().is_dir(),
        });
    }

    Ok(entries)
}

/// Count the regular files in a template tree.
pub fn count_files(root: &Path, exclude: Option<&Path>) -> TemplateResult<usize> {
    Ok(walk(root, exclude)?.iter().filter(|e| !e.is_dir).count())
}

/// Render a relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
