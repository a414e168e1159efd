//! Template archive creation.
//!
//! Each template becomes one gzip-compressed tarball holding its manifest and
//! every other file of its tree. Archives are staged under a unique temporary
//! name in the output folder and renamed into place once complete, so
//! concurrent writers never see each other's partial output.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, EntryType, Header};
use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::manifest::{LoadedManifest, MANIFEST_FILE};
use crate::tree::{self, TreeEntry};

/// Prefix of every template archive name.
pub const ARCHIVE_PREFIX: &str = "devcontainer-template-";

/// Extension of every template archive name.
pub const ARCHIVE_EXTENSION: &str = "tgz";

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

/// Archive file name for a template id.
pub fn archive_name(id: &str) -> String {
    format!("{}{}.{}", ARCHIVE_PREFIX, id, ARCHIVE_EXTENSION)
}

/// Writes template archives into an output folder.
#[derive(Debug, Clone)]
pub struct Archiver {
    output_dir: PathBuf,
    overwrite: bool,
}

impl Archiver {
    /// Create an archiver writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            overwrite: false,
        }
    }

    /// Allow replacing archives that already exist.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Archive one template folder, returning the archive path.
    pub fn archive(&self, template_dir: &Path, manifest: &LoadedManifest) -> TemplateResult<PathBuf> {
        let target = self.output_dir.join(archive_name(&manifest.id));
        if target.exists() && !self.overwrite {
            return Err(TemplateError::archive_write(&target, "archive already exists"));
        }

        let entries = tree::walk(template_dir, Some(&self.output_dir))
            .map_err(|e| TemplateError::archive_write(&target, e))?;

        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{}.", archive_name(&manifest.id)))
            .suffix(".partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| TemplateError::archive_write(&target, e))?;

        let synthesized = if manifest.synthesized {
            Some(manifest.synthesized_bytes()?)
        } else {
            None
        };

        write_archive(staged.as_file_mut(), synthesized.as_deref(), &entries)
            .map_err(|e| TemplateError::archive_write(&target, e))?;

        let persisted = if self.overwrite {
            staged.persist(&target)
        } else {
            staged.persist_noclobber(&target)
        };
        persisted.map_err(|e| TemplateError::archive_write(&target, e.error))?;

        debug!("Wrote archive {:?} ({} entries)", target, entries.len());
        Ok(target)
    }
}

fn write_archive(file: &mut File, manifest: Option<&[u8]>, entries: &[TreeEntry]) -> io::Result<()> {
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    if let Some(bytes) = manifest {
        append_file(&mut builder, MANIFEST_FILE, bytes, FILE_MODE)?;
    }

    for entry in entries {
        if entry.is_dir {
            let mut header = base_header(EntryType::Directory, 0, EXEC_MODE);
            builder.append_data(&mut header, format!("{}/", entry.relative), io::empty())?;
        } else {
            let data = fs::read(&entry.path)?;
            let mode = if is_executable(&entry.path)? {
                EXEC_MODE
            } else {
                FILE_MODE
            };
            append_file(&mut builder, &entry.relative, &data, mode)?;
        }
    }

    let mut encoder = builder.into_inner()?;
    encoder.flush()?;
    let file = encoder.finish()?;
    file.sync_all()
}

fn append_file<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8], mode: u32) -> io::Result<()> {
    let mut header = base_header(EntryType::Regular, data.len() as u64, mode);
    builder.append_data(&mut header, path, data)
}

fn base_header(entry_type: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn is_executable(path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    Ok(fs::metadata(path)?.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> io::Result<bool> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestReader;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    fn archive_paths(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_archive_contains_tree_and_synthesized_manifest() {
        let src = tempdir().unwrap();
        let template = src.path().join("alpine");
        fs::create_dir_all(&template).unwrap();
        fs::write(template.join(".devcontainer.json"), r#"{ "image": "alpine" }"#).unwrap();
        let out = tempdir().unwrap();

        let manifest = ManifestReader::read(&template).unwrap();
        let path = Archiver::new(out.path()).archive(&template, &manifest).unwrap();

        assert_eq!(path, out.path().join("devcontainer-template-alpine.tgz"));
        assert_eq!(
            archive_paths(&path),
            vec!["devcontainer-template.json", ".devcontainer.json"]
        );
    }

    #[test]
    fn test_archive_refuses_existing_without_overwrite() {
        let src = tempdir().unwrap();
        fs::write(src.path().join(".devcontainer.json"), "{}").unwrap();
        let out = tempdir().unwrap();
        let manifest = ManifestReader::read(src.path()).unwrap();

        let archiver = Archiver::new(out.path());
        archiver.archive(src.path(), &manifest).unwrap();
        let err = archiver.archive(src.path(), &manifest).unwrap_err();
        assert!(matches!(err, TemplateError::ArchiveWrite { .. }));

        archiver
            .clone()
            .overwrite(true)
            .archive(src.path(), &manifest)
            .unwrap();
    }

    #[test]
    fn test_archive_is_deterministic() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join(".devcontainer")).unwrap();
        fs::write(src.path().join(".devcontainer/Dockerfile"), "FROM debian").unwrap();
        fs::write(src.path().join(".devcontainer/devcontainer.json"), "{}").unwrap();
        let manifest = ManifestReader::read(src.path()).unwrap();

        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        let a = Archiver::new(first.path()).archive(src.path(), &manifest).unwrap();
        let b = Archiver::new(second.path()).archive(src.path(), &manifest).unwrap();
        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }

    #[test]
    fn test_no_partial_files_left_behind() {
        let src = tempdir().unwrap();
        fs::write(src.path().join(".devcontainer.json"), "{}").unwrap();
        let out = tempdir().unwrap();
        let manifest = ManifestReader::read(src.path()).unwrap();
        Archiver::new(out.path()).archive(src.path(), &manifest).unwrap();

        let names: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".partial"));
    }
}
