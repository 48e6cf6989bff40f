//! Toolchain extraction into the install root.
//!
//! Go archives contain a single top-level `go/` directory:
//!
//! ```text
//! go1.22.3.linux-amd64.tar.gz
//!   go/
//!     VERSION
//!     bin/go
//!     bin/gofmt
//!     pkg/ src/ ...
//! ```
//!
//! Extraction happens in a hidden staging directory next to the final
//! location. Only [`Staged::commit`] renames the toolchain into place, so a
//! crash or cancellation at any earlier point leaves nothing that looks like
//! an installed version; the staging directory is removed on drop.

use crate::error::{GovmError, Result};
use anyhow::Context;
use flate2::read::GzDecoder;
use std::fs;
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::warn;

/// Prefix of staging directories; scans skip anything starting with '.'.
pub const STAGING_PREFIX: &str = ".staging-";

/// An extracted toolchain waiting to be moved into place.
#[derive(Debug)]
pub struct Staged {
    _dir: TempDir,
    root: PathBuf,
}

impl Staged {
    /// The extracted GOROOT inside the staging directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Atomically move the staged toolchain to `dest`.
    pub fn commit(self, dest: &Path) -> Result<PathBuf> {
        if dest.exists() {
            return Err(anyhow::anyhow!("{} already exists", dest.display()).into());
        }
        fs::rename(&self.root, dest).with_context(|| {
            format!(
                "Failed to move {} into {}",
                self.root.display(),
                dest.display()
            )
        })?;
        Ok(dest.to_path_buf())
    }
}

/// Unpack a `.tar.gz` toolchain archive into a staging directory under
/// `install_root`.
pub fn unpack_to_staging(archive_path: &Path, install_root: &Path, tag: &str) -> Result<Staged> {
    fs::create_dir_all(install_root)
        .with_context(|| format!("Failed to create install root: {}", install_root.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(&format!("{}{}-", STAGING_PREFIX, tag))
        .tempdir_in(install_root)
        .with_context(|| format!("Failed to create staging dir in {}", install_root.display()))?;

    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_overwrite(true);
    archive
        .unpack(staging.path())
        .with_context(|| format!("Failed to extract {}", archive_path.display()))?;

    let root = find_goroot(staging.path()).ok_or_else(|| {
        GovmError::parse(
            archive_path.display().to_string(),
            "archive does not contain a Go toolchain",
        )
    })?;

    Ok(Staged { _dir: staging, root })
}

/// Remove staging directories for `tag` left behind by an interrupted
/// install. Callers must hold the tag's install lock.
pub fn sweep_staging(install_root: &Path, tag: &str) -> Result<()> {
    let Ok(entries) = fs::read_dir(install_root) else {
        return Ok(());
    };
    let prefix = format!("{}{}-", STAGING_PREFIX, tag);
    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let path = entry.path();
        warn!("Removing stale staging directory {}", path.display());
        fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Locate the GOROOT inside an extraction directory: either `go/` or the
/// directory itself.
fn find_goroot(dir: &Path) -> Option<PathBuf> {
    let nested = dir.join("go");
    if nested.join("bin").is_dir() {
        return Some(nested);
    }
    if dir.join("bin").is_dir() {
        return Some(dir.to_path_buf());
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a minimal Go-like archive in memory.
    pub(crate) fn fake_toolchain_archive(tag: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        let mut add = |path: &str, contents: &[u8], mode: u32| {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(mode);
            header.set_cksum();
            builder.append_data(&mut header, path, contents).unwrap();
        };
        add("go/VERSION", format!("go{}\ntime 2024-01-01\n", tag).as_bytes(), 0o644);
        add("go/bin/go", b"#!/bin/sh\necho go\n", 0o755);
        add("go/bin/gofmt", b"#!/bin/sh\n", 0o755);
        add("go/src/fmt/print.go", b"package fmt\n", 0o644);
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_unpack_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("go.tar.gz");
        fs::write(&archive, fake_toolchain_archive("1.22.0")).unwrap();
        let root = dir.path().join("versions");

        let staged = unpack_to_staging(&archive, &root, "1.22.0").unwrap();
        assert!(staged.root().join("bin/go").exists());

        let dest = staged.commit(&root.join("1.22.0")).unwrap();
        assert!(dest.join("VERSION").exists());

        // Only the committed version remains; staging was cleaned up.
        let names: Vec<_> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["1.22.0".to_string()]);
    }

    #[test]
    fn test_dropped_staging_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("go.tar.gz");
        fs::write(&archive, fake_toolchain_archive("1.22.0")).unwrap();
        let root = dir.path().join("versions");

        let staged = unpack_to_staging(&archive, &root, "1.22.0").unwrap();
        drop(staged);

        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_entries_escaping_staging_are_not_written() {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        let mut add_raw = |name: &[u8], contents: &[u8]| {
            let mut header = tar::Header::new_gnu();
            // Set the name directly; append_data refuses `..`
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder.append(&header, contents).unwrap();
        };
        add_raw(b"../evil", b"escaped");
        add_raw(b"go/../../evil2", b"escaped");
        add_raw(b"go/VERSION", b"go1.22.0\n");
        add_raw(b"go/bin/go", b"#!/bin/sh\n");
        let bytes = builder.into_inner().unwrap().finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("go.tar.gz");
        fs::write(&archive, bytes).unwrap();
        let root = dir.path().join("versions");

        let staged = unpack_to_staging(&archive, &root, "1.22.0").unwrap();
        assert!(staged.root().join("bin/go").is_file());
        assert!(!root.join("evil").exists());
        assert!(!root.join("evil2").exists());
        assert!(!dir.path().join("evil").exists());
        assert!(!dir.path().join("evil2").exists());
    }

    #[test]
    fn test_sweep_removes_only_stale_staging_for_tag() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in [".staging-1.22.0-abc123", ".staging-1.22.0-def456", ".staging-1.21.0-xyz", "1.22.0"] {
            fs::create_dir_all(root.join(name).join("go/bin")).unwrap();
        }

        sweep_staging(root, "1.22.0").unwrap();

        let mut names: Vec<_> = fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![".staging-1.21.0-xyz", "1.22.0"]);

        // A missing root is not an error
        sweep_staging(&root.join("absent"), "1.22.0").unwrap();
    }

    #[test]
    fn test_corrupt_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("go.tar.gz");
        fs::write(&archive, b"not a gzip stream").unwrap();

        assert!(unpack_to_staging(&archive, &dir.path().join("versions"), "1.22.0").is_err());
    }
}
