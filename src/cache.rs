//! Download cache: toolchain archives kept under `<base>/cache`.

use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    /// Bytes used by downloaded archives (complete or partial).
    pub download_cache_size: u64,
    pub download_cache_path: PathBuf,
    /// Bytes used by everything under the cache directory.
    pub total_size: u64,
    pub total_size_human: String,
}

/// Outcome of a cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleaned {
    pub removed: usize,
    pub freed: u64,
}

pub struct CacheManager {
    dir: PathBuf,
}

impl CacheManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn info(&self) -> Result<CacheInfo> {
        let mut download_cache_size = 0u64;
        if self.dir.is_dir() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                if path.is_file() && is_archive(&path) {
                    download_cache_size += fs::metadata(&path)?.len();
                }
            }
        }
        let total_size = calculate_dir_size(&self.dir)?;

        Ok(CacheInfo {
            download_cache_size,
            download_cache_path: self.dir.clone(),
            total_size,
            total_size_human: format_size(total_size),
        })
    }

    /// Remove downloaded archives, including partial downloads.
    pub fn clean_download_cache(&self) -> Result<Cleaned> {
        let mut cleaned = Cleaned::default();
        if !self.dir.exists() {
            return Ok(cleaned);
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && is_archive(&path) {
                cleaned.freed += fs::metadata(&path)?.len();
                fs::remove_file(&path)?;
                cleaned.removed += 1;
                debug!("Removed {}", path.display());
            }
        }

        info!(
            "Removed {} archives, freed {}",
            cleaned.removed,
            format_size(cleaned.freed)
        );
        Ok(cleaned)
    }

    /// Empty the cache directory entirely.
    pub fn clean_all(&self) -> Result<Cleaned> {
        let mut cleaned = Cleaned::default();
        if !self.dir.exists() {
            return Ok(cleaned);
        }

        cleaned.freed = calculate_dir_size(&self.dir)?;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            cleaned.removed += 1;
        }

        info!("Cleared cache at {}", self.dir.display());
        Ok(cleaned)
    }
}

fn is_archive(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.ends_with(".tar.gz") || name.ends_with(".zip") || name.ends_with(".part")
}

pub fn calculate_dir_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;

    if !path.exists() {
        return Ok(0);
    }

    for entry in walkdir::WalkDir::new(path).follow_links(false).max_open(64) {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read directory: {}", e))?;
        if entry.file_type().is_file() {
            total += entry
                .metadata()
                .map_err(|e| anyhow::anyhow!("Failed to read metadata: {}", e))?
                .len();
        }
    }

    Ok(total)
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
