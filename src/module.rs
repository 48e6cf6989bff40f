//! Module cache of the active toolchain's GOPATH.
//!
//! Go keeps downloaded modules in `<GOPATH>/pkg/mod`:
//!
//! ```text
//! pkg/mod/
//!   github.com/!burnt!sushi/toml@v1.3.2/    # extracted module (read-only)
//!   golang.org/x/text@v0.14.0/
//!   cache/download/
//!     github.com/!burnt!sushi/toml/@v/
//!       v1.3.2.info  v1.3.2.mod  v1.3.2.zip  v1.3.2.ziphash
//! ```
//!
//! Uppercase letters in module paths are stored as `!` + lowercase. Go marks
//! extracted modules read-only, so deletion restores write permission first.

use crate::cache::{calculate_dir_size, format_size};
use crate::config::GoPathMode;
use crate::error::{GovmError, Result};
use crate::package::{validate_module_path, validate_version};
use crate::paths::home_dir;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub path: String,
    pub version: String,
    pub size: u64,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleCacheStats {
    pub total_modules: usize,
    pub total_size: u64,
    pub total_size_str: String,
    pub cache_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyStatus {
    Ok,
    Mismatch,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyResult {
    pub module: String,
    pub version: String,
    pub status: VerifyStatus,
    pub message: String,
}

/// `path` lies under `root` without climbing out through `..`.
fn is_within(root: &Path, path: &Path) -> bool {
    path.starts_with(root)
        && path
            .strip_prefix(root)
            .is_ok_and(|rest| rest.components().all(|c| matches!(c, Component::Normal(_))))
}

/// Encode a module path the way the module cache and proxies store it.
pub fn escape_module_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Inverse of [`escape_module_path`].
pub fn unescape_module_path(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '!' {
            if let Some(next) = chars.next() {
                out.push(next.to_ascii_uppercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Scans and cleans module caches; GOPATH is derived per call.
pub struct ModuleManager {
    gopath_root: PathBuf,
    settings: RwLock<(GoPathMode, String)>,
}

impl ModuleManager {
    /// `gopath_root` holds the isolated per-version GOPATHs.
    pub fn new(gopath_root: impl Into<PathBuf>, mode: GoPathMode, shared_gopath: &str) -> Self {
        Self {
            gopath_root: gopath_root.into(),
            settings: RwLock::new((mode, shared_gopath.to_string())),
        }
    }

    pub fn set_gopath_mode(&self, mode: GoPathMode, shared_override: &str) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) =
            (mode, shared_override.to_string());
    }

    pub fn mode(&self) -> GoPathMode {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).0
    }

    /// GOPATH for `tag`.
    ///
    /// Isolated mode gives every version its own `<gopath root>/<tag>`.
    /// Shared mode, and isolated mode without a version, use the override if
    /// set and Go's default `~/go` otherwise.
    pub fn gopath(&self, tag: &str) -> PathBuf {
        let (mode, shared) = self
            .settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match mode {
            GoPathMode::Isolated if !tag.is_empty() => self.gopath_root.join(tag),
            _ if !shared.trim().is_empty() => PathBuf::from(shared.trim()),
            _ => home_dir().join("go"),
        }
    }

    pub fn module_cache_path(&self, tag: &str) -> PathBuf {
        self.gopath(tag).join("pkg").join("mod")
    }

    /// Every extracted module under the cache, sorted by path then version.
    pub fn modules(&self, tag: &str) -> Result<Vec<ModuleInfo>> {
        let root = self.module_cache_path(tag);
        if !root.is_dir() {
            return Ok(vec![]);
        }

        let found = find_module_dirs(&root)?;
        let mut modules: Vec<ModuleInfo> = found
            .into_par_iter()
            .map(|(path, version, dir)| ModuleInfo {
                size: calculate_dir_size(&dir).unwrap_or(0),
                path,
                version,
                dir,
            })
            .collect();
        modules.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.version.cmp(&b.version)));
        Ok(modules)
    }

    pub fn stats(&self, tag: &str) -> Result<ModuleCacheStats> {
        let cache_path = self.module_cache_path(tag);
        let total_modules = self.modules(tag)?.len();
        let total_size = calculate_dir_size(&cache_path)?;
        Ok(ModuleCacheStats {
            total_modules,
            total_size,
            total_size_str: format_size(total_size),
            cache_path,
        })
    }

    /// Remove the whole module cache for `tag`.
    pub fn clean_module_cache(&self, tag: &str) -> Result<()> {
        let root = self.module_cache_path(tag);
        if !root.exists() {
            return Ok(());
        }
        make_writable(&root)?;
        fs::remove_dir_all(&root)?;
        info!("Removed module cache {}", root.display());
        Ok(())
    }

    /// Remove one module version: its extracted tree and download files.
    ///
    /// Paths that would land outside the module cache are rejected.
    pub fn clean_module(&self, module_path: &str, version: &str, tag: &str) -> Result<()> {
        validate_module_path(module_path)?;
        validate_version(version)?;

        let root = self.module_cache_path(tag);
        let escaped = escape_module_path(module_path);
        let extracted = root.join(format!("{}@{}", escaped, version));
        let download_dir = download_dir(&root, module_path);
        for path in [&extracted, &download_dir] {
            if !is_within(&root, path) {
                return Err(GovmError::parse(
                    "module path",
                    format!("{} is outside the module cache", path.display()),
                ));
            }
        }

        let prefix = format!("{}.", version);
        let download_files: Vec<PathBuf> = match fs::read_dir(&download_dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                .map(|e| e.path())
                .collect(),
            Err(_) => vec![],
        };

        if !extracted.exists() && download_files.is_empty() {
            return Err(GovmError::NotFound(format!(
                "{}@{} is not in the module cache",
                module_path, version
            )));
        }

        if extracted.exists() {
            make_writable(&extracted)?;
            fs::remove_dir_all(&extracted)?;
        }
        for file in download_files {
            make_writable(&file)?;
            fs::remove_file(&file)?;
        }
        info!("Removed {}@{} from module cache", module_path, version);
        Ok(())
    }

    /// Compare every extracted module against the `h1:` hash Go recorded
    /// when it downloaded the module.
    pub fn verify_modules(&self, tag: &str) -> Result<Vec<VerifyResult>> {
        let root = self.module_cache_path(tag);
        let modules = self.modules(tag)?;

        let results = modules
            .par_iter()
            .map(|m| verify_module(&root, m))
            .collect();
        Ok(results)
    }
}

fn download_dir(root: &Path, module_path: &str) -> PathBuf {
    root.join("cache")
        .join("download")
        .join(escape_module_path(module_path))
        .join("@v")
}

/// `(module path, version, dir)` for each `<last>@<version>` directory.
fn find_module_dirs(root: &Path) -> Result<Vec<(String, String, PathBuf)>> {
    let mut found = Vec::new();
    let mut it = WalkDir::new(root).min_depth(1).follow_links(false).into_iter();

    while let Some(entry) = it.next() {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read module cache: {}", e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.depth() == 1 && entry.file_name() == "cache" {
            it.skip_current_dir();
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let Some((last, version)) = name.split_once('@') else {
            continue;
        };

        let parent = entry
            .path()
            .parent()
            .and_then(|p| p.strip_prefix(root).ok())
            .map(slash_path)
            .unwrap_or_default();
        let escaped = if parent.is_empty() {
            last.to_string()
        } else {
            format!("{}/{}", parent, last)
        };

        found.push((
            unescape_module_path(&escaped),
            version.to_string(),
            entry.path().to_path_buf(),
        ));
        it.skip_current_dir();
    }

    debug!("Found {} modules under {}", found.len(), root.display());
    Ok(found)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn verify_module(root: &Path, module: &ModuleInfo) -> VerifyResult {
    let result = |status, message: String| VerifyResult {
        module: module.path.clone(),
        version: module.version.clone(),
        status,
        message,
    };

    let ziphash = download_dir(root, &module.path).join(format!("{}.ziphash", module.version));
    let expected = match fs::read_to_string(&ziphash) {
        Ok(s) => s.trim().to_string(),
        Err(_) => return result(VerifyStatus::Missing, "no recorded hash".to_string()),
    };

    let prefix = format!("{}@{}", module.path, module.version);
    match hash_dir(&module.dir, &prefix) {
        Ok(actual) if actual == expected => result(VerifyStatus::Ok, actual),
        Ok(actual) => result(
            VerifyStatus::Mismatch,
            format!("expected {}, found {}", expected, actual),
        ),
        Err(e) => result(VerifyStatus::Missing, e.to_string()),
    }
}

/// Go's `h1:` directory hash: a SHA-256 over sorted
/// `"<sha256 hex>  <prefix>/<relative path>\n"` lines, base64 encoded.
pub fn hash_dir(dir: &Path, prefix: &str) -> Result<String> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", dir.display(), e))?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(dir)
                .map(slash_path)
                .unwrap_or_default();
            files.push((format!("{}/{}", prefix, rel), entry.path().to_path_buf()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut summary = Sha256::new();
    for (name, path) in files {
        if name.contains('\n') {
            return Err(GovmError::parse("module file name", "contains a newline"));
        }
        let contents = fs::read(&path)?;
        summary.update(format!("{:x}  {}\n", Sha256::digest(&contents), name));
    }
    Ok(format!("h1:{}", STANDARD.encode(summary.finalize())))
}

/// Give the owner write permission on everything under `path`.
fn make_writable(path: &Path) -> Result<()> {
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        if entry.file_type().is_symlink() {
            continue;
        }
        let mut perms = entry.metadata().map_err(|e| anyhow::anyhow!(e))?.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(perms.mode() | 0o200);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            perms.set_readonly(false);
        }
        fs::set_permissions(entry.path(), perms)?;
    }
    Ok(())
}
