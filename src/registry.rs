//! Version registry: installed toolchains, install/uninstall and the active
//! version marker.
//!
//! The registry owns two kinds of state:
//! - **Installed versions**, derived from disk on every query. A managed
//!   version is a directory `<install root>/<tag>` holding a Go toolchain and
//!   a receipt; a system version is any other valid GOROOT the user
//!   registered or govm detected.
//! - **`state.json`**, holding the active version marker, extra install roots
//!   used by custom-directory installs and registered system paths.
//!
//! Installs run as background tasks that stream [`InstallEvent`]s. One
//! install per tag may be in flight; uninstall and use of a tag wait for it.

use crate::api::GoApi;
use crate::cache::calculate_dir_size;
use crate::config::Config;
use crate::download::download_archive;
use crate::error::{GovmError, Result};
use crate::extract::{Staged, sweep_staging, unpack_to_staging};
use crate::paths::{GovmPaths, write_atomic};
use crate::platform::{Platform, host_go_binary};
use crate::progress::{InstallEvent, PROGRESS_BUFFER, Phase, ProgressReporter};
use crate::receipt::{InstallReceipt, RECEIPT_FILE};
use crate::resolve::Resolver;
use crate::version::{compare_versions, is_valid_tag, normalize_tag};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where an installed toolchain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallSource {
    /// Installed and owned by govm.
    Managed,
    /// Pre-existing toolchain govm only points at.
    System,
}

/// An installed toolchain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledVersion {
    pub version: String,
    pub path: PathBuf,
    pub installed_at: Option<DateTime<Utc>>,
    /// Bytes on disk; 0 when unknown (system installs).
    pub size: u64,
    pub source: InstallSource,
    pub is_current: bool,
}

impl InstalledVersion {
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }
}

/// The persisted "in use" version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveVersionMarker {
    pub version: String,
    pub path: PathBuf,
    pub switched_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RegistryState {
    current: Option<ActiveVersionMarker>,
    install_roots: Vec<PathBuf>,
    system_paths: Vec<PathBuf>,
}

/// A running install.
///
/// Dropping the handle cancels the install at its next checkpoint; any
/// partial download or extraction is removed.
pub struct InstallHandle {
    version: String,
    events: mpsc::Receiver<InstallEvent>,
    task: JoinHandle<Result<InstalledVersion>>,
}

impl InstallHandle {
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Next event; `None` after the terminal event has been consumed.
    pub async fn next_event(&mut self) -> Option<InstallEvent> {
        self.events.recv().await
    }

    /// Drain events into `on_event` and return the install result.
    pub async fn wait_with(
        mut self,
        mut on_event: impl FnMut(&InstallEvent),
    ) -> Result<InstalledVersion> {
        while let Some(event) = self.events.recv().await {
            on_event(&event);
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(GovmError::Cancelled(self.version)),
            Err(e) => Err(anyhow::anyhow!("Install task for Go {} failed: {}", self.version, e).into()),
        }
    }

    pub async fn wait(self) -> Result<InstalledVersion> {
        self.wait_with(|_| {}).await
    }

    /// Abort the install and wait until it has stopped.
    pub async fn cancel(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

struct Inner {
    api: RwLock<GoApi>,
    default_root: PathBuf,
    install_root: RwLock<PathBuf>,
    cache_dir: RwLock<PathBuf>,
    default_cache: PathBuf,
    state_file: PathBuf,
    state_lock: Mutex<()>,
    tag_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    system_candidates: Vec<PathBuf>,
    resolver: Resolver,
}

/// Tracks installed toolchains and the active version.
#[derive(Clone)]
pub struct VersionRegistry {
    inner: Arc<Inner>,
}

impl VersionRegistry {
    pub fn new(paths: &GovmPaths, config: &Config) -> Result<Self> {
        Self::build(paths, config, Vec::new())
    }

    /// Same as [`VersionRegistry::new`] but also scans well-known system
    /// locations for pre-existing toolchains.
    pub fn with_system_detection(paths: &GovmPaths, config: &Config) -> Result<Self> {
        Self::build(paths, config, system_candidates())
    }

    fn build(paths: &GovmPaths, config: &Config, system_candidates: Vec<PathBuf>) -> Result<Self> {
        let api = GoApi::new(&config.mirror_base(), &config.proxy)?;
        let registry = Self {
            inner: Arc::new(Inner {
                api: RwLock::new(api),
                default_root: paths.versions_dir(),
                install_root: RwLock::new(paths.versions_dir()),
                cache_dir: RwLock::new(paths.cache_dir()),
                default_cache: paths.cache_dir(),
                state_file: paths.state_file(),
                state_lock: Mutex::new(()),
                tag_locks: Mutex::new(HashMap::new()),
                system_candidates,
                resolver: Resolver::default(),
            }),
        };
        registry.set_paths(&config.install_dir, &config.cache_dir);
        Ok(registry)
    }

    /// Apply custom install/cache directories; empty strings restore defaults.
    pub fn set_paths(&self, install_dir: &str, cache_dir: &str) {
        let root = if install_dir.trim().is_empty() {
            self.inner.default_root.clone()
        } else {
            PathBuf::from(install_dir.trim())
        };
        let cache = if cache_dir.trim().is_empty() {
            self.inner.default_cache.clone()
        } else {
            PathBuf::from(cache_dir.trim())
        };
        *write_lock(&self.inner.install_root) = root;
        *write_lock(&self.inner.cache_dir) = cache;
    }

    pub fn set_mirror(&self, mirror: &str, proxy: &str) -> Result<()> {
        let base = if mirror.trim().is_empty() {
            crate::config::DEFAULT_MIRROR
        } else {
            mirror
        };
        *write_lock(&self.inner.api) = GoApi::new(base, proxy)?;
        Ok(())
    }

    pub fn install_root(&self) -> PathBuf {
        read_lock(&self.inner.install_root).clone()
    }

    pub fn cache_dir(&self) -> PathBuf {
        read_lock(&self.inner.cache_dir).clone()
    }

    /// Every root managed versions may live in.
    pub fn install_roots(&self) -> Result<Vec<PathBuf>> {
        let mut roots = vec![self.install_root(), self.inner.default_root.clone()];
        roots.extend(self.load_state()?.install_roots);
        dedup_paths(&mut roots);
        Ok(roots)
    }

    fn api(&self) -> GoApi {
        read_lock(&self.inner.api).clone()
    }

    // ==================== Remote ====================

    pub async fn list_remote(&self, include_unstable: bool) -> Result<Vec<crate::api::RemoteVersion>> {
        self.api().list_remote(include_unstable).await
    }

    pub async fn latest_stable(&self) -> Result<String> {
        self.api().latest_stable().await
    }

    // ==================== Local ====================

    /// All valid toolchains: managed ones from every install root, then
    /// registered and detected system toolchains. Invalid directories are
    /// skipped silently.
    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        let state = self.load_state()?;
        let current_path = state.current.as_ref().map(|m| m.path.clone());

        let mut versions = Vec::new();
        for root in &self.install_roots()? {
            versions.extend(scan_install_root(root)?);
        }

        let mut system = state.system_paths.clone();
        system.extend(self.inner.system_candidates.iter().cloned());
        dedup_paths(&mut system);
        for path in system {
            if versions.iter().any(|v: &InstalledVersion| v.path == path) {
                continue;
            }
            if let Some(version) = system_goroot(&path) {
                versions.push(version);
            }
        }

        for v in &mut versions {
            v.is_current = current_path.as_ref() == Some(&v.path);
        }

        versions.sort_by(|a, b| {
            compare_versions(&b.version, &a.version)
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(versions)
    }

    /// Resolve an identifier against installed versions without changing
    /// anything.
    pub fn resolve(&self, id: &str) -> Result<InstalledVersion> {
        let installed = self.list_installed()?;
        self.inner.resolver.resolve(id, &installed).cloned()
    }

    pub fn current(&self) -> Result<Option<ActiveVersionMarker>> {
        Ok(self.load_state()?.current)
    }

    /// Tag of the active version, or an empty string.
    pub fn current_version(&self) -> String {
        match self.current() {
            Ok(Some(marker)) => marker.version,
            Ok(None) => String::new(),
            Err(e) => {
                warn!("Failed to read active version: {}", e);
                String::new()
            }
        }
    }

    /// Make `id` the active version. Does not touch the environment.
    pub async fn use_version(&self, id: &str) -> Result<InstalledVersion> {
        let mut target = self.resolve(id)?;
        let _guard = self.lock_tag(&target.version).await;

        // Re-check under the lock: an uninstall may have won the race.
        if !is_valid_goroot(&target.path) {
            return Err(GovmError::NotInstalled(target.version));
        }

        self.update_state(|state| {
            state.current = Some(ActiveVersionMarker {
                version: target.version.clone(),
                path: target.path.clone(),
                switched_at: Utc::now(),
            });
        })?;
        info!("Active Go version is now {} ({})", target.version, target.path.display());
        target.is_current = true;
        Ok(target)
    }

    /// Unset the active version marker.
    pub fn clear_current(&self) -> Result<()> {
        self.update_state(|state| state.current = None)
    }

    /// Register an existing toolchain directory as a system version.
    pub fn register_system(&self, path: &Path) -> Result<InstalledVersion> {
        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let version = system_goroot(&path).ok_or_else(|| {
            GovmError::NotFound(format!("{} is not a Go toolchain", path.display()))
        })?;
        self.update_state(|state| {
            if !state.system_paths.contains(&path) {
                state.system_paths.push(path.clone());
            }
        })?;
        Ok(version)
    }

    // ==================== Install ====================

    /// Start installing `tag` into `install_dir` (or the configured root).
    ///
    /// Returns immediately with a handle streaming progress. If the version is
    /// already installed there the stream completes straight away.
    ///
    /// # Errors
    ///
    /// [`GovmError::AlreadyInstalling`] if another install of the same tag is
    /// in flight; [`GovmError::Parse`] for a malformed tag.
    pub fn install(&self, tag: &str, install_dir: Option<&Path>) -> Result<InstallHandle> {
        let tag = normalize_tag(tag);
        if !is_valid_tag(&tag) {
            return Err(GovmError::parse("version tag", format!("'{}' is not a Go version", tag)));
        }

        let guard = self
            .tag_lock(&tag)
            .try_lock_owned()
            .map_err(|_| GovmError::AlreadyInstalling(tag.clone()))?;

        let root = install_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.install_root());
        let (mut reporter, events) = ProgressReporter::channel(&tag, PROGRESS_BUFFER);
        let registry = self.clone();
        let task_tag = tag.clone();

        let task = tokio::spawn(async move {
            let _guard: OwnedMutexGuard<()> = guard;
            let result = registry.run_install(&task_tag, &root, &mut reporter).await;
            match &result {
                Ok(installed) => {
                    reporter
                        .finish(InstallEvent::Completed(installed.clone()))
                        .await
                }
                Err(e) => {
                    warn!("Install of Go {} failed: {}", task_tag, e);
                    reporter.finish(InstallEvent::Failed(e.to_string())).await
                }
            }
            result
        });

        Ok(InstallHandle {
            version: tag,
            events,
            task,
        })
    }

    /// Install and wait for completion, discarding progress.
    pub async fn install_and_wait(&self, tag: &str, install_dir: Option<&Path>) -> Result<InstalledVersion> {
        self.install(tag, install_dir)?.wait().await
    }

    async fn run_install(
        &self,
        tag: &str,
        root: &Path,
        reporter: &mut ProgressReporter,
    ) -> Result<InstalledVersion> {
        let dest = root.join(tag);
        if let Some(existing) = managed_goroot(&dest) {
            info!("Go {} is already installed at {}", tag, dest.display());
            return Ok(existing);
        }
        if dest.exists() {
            // Only a broken govm install may be replaced
            if !dest.join(RECEIPT_FILE).is_file() {
                return Err(anyhow::anyhow!(
                    "{} already exists and is not a Go toolchain; move it away first",
                    dest.display()
                )
                .into());
            }
            warn!("Removing incomplete install {}", dest.display());
            fs::remove_dir_all(&dest)
                .with_context(|| format!("Failed to remove {}", dest.display()))?;
        }
        sweep_staging(root, tag)?;

        let platform = Platform::current()?;
        let api = self.api();
        let remote = api
            .find(tag)
            .await?
            .ok_or_else(|| GovmError::NotFound(format!("Go {} is not available from {}", tag, api.mirror())))?;
        let file = remote
            .archive_for(&platform)
            .ok_or_else(|| GovmError::Unsupported(format!("Go {} has no archive for {}", tag, platform)))?
            .clone();

        // Downloading
        let url = api.archive_url(&file.filename);
        let archive = self.cache_dir().join(&file.filename);
        info!("Downloading {}", url);
        download_archive(api.client(), &url, &archive, &file.sha256, file.size, reporter).await?;

        // Extracting
        let archive_size = fs::metadata(&archive).map(|m| m.len()).unwrap_or(file.size);
        self.ensure_live(tag, reporter)?;
        reporter.checkpoint(Phase::Extracting, 0, archive_size).await;
        let staged = {
            let (archive, root, tag) = (archive.clone(), root.to_path_buf(), tag.to_string());
            blocking(move || unpack_to_staging(&archive, &root, &tag)).await?
        };
        reporter
            .checkpoint(Phase::Extracting, archive_size, archive_size)
            .await;

        // Verifying
        self.ensure_live(tag, reporter)?;
        reporter.checkpoint(Phase::Verifying, 0, 1).await;
        let receipt = InstallReceipt::new(tag, &url, &file.sha256, &platform.os, &platform.arch);
        let (staged, receipt) = {
            let tag = tag.to_string();
            blocking(move || {
                verify_staged(&staged, &tag)?;
                let mut receipt = receipt;
                receipt.size = calculate_dir_size(staged.root())?;
                receipt.write(staged.root())?;
                Ok((staged, receipt))
            })
            .await?
        };

        self.ensure_live(tag, reporter)?;
        let path = {
            let dest = dest.clone();
            blocking(move || staged.commit(&dest)).await?
        };
        reporter.checkpoint(Phase::Verifying, 1, 1).await;

        if root != self.inner.default_root {
            let root = root.to_path_buf();
            self.update_state(|state| {
                if !state.install_roots.contains(&root) {
                    state.install_roots.push(root.clone());
                }
            })?;
        }

        info!("Installed Go {} at {}", tag, path.display());
        Ok(InstalledVersion {
            version: tag.to_string(),
            path,
            installed_at: Some(receipt.installed_at),
            size: receipt.size,
            source: InstallSource::Managed,
            is_current: false,
        })
    }

    fn ensure_live(&self, tag: &str, reporter: &ProgressReporter) -> Result<()> {
        if reporter.is_closed() {
            return Err(GovmError::Cancelled(tag.to_string()));
        }
        Ok(())
    }

    // ==================== Uninstall ====================

    /// Remove an installed version.
    ///
    /// Managed versions are deleted from disk. Registered system versions are
    /// only deregistered; govm never deletes a toolchain it did not install.
    pub async fn uninstall(&self, tag: &str) -> Result<()> {
        let tag = normalize_tag(tag);
        let _guard = self.lock_tag(&tag).await;

        let installed = self.list_installed()?;
        let target = installed
            .iter()
            .find(|v| v.version == tag && v.source == InstallSource::Managed)
            .or_else(|| installed.iter().find(|v| v.version == tag))
            .cloned()
            .ok_or_else(|| GovmError::NotInstalled(tag.clone()))?;

        if let Some(marker) = self.current()? {
            if marker.path == target.path {
                return Err(GovmError::ActiveVersion(tag));
            }
        }

        match target.source {
            InstallSource::Managed => {
                let path = target.path.clone();
                blocking(move || {
                    fs::remove_dir_all(&path)
                        .with_context(|| format!("Failed to remove {}", path.display()))?;
                    Ok(())
                })
                .await?;
                info!("Removed Go {} from {}", tag, target.path.display());
            }
            InstallSource::System => {
                let mut registered = false;
                self.update_state(|state| {
                    let before = state.system_paths.len();
                    state.system_paths.retain(|p| p != &target.path);
                    registered = state.system_paths.len() != before;
                })?;
                if !registered {
                    return Err(anyhow::anyhow!(
                        "Go {} at {} was not installed by govm; remove it manually",
                        tag,
                        target.path.display()
                    )
                    .into());
                }
                info!("Deregistered system Go {} ({})", tag, target.path.display());
            }
        }
        Ok(())
    }

    // ==================== Locks & state ====================

    fn tag_lock(&self, tag: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .tag_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks
            .entry(tag.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn lock_tag(&self, tag: &str) -> OwnedMutexGuard<()> {
        self.tag_lock(tag).lock_owned().await
    }

    fn load_state(&self) -> Result<RegistryState> {
        let _guard = self.inner.state_lock.lock().unwrap_or_else(|e| e.into_inner());
        read_state(&self.inner.state_file)
    }

    fn update_state(&self, f: impl FnOnce(&mut RegistryState)) -> Result<()> {
        let _guard = self.inner.state_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = read_state(&self.inner.state_file)?;
        f(&mut state);
        let json = serde_json::to_string_pretty(&state)?;
        write_atomic(&self.inner.state_file, json.as_bytes())
            .with_context(|| format!("Failed to write {}", self.inner.state_file.display()))?;
        Ok(())
    }
}

fn read_state(path: &Path) -> Result<RegistryState> {
    if !path.exists() {
        return Ok(RegistryState::default());
    }
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| GovmError::parse(path.display().to_string(), e))
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GovmError::Other(anyhow::anyhow!("Blocking task failed: {}", e)))?
}

fn dedup_paths(paths: &mut Vec<PathBuf>) {
    let mut seen = Vec::new();
    paths.retain(|p| {
        if seen.contains(p) {
            false
        } else {
            seen.push(p.clone());
            true
        }
    });
}

/// A directory is a toolchain if it has `bin/go` plus a `VERSION` file or a
/// govm receipt.
pub fn is_valid_goroot(path: &Path) -> bool {
    path.join("bin").join(host_go_binary()).is_file()
        && (path.join("VERSION").is_file() || path.join(RECEIPT_FILE).is_file())
}

/// Tag from the first line of `GOROOT/VERSION` (`go1.22.3`).
pub fn read_version_file(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path.join("VERSION")).ok()?;
    let first = contents.lines().next()?.trim();
    let tag = normalize_tag(first);
    is_valid_tag(&tag).then_some(tag)
}

fn managed_goroot(path: &Path) -> Option<InstalledVersion> {
    if !is_valid_goroot(path) {
        return None;
    }
    let receipt = InstallReceipt::read(path).ok();
    let version = receipt
        .as_ref()
        .map(|r| r.version.clone())
        .or_else(|| path.file_name().map(|n| n.to_string_lossy().to_string()))?;
    Some(InstalledVersion {
        version,
        path: path.to_path_buf(),
        installed_at: receipt.as_ref().map(|r| r.installed_at),
        size: receipt.as_ref().map(|r| r.size).unwrap_or(0),
        source: InstallSource::Managed,
        is_current: false,
    })
}

fn system_goroot(path: &Path) -> Option<InstalledVersion> {
    if !is_valid_goroot(path) {
        return None;
    }
    let version = read_version_file(path)?;
    Some(InstalledVersion {
        version,
        path: path.to_path_buf(),
        installed_at: None,
        size: 0,
        source: InstallSource::System,
        is_current: false,
    })
}

fn scan_install_root(root: &Path) -> Result<Vec<InstalledVersion>> {
    if !root.is_dir() {
        return Ok(vec![]);
    }

    let mut versions = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Failed to read {}", root.display()))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        // Hidden entries include staging directories of in-flight installs
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        match managed_goroot(&path) {
            Some(version) => versions.push(version),
            None => debug!("Skipping {}: not a Go toolchain", path.display()),
        }
    }
    Ok(versions)
}

fn verify_staged(staged: &Staged, tag: &str) -> Result<()> {
    let root = staged.root();
    if !root.join("bin").join(host_go_binary()).is_file() {
        return Err(GovmError::parse(
            format!("Go {} archive", tag),
            "bin/go is missing",
        ));
    }
    if let Some(found) = read_version_file(root) {
        if found != tag {
            return Err(GovmError::parse(
                format!("Go {} archive", tag),
                format!("VERSION says {}", found),
            ));
        }
    }
    Ok(())
}

/// Well-known locations of toolchains installed outside govm.
fn system_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(goroot) = std::env::var_os("GOROOT") {
        candidates.push(PathBuf::from(goroot));
    }
    #[cfg(unix)]
    {
        candidates.push(PathBuf::from("/usr/local/go"));
        candidates.push(PathBuf::from("/usr/lib/go"));
        candidates.push(PathBuf::from("/opt/homebrew/opt/go/libexec"));
    }
    #[cfg(windows)]
    {
        candidates.push(PathBuf::from(r"C:\Program Files\Go"));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn fake_goroot(path: &Path, tag: &str) {
        fs::create_dir_all(path.join("bin")).unwrap();
        fs::write(path.join("bin").join(host_go_binary()), b"").unwrap();
        fs::write(path.join("VERSION"), format!("go{}\n", tag)).unwrap();
    }

    fn registry(base: &Path) -> VersionRegistry {
        VersionRegistry::new(&GovmPaths::new(base), &Config::default()).unwrap()
    }

    #[test]
    fn test_invalid_directories_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let versions = dir.path().join("versions");

        fake_goroot(&versions.join("1.22.0"), "1.22.0");
        fs::create_dir_all(versions.join("1.21.0/src")).unwrap();
        fs::create_dir_all(versions.join(".staging-1.23.0-abc/go/bin")).unwrap();

        let installed = reg.list_installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version, "1.22.0");
        assert_eq!(installed[0].source, InstallSource::Managed);
    }

    #[test]
    fn test_system_registration_and_sorting() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        fake_goroot(&dir.path().join("versions/1.21.5"), "1.21.5");
        let system = dir.path().join("usr-local-go");
        fake_goroot(&system, "1.22.1");

        let registered = reg.register_system(&system).unwrap();
        assert_eq!(registered.version, "1.22.1");

        let installed = reg.list_installed().unwrap();
        let tags: Vec<_> = installed.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(tags, vec!["1.22.1", "1.21.5"]);
        assert_eq!(installed[0].source, InstallSource::System);
    }

    #[test]
    fn test_register_rejects_non_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(reg.register_system(dir.path()).is_err());
    }

    #[tokio::test]
    async fn test_use_and_uninstall_guard() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        fake_goroot(&dir.path().join("versions/1.21.0"), "1.21.0");
        fake_goroot(&dir.path().join("versions/1.22.0"), "1.22.0");

        assert_eq!(reg.current_version(), "");
        reg.use_version("1.22.0").await.unwrap();
        assert_eq!(reg.current_version(), "1.22.0");

        let err = reg.uninstall("1.22.0").await.unwrap_err();
        assert!(matches!(err, GovmError::ActiveVersion(_)));

        reg.use_version("1.21.0").await.unwrap();
        reg.uninstall("1.22.0").await.unwrap();
        assert!(!dir.path().join("versions/1.22.0").exists());

        let err = reg.uninstall("1.22.0").await.unwrap_err();
        assert!(matches!(err, GovmError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn test_uninstall_system_only_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        let system = dir.path().join("system-go");
        fake_goroot(&system, "1.20.3");
        reg.register_system(&system).unwrap();

        reg.uninstall("1.20.3").await.unwrap();
        assert!(system.join("bin").exists());
        assert!(reg.list_installed().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_tag_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        assert!(matches!(
            reg.install("../../etc", None),
            Err(GovmError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_install_of_present_version_completes_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        fake_goroot(&dir.path().join("versions/1.22.0"), "1.22.0");

        let installed = reg.install_and_wait("1.22.0", None).await.unwrap();
        assert_eq!(installed.path, dir.path().join("versions/1.22.0"));
    }
}
