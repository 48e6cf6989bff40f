//! High-level `Govm` API: one handle over config, registry, environment,
//! download cache and module cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use govm::Govm;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let govm = Govm::new()?;
//!
//!     // Install the newest stable release and make it active
//!     let tag = govm.latest_stable().await?;
//!     govm.install(&tag, None)?.wait().await?;
//!     govm.use_version(&tag).await?;
//!
//!     for v in govm.list_installed()? {
//!         println!("{} {}", v.version, v.path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Switching versions
//!
//! [`Govm::use_version`] walks a fixed sequence of states:
//!
//! ```text
//! Idle → ResolvingTarget → UpdatingRegistry → UpdatingEnvironment
//!      → UpdatingGoPath → NotifyingObservers → Idle
//! ```
//!
//! Any step may fail into `Failed`. Nothing is rolled back: once the
//! registry points at the new version a later failure leaves it there and
//! is returned as is. [`Govm::diagnose`] shows what is out of sync and
//! [`Govm::fix_goroot`] re-applies the environment.

use crate::cache::{CacheInfo, CacheManager, Cleaned};
use crate::config::{
    Config, ConfigManager, FALLBACK_GOPROXY, GoPathMode, MIRROR_OPTIONS, MirrorOption,
};
use crate::env::{
    DiagnoseResult, EnvController, EnvInfo, EnvStore, FileEnvStore, Shell, invalid_goproxy_entry,
};
use crate::error::{GovmError, Result};
use crate::module::{ModuleCacheStats, ModuleInfo, ModuleManager, VerifyResult};
use crate::package::{self, GoCommand, ModuleProxy, SearchResult};
use crate::paths::GovmPaths;
use crate::platform::Platform;
use crate::registry::{InstallHandle, InstalledVersion, VersionRegistry};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notifications for observers of a [`Govm`] instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovmEvent {
    /// The active version changed; empty when it was cleared.
    VersionChanged(String),
}

/// Progress of a version switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Idle,
    ResolvingTarget,
    UpdatingRegistry,
    UpdatingEnvironment,
    UpdatingGoPath,
    NotifyingObservers,
    Failed,
}

/// Result of a version switch
#[derive(Debug, Clone, Serialize)]
pub struct SwitchResult {
    /// Active tag
    pub version: String,
    /// New GOROOT
    pub goroot: PathBuf,
    /// New GOPATH
    pub gopath: PathBuf,
    /// Time taken (milliseconds)
    pub time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub base_dir: PathBuf,
    pub govm_version: String,
}

/// Entry point for every govm operation.
pub struct Govm {
    paths: GovmPaths,
    config: RwLock<ConfigManager>,
    registry: VersionRegistry,
    env: EnvController,
    modules: ModuleManager,
    proxy: RwLock<ModuleProxy>,
    switch_lock: tokio::sync::Mutex<()>,
    switch_state: Mutex<SwitchState>,
    events: broadcast::Sender<GovmEvent>,
}

impl Govm {
    /// Open the govm home from `GOVM_HOME` or `~/.govm`.
    pub fn new() -> Result<Self> {
        Self::open(GovmPaths::detect())
    }

    /// Open a govm home with file-backed environment bindings and detection
    /// of toolchains installed outside govm.
    pub fn open(paths: GovmPaths) -> Result<Self> {
        let store = FileEnvStore::open(&paths.env_file(), &paths.env_script())?;
        Self::build(paths, Arc::new(store), true)
    }

    /// Open a govm home with a caller-supplied environment store and no
    /// system toolchain detection.
    pub fn with_env_store(paths: GovmPaths, store: Arc<dyn EnvStore>) -> Result<Self> {
        Self::build(paths, store, false)
    }

    fn build(paths: GovmPaths, store: Arc<dyn EnvStore>, detect_system: bool) -> Result<Self> {
        paths
            .ensure()
            .with_context(|| format!("Failed to create {}", paths.base.display()))?;
        let config = ConfigManager::load(&paths.config_file())?;
        let cfg = config.get().clone();

        let registry = if detect_system {
            VersionRegistry::with_system_detection(&paths, &cfg)?
        } else {
            VersionRegistry::new(&paths, &cfg)?
        };
        let env = EnvController::new(store, registry.install_roots()?);
        let modules = ModuleManager::new(paths.gopath_root(), cfg.gopath_mode, &cfg.shared_gopath);
        let proxy = ModuleProxy::new(&cfg.module_proxy(), &cfg.proxy)?;
        let (events, _) = broadcast::channel(16);

        Ok(Self {
            paths,
            config: RwLock::new(config),
            registry,
            env,
            modules,
            proxy: RwLock::new(proxy),
            switch_lock: tokio::sync::Mutex::new(()),
            switch_state: Mutex::new(SwitchState::Idle),
            events,
        })
    }

    pub fn paths(&self) -> &GovmPaths {
        &self.paths
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Receive [`GovmEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<GovmEvent> {
        self.events.subscribe()
    }

    pub fn switch_state(&self) -> SwitchState {
        *self.switch_state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn enter(&self, state: SwitchState) {
        debug!("Switch state: {:?}", state);
        *self.switch_state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    // ==================== Versions ====================

    pub async fn list_remote(&self, include_unstable: bool) -> Result<Vec<crate::api::RemoteVersion>> {
        self.registry.list_remote(include_unstable).await
    }

    pub fn list_installed(&self) -> Result<Vec<InstalledVersion>> {
        self.registry.list_installed()
    }

    pub fn current_version(&self) -> String {
        self.registry.current_version()
    }

    pub async fn latest_stable(&self) -> Result<String> {
        self.registry.latest_stable().await
    }

    /// Start an install; see [`VersionRegistry::install`].
    pub fn install(&self, tag: &str, install_dir: Option<&Path>) -> Result<InstallHandle> {
        self.registry.install(tag, install_dir)
    }

    pub async fn uninstall(&self, tag: &str) -> Result<()> {
        self.registry.uninstall(tag).await
    }

    pub fn register_system(&self, path: &Path) -> Result<InstalledVersion> {
        let version = self.registry.register_system(path)?;
        info!("Registered system Go {} at {}", version.version, version.path.display());
        Ok(version)
    }

    /// Make `id` the active version and point the environment at it.
    ///
    /// `id` is a tag, an install path, or a unique suffix or substring of a
    /// path. An empty `id` clears the active version and returns `None`.
    pub async fn use_version(&self, id: &str) -> Result<Option<SwitchResult>> {
        let _guard = self.switch_lock.lock().await;

        if id.trim().is_empty() {
            self.registry.clear_current()?;
            let _ = self.events.send(GovmEvent::VersionChanged(String::new()));
            info!("Cleared active Go version");
            return Ok(None);
        }

        match self.switch(id).await {
            Ok(result) => {
                self.enter(SwitchState::Idle);
                Ok(Some(result))
            }
            Err(e) => {
                warn!("Switching to {} failed in {:?}: {}", id, self.switch_state(), e);
                self.enter(SwitchState::Failed);
                Err(e)
            }
        }
    }

    async fn switch(&self, id: &str) -> Result<SwitchResult> {
        let start = Instant::now();

        self.enter(SwitchState::ResolvingTarget);
        let target = self.registry.resolve(id)?;

        self.enter(SwitchState::UpdatingRegistry);
        let target = self.registry.use_version(&target.path_str()).await?;

        self.enter(SwitchState::UpdatingEnvironment);
        self.env.set_managed_roots(self.registry.install_roots()?);
        self.env.set_goroot(&target.path)?;
        self.env.update_path(&target.path)?;

        self.enter(SwitchState::UpdatingGoPath);
        let gopath = self.modules.gopath(&target.version);
        std::fs::create_dir_all(&gopath)
            .with_context(|| format!("Failed to create GOPATH {}", gopath.display()))?;
        self.env.set_env_var("GOPATH", &gopath.to_string_lossy())?;

        self.enter(SwitchState::NotifyingObservers);
        let _ = self.events.send(GovmEvent::VersionChanged(target.version.clone()));

        Ok(SwitchResult {
            version: target.version,
            goroot: target.path,
            gopath,
            time_ms: start.elapsed().as_millis() as u64,
        })
    }

    // ==================== Environment ====================

    pub fn env_info(&self) -> EnvInfo {
        self.env.env_info()
    }

    pub fn diagnose(&self) -> Result<Vec<DiagnoseResult>> {
        let active = self.registry.current()?;
        Ok(self.env.diagnose(active.as_ref()))
    }

    pub fn set_env_var(&self, name: &str, value: &str) -> Result<()> {
        self.env.set_env_var(name, value)
    }

    /// Re-point GOROOT and PATH at `goroot`, or at the active version.
    pub async fn fix_goroot(&self, goroot: Option<&Path>) -> Result<PathBuf> {
        let _guard = self.switch_lock.lock().await;
        let goroot = match goroot {
            Some(path) => path.to_path_buf(),
            None => self
                .registry
                .current()?
                .map(|m| m.path)
                .ok_or_else(no_active_version)?,
        };

        self.env.set_managed_roots(self.registry.install_roots()?);
        self.env.set_goroot(&goroot)?;
        self.env.update_path(&goroot)?;
        Ok(goroot)
    }

    /// Set GOPROXY to the configured value, or a known-good mirror when the
    /// configured one is unusable.
    pub fn fix_goproxy(&self) -> Result<String> {
        let configured = self.config().goproxy;
        let goproxy = if configured.trim().is_empty() || invalid_goproxy_entry(&configured).is_some() {
            FALLBACK_GOPROXY.to_string()
        } else {
            configured
        };
        self.env.set_env_var("GOPROXY", &goproxy)?;
        Ok(goproxy)
    }

    pub fn shell_script(&self, shell: Shell) -> String {
        self.env.shell_script(shell)
    }

    // ==================== Config ====================

    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get()
            .clone()
    }

    pub fn mirror_options(&self) -> &'static [MirrorOption] {
        MIRROR_OPTIONS
    }

    fn update_config(&self, f: impl FnOnce(&mut ConfigManager) -> Result<()>) -> Result<Config> {
        let cfg = {
            let mut manager = self.config.write().unwrap_or_else(|e| e.into_inner());
            f(&mut manager)?;
            manager.get().clone()
        };
        self.apply_config(&cfg)?;
        Ok(cfg)
    }

    fn apply_config(&self, cfg: &Config) -> Result<()> {
        self.registry.set_mirror(&cfg.mirror_base(), &cfg.proxy)?;
        self.registry.set_paths(&cfg.install_dir, &cfg.cache_dir);
        self.env.set_managed_roots(self.registry.install_roots()?);
        self.modules.set_gopath_mode(cfg.gopath_mode, &cfg.shared_gopath);
        *self.proxy.write().unwrap_or_else(|e| e.into_inner()) =
            ModuleProxy::new(&cfg.module_proxy(), &cfg.proxy)?;
        Ok(())
    }

    pub fn set_mirror(&self, mirror: &str) -> Result<Config> {
        self.update_config(|c| c.set_mirror(mirror))
    }

    pub fn set_proxy(&self, proxy: &str) -> Result<Config> {
        self.update_config(|c| c.set_proxy(proxy))
    }

    pub fn set_goproxy(&self, goproxy: &str) -> Result<Config> {
        let bad = if goproxy.trim().is_empty() {
            None
        } else {
            invalid_goproxy_entry(goproxy)
        };
        if let Some(bad) = bad {
            return Err(GovmError::parse(
                "GOPROXY",
                format!("'{}' is not a proxy URL, 'direct' or 'off'", bad),
            ));
        }
        self.update_config(|c| c.set_goproxy(goproxy))
    }

    /// Change where versions are installed and archives cached; empty
    /// strings restore the defaults. Already installed versions stay where
    /// they are and remain listed.
    pub fn set_install_settings(&self, install_dir: &str, cache_dir: &str) -> Result<Config> {
        self.update_config(|c| {
            c.set_install_dir(install_dir)?;
            c.set_cache_dir(cache_dir)
        })
    }

    pub fn set_gopath_mode(&self, mode: GoPathMode) -> Result<Config> {
        self.update_config(|c| c.set_gopath_mode(mode))
    }

    pub fn set_shared_gopath(&self, path: &str) -> Result<Config> {
        self.update_config(|c| c.set_shared_gopath(path))
    }

    pub fn reset_config(&self) -> Result<Config> {
        self.update_config(|c| c.reset())
    }

    // ==================== Download cache ====================

    fn download_cache(&self) -> CacheManager {
        CacheManager::new(self.registry.cache_dir())
    }

    pub fn cache_info(&self) -> Result<CacheInfo> {
        self.download_cache().info()
    }

    pub fn clean_download_cache(&self) -> Result<Cleaned> {
        self.download_cache().clean_download_cache()
    }

    pub fn clean_all_cache(&self) -> Result<Cleaned> {
        self.download_cache().clean_all()
    }

    // ==================== Module cache ====================

    /// Active tag for operations that write to a module cache. Isolated mode
    /// without an active version has no cache of its own to act on.
    fn module_tag(&self) -> Result<String> {
        let tag = self.current_version();
        if tag.is_empty() && self.modules.mode() == GoPathMode::Isolated {
            return Err(no_active_version());
        }
        Ok(tag)
    }

    pub fn current_gopath(&self) -> PathBuf {
        self.modules.gopath(&self.current_version())
    }

    pub fn module_cache_path(&self) -> PathBuf {
        self.modules.module_cache_path(&self.current_version())
    }

    pub fn module_stats(&self) -> Result<ModuleCacheStats> {
        self.modules.stats(&self.current_version())
    }

    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        self.modules.modules(&self.current_version())
    }

    pub fn clean_module_cache(&self) -> Result<()> {
        self.modules.clean_module_cache(&self.module_tag()?)
    }

    pub fn clean_module(&self, module_path: &str, version: &str) -> Result<()> {
        self.modules.clean_module(module_path, version, &self.module_tag()?)
    }

    pub fn verify_modules(&self) -> Result<Vec<VerifyResult>> {
        self.modules.verify_modules(&self.current_version())
    }

    fn module_proxy(&self) -> ModuleProxy {
        self.proxy.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub async fn search_packages(&self, query: &str) -> Result<Vec<SearchResult>> {
        let local = self.modules()?;
        self.module_proxy().search(query, &local).await
    }

    /// `go` command of the active toolchain, bound to its GOPATH and GOPROXY.
    fn go_command(&self) -> Result<GoCommand> {
        let active = self.registry.current()?.ok_or_else(no_active_version)?;
        let gopath = self.modules.gopath(&active.version);
        std::fs::create_dir_all(&gopath)
            .with_context(|| format!("Failed to create GOPATH {}", gopath.display()))?;

        let goproxy = self.config().goproxy;
        let mut go = GoCommand::new(&active.path)
            .env("GOPATH", gopath.to_string_lossy())
            .env("GOMODCACHE", gopath.join("pkg").join("mod").to_string_lossy());
        if !goproxy.trim().is_empty() {
            go = go.env("GOPROXY", goproxy);
        }
        Ok(go)
    }

    /// Download a module into the active module cache.
    pub async fn get_package(&self, module_path: &str, version: &str) -> Result<String> {
        let go = self.go_command()?;
        package::get_package(&self.module_proxy(), &go, module_path, version).await
    }

    /// `go install` a package with the active toolchain.
    pub async fn install_package(&self, package_path: &str) -> Result<String> {
        let go = self.go_command()?;
        package::install_package(&self.module_proxy(), &go, package_path).await
    }

    // ==================== System ====================

    pub fn system_info(&self) -> SystemInfo {
        let (os, arch) = match Platform::current() {
            Ok(p) => (p.os, p.arch),
            Err(_) => (
                std::env::consts::OS.to_string(),
                std::env::consts::ARCH.to_string(),
            ),
        };
        SystemInfo {
            os,
            arch,
            base_dir: self.paths.base.clone(),
            govm_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn no_active_version() -> GovmError {
    GovmError::NotFound("active Go version; run `govm use <version>` first".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnvStore;
    use crate::platform::host_go_binary;
    use std::fs;

    fn fake_goroot(path: &Path, tag: &str) {
        fs::create_dir_all(path.join("bin")).unwrap();
        fs::write(path.join("bin").join(host_go_binary()), b"").unwrap();
        fs::write(path.join("VERSION"), format!("go{}\n", tag)).unwrap();
    }

    fn govm(base: &Path) -> (Govm, Arc<MemoryEnvStore>) {
        let store = Arc::new(MemoryEnvStore::with_vars([("PATH", "/usr/bin")]));
        let govm = Govm::with_env_store(GovmPaths::new(base), store.clone()).unwrap();
        (govm, store)
    }

    #[tokio::test]
    async fn test_switch_updates_everything_and_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, store) = govm(dir.path());
        let goroot = dir.path().join("versions/1.22.0");
        fake_goroot(&goroot, "1.22.0");
        let mut events = govm.subscribe();

        let result = govm.use_version("1.22.0").await.unwrap().unwrap();
        assert_eq!(result.goroot, goroot);
        assert_eq!(result.gopath, dir.path().join("gopath/1.22.0"));
        assert!(result.gopath.is_dir());

        assert_eq!(store.get("GOROOT").unwrap(), goroot.to_string_lossy());
        assert_eq!(store.get("GOPATH").unwrap(), result.gopath.to_string_lossy());
        assert!(store.get("PATH").unwrap().starts_with(&*goroot.join("bin").to_string_lossy()));
        assert_eq!(govm.switch_state(), SwitchState::Idle);
        assert_eq!(
            events.recv().await.unwrap(),
            GovmEvent::VersionChanged("1.22.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_resolution_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, store) = govm(dir.path());
        let before = store.vars();

        let err = govm.use_version("1.99.0").await.unwrap_err();
        assert!(matches!(err, GovmError::VersionNotFound { .. }));
        assert_eq!(govm.switch_state(), SwitchState::Failed);
        assert_eq!(store.vars(), before);
        assert_eq!(govm.current_version(), "");
    }

    #[tokio::test]
    async fn test_empty_id_clears_active_version() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, _) = govm(dir.path());
        fake_goroot(&dir.path().join("versions/1.22.0"), "1.22.0");

        govm.use_version("1.22.0").await.unwrap();
        assert!(govm.use_version("").await.unwrap().is_none());
        assert_eq!(govm.current_version(), "");
    }

    #[tokio::test]
    async fn test_fix_goroot_reapplies_environment() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, store) = govm(dir.path());
        let goroot = dir.path().join("versions/1.21.0");
        fake_goroot(&goroot, "1.21.0");
        govm.use_version("1.21.0").await.unwrap();

        store.set("GOROOT", "/somewhere/else").unwrap();
        store.set("PATH", "/usr/bin").unwrap();
        assert_eq!(govm.fix_goroot(None).await.unwrap(), goroot);
        assert_eq!(store.get("GOROOT").unwrap(), goroot.to_string_lossy());
        assert!(store.get("PATH").unwrap().contains("1.21.0"));
    }

    #[test]
    fn test_fix_goproxy_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, store) = govm(dir.path());
        assert_eq!(govm.fix_goproxy().unwrap(), crate::config::DEFAULT_GOPROXY);

        govm.set_goproxy("").unwrap();
        assert_eq!(govm.fix_goproxy().unwrap(), FALLBACK_GOPROXY);
        assert_eq!(store.get("GOPROXY").unwrap(), FALLBACK_GOPROXY);
        assert!(govm.set_goproxy("not a proxy").is_err());
    }

    #[test]
    fn test_config_setters_apply_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, _) = govm(dir.path());

        govm.set_gopath_mode(GoPathMode::Shared).unwrap();
        govm.set_shared_gopath("/srv/go").unwrap();
        assert_eq!(govm.current_gopath(), PathBuf::from("/srv/go"));

        let custom = dir.path().join("elsewhere");
        govm.set_install_settings(&custom.to_string_lossy(), "").unwrap();
        assert_eq!(govm.registry().install_root(), custom);

        assert!(govm.set_mirror("ftp://nope").is_err());
        let cfg = govm.reset_config().unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(govm.registry().install_root(), dir.path().join("versions"));
    }

    #[test]
    fn test_module_writes_need_active_version_in_isolated_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (govm, _) = govm(dir.path());
        assert!(matches!(govm.clean_module_cache(), Err(GovmError::NotFound(_))));
        assert!(matches!(
            govm.clean_module("example.com/a", "v1.0.0"),
            Err(GovmError::NotFound(_))
        ));
    }
}
