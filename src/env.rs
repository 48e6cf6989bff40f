//! Environment bindings for the active toolchain.
//!
//! govm never edits the parent shell directly. Bindings (GOROOT, PATH,
//! GOPATH, GOPROXY, ...) go through an [`EnvStore`]:
//!
//! - [`FileEnvStore`] persists them to `env.json` and regenerates `env.sh`,
//!   which users source from their shell profile.
//! - [`MemoryEnvStore`] keeps them in memory for tests and embedding.
//!
//! Every write is durable on its own, so a crash between two writes leaves
//! a state [`EnvController::diagnose`] can explain.

use crate::error::{GovmError, Result};
use crate::paths::write_atomic;
use crate::registry::ActiveVersionMarker;
use crate::version::is_valid_tag;
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Key under which the bin dir govm last added to PATH is remembered.
pub const GOVM_BIN_VAR: &str = "GOVM_BIN";

/// Narrow seam over wherever environment bindings live.
pub trait EnvStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str) -> Result<()>;
    /// All bindings written through this store.
    fn vars(&self) -> BTreeMap<String, String>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryEnvStore {
    vars: Mutex<BTreeMap<String, String>>,
}

impl MemoryEnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            vars: Mutex::new(map),
        }
    }
}

impl EnvStore for MemoryEnvStore {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.vars).get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        lock(&self.vars).insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn vars(&self) -> BTreeMap<String, String> {
        lock(&self.vars).clone()
    }
}

/// Store backed by `env.json` plus a generated POSIX `env.sh`.
///
/// Unset names fall back to the process environment, so diagnostics reflect
/// the shell govm was started from until govm takes a binding over.
#[derive(Debug)]
pub struct FileEnvStore {
    json_path: PathBuf,
    script_path: PathBuf,
    vars: Mutex<BTreeMap<String, String>>,
}

impl FileEnvStore {
    pub fn open(json_path: &Path, script_path: &Path) -> Result<Self> {
        let vars = if json_path.exists() {
            let contents = std::fs::read_to_string(json_path)
                .with_context(|| format!("Failed to read {}", json_path.display()))?;
            serde_json::from_str(&contents)
                .map_err(|e| GovmError::parse(json_path.display().to_string(), e))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            json_path: json_path.to_path_buf(),
            script_path: script_path.to_path_buf(),
            vars: Mutex::new(vars),
        })
    }
}

impl EnvStore for FileEnvStore {
    fn get(&self, name: &str) -> Option<String> {
        lock(&self.vars)
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        let mut vars = lock(&self.vars);
        let mut next = vars.clone();
        next.insert(name.to_string(), value.to_string());

        let json = serde_json::to_string_pretty(&next)?;
        write_atomic(&self.json_path, json.as_bytes())
            .with_context(|| format!("Failed to write {}", self.json_path.display()))?;
        let mut exported = next.clone();
        exported.remove(GOVM_BIN_VAR);
        write_atomic(&self.script_path, Shell::Bash.render(&exported).as_bytes())
            .with_context(|| format!("Failed to write {}", self.script_path.display()))?;

        *vars = next;
        debug!("Persisted {}={}", name, value);
        Ok(())
    }

    fn vars(&self) -> BTreeMap<String, String> {
        lock(&self.vars).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shells `shell_script` can render for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    /// From `$SHELL`, defaulting to bash.
    pub fn detect() -> Self {
        std::env::var("SHELL")
            .ok()
            .and_then(|s| {
                Path::new(&s)
                    .file_name()
                    .and_then(|f| f.to_str())
                    .and_then(|name| name.parse().ok())
            })
            .unwrap_or(Shell::Bash)
    }

    /// Export statements for `vars`.
    pub fn render(self, vars: &BTreeMap<String, String>) -> String {
        let mut out = String::from("# Generated by govm. Do not edit.\n");
        for (name, value) in vars {
            let line = match self {
                Shell::Bash | Shell::Zsh => {
                    format!("export {}=\"{}\"\n", name, escape_posix(value))
                }
                Shell::Fish if name == "PATH" => {
                    let parts: Vec<String> = std::env::split_paths(value)
                        .map(|p| escape_fish(&p.to_string_lossy()))
                        .collect();
                    format!("set -gx PATH {}\n", parts.join(" "))
                }
                Shell::Fish => format!("set -gx {} {}\n", name, escape_fish(value)),
            };
            out.push_str(&line);
        }
        out
    }
}

impl std::str::FromStr for Shell {
    type Err = GovmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bash" | "sh" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            "fish" => Ok(Shell::Fish),
            other => Err(GovmError::Unsupported(format!(
                "shell '{}' (supported: bash, zsh, fish)",
                other
            ))),
        }
    }
}

impl fmt::Display for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shell::Bash => f.write_str("bash"),
            Shell::Zsh => f.write_str("zsh"),
            Shell::Fish => f.write_str("fish"),
        }
    }
}

/// `<root>/<tag>/bin` for one of `roots`.
fn is_toolchain_bin(entry: &Path, roots: &[PathBuf]) -> bool {
    if entry.file_name().is_none_or(|name| name != "bin") {
        return false;
    }
    let Some(goroot) = entry.parent() else {
        return false;
    };
    let Some(tag) = goroot.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    is_valid_tag(tag) && goroot.parent().is_some_and(|parent| roots.iter().any(|r| r == parent))
}

fn escape_posix(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('$', "\\$")
        .replace('`', "\\`")
        .replace('"', "\\\"")
}

fn escape_fish(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvInfo {
    pub goroot: String,
    pub gopath: String,
    pub goproxy: String,
    pub gobin: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnoseStatus {
    Pass,
    Warn,
    Fail,
}

/// Outcome of one environment check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnoseResult {
    pub item: String,
    pub status: DiagnoseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl DiagnoseResult {
    fn pass(item: &str, message: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            status: DiagnoseStatus::Pass,
            message: message.into(),
            hint: None,
        }
    }

    fn warn(item: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            status: DiagnoseStatus::Warn,
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    fn fail(item: &str, message: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            status: DiagnoseStatus::Fail,
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

/// Reads, writes and checks environment bindings.
pub struct EnvController {
    store: Arc<dyn EnvStore>,
    /// Install roots whose bin dirs are stripped from PATH on every update.
    managed_roots: RwLock<Vec<PathBuf>>,
    write_lock: Mutex<()>,
}

impl EnvController {
    pub fn new(store: Arc<dyn EnvStore>, managed_roots: Vec<PathBuf>) -> Self {
        Self {
            store,
            managed_roots: RwLock::new(managed_roots),
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EnvStore> {
        &self.store
    }

    pub fn set_managed_roots(&self, roots: Vec<PathBuf>) {
        *self.managed_roots.write().unwrap_or_else(|e| e.into_inner()) = roots;
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.store.get(name).filter(|v| !v.is_empty())
    }

    pub fn set_goroot(&self, goroot: &Path) -> Result<()> {
        self.set_env_var("GOROOT", &goroot.to_string_lossy())
    }

    pub fn set_env_var(&self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GovmError::parse(
                "environment variable name",
                format!("'{}' is not a valid name", name),
            ));
        }
        let _guard = lock(&self.write_lock);
        self.store.set(name, value)?;
        info!("Set {}={}", name, value);
        Ok(())
    }

    /// Point PATH at `<goroot>/bin`.
    ///
    /// Drops the bin dir govm added last time, any `<root>/<tag>/bin` entry
    /// of a managed install root and any existing copy of the new bin dir,
    /// then prepends the new one. Other entries under a root are kept.
    /// Calling it repeatedly with the same goroot is a no-op.
    pub fn update_path(&self, goroot: &Path) -> Result<()> {
        let _guard = lock(&self.write_lock);
        let bin = goroot.join("bin");
        let previous = self.store.get(GOVM_BIN_VAR).map(PathBuf::from);
        let roots = self
            .managed_roots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let current = self.store.get("PATH").unwrap_or_default();
        let mut entries: Vec<PathBuf> = std::env::split_paths(&current)
            .filter(|p| !p.as_os_str().is_empty())
            .filter(|p| *p != bin)
            .filter(|p| previous.as_ref() != Some(p))
            .filter(|p| !is_toolchain_bin(p, &roots))
            .collect();
        entries.insert(0, bin.clone());

        let joined = std::env::join_paths(&entries)
            .map_err(|e| GovmError::parse("PATH", e))?
            .to_string_lossy()
            .to_string();

        if joined != current {
            self.store.set("PATH", &joined)?;
            debug!("PATH now starts with {}", bin.display());
        }
        self.store.set(GOVM_BIN_VAR, &bin.to_string_lossy())?;
        Ok(())
    }

    pub fn env_info(&self) -> EnvInfo {
        let value = |name| self.store.get(name).unwrap_or_default();
        EnvInfo {
            goroot: value("GOROOT"),
            gopath: value("GOPATH"),
            goproxy: value("GOPROXY"),
            gobin: value("GOBIN"),
            path: value("PATH"),
        }
    }

    /// Check the bindings against the active version. Never writes.
    pub fn diagnose(&self, active: Option<&ActiveVersionMarker>) -> Vec<DiagnoseResult> {
        let mut results = Vec::new();
        let goroot = self.get("GOROOT").map(PathBuf::from);

        results.push(match (&goroot, active) {
            (None, _) => DiagnoseResult::fail("GOROOT", "GOROOT is not set", "govm use <version>"),
            (Some(root), _) if !root.is_dir() => DiagnoseResult::fail(
                "GOROOT",
                format!("{} does not exist", root.display()),
                "govm env fix-goroot",
            ),
            (Some(root), Some(marker)) if *root != marker.path => DiagnoseResult::warn(
                "GOROOT",
                format!(
                    "GOROOT is {} but the active version {} lives at {}",
                    root.display(),
                    marker.version,
                    marker.path.display()
                ),
                "govm env fix-goroot",
            ),
            (Some(root), _) => DiagnoseResult::pass("GOROOT", root.display().to_string()),
        });

        let go_bin = goroot
            .as_ref()
            .or(active.map(|m| &m.path))
            .map(|root| root.join("bin"));
        results.push(match go_bin {
            None => DiagnoseResult::warn("PATH", "No Go bin directory to look for", "govm use <version>"),
            Some(bin) => {
                let path = self.get("PATH").unwrap_or_default();
                let count = std::env::split_paths(&path).filter(|p| *p == bin).count();
                match count {
                    0 => DiagnoseResult::fail(
                        "PATH",
                        format!("{} is not on PATH", bin.display()),
                        "govm env fix-goroot",
                    ),
                    1 => DiagnoseResult::pass("PATH", format!("{} is on PATH", bin.display())),
                    n => DiagnoseResult::warn(
                        "PATH",
                        format!("{} appears {} times on PATH", bin.display(), n),
                        "govm env fix-goroot",
                    ),
                }
            }
        });

        results.push(match self.get("GOPATH") {
            None => DiagnoseResult::warn("GOPATH", "GOPATH is not set", "govm use <version>"),
            Some(gopath) if !Path::new(&gopath).is_dir() => DiagnoseResult::warn(
                "GOPATH",
                format!("{} does not exist yet", gopath),
                "It is created on the next `govm use`",
            ),
            Some(gopath) => DiagnoseResult::pass("GOPATH", gopath),
        });

        results.push(match self.get("GOPROXY") {
            None => DiagnoseResult::warn("GOPROXY", "GOPROXY is not set", "govm env fix-goproxy"),
            Some(proxy) => match invalid_goproxy_entry(&proxy) {
                Some(bad) => DiagnoseResult::fail(
                    "GOPROXY",
                    format!("'{}' is not a valid GOPROXY entry", bad),
                    "govm env fix-goproxy",
                ),
                None => DiagnoseResult::pass("GOPROXY", proxy),
            },
        });

        results
    }

    /// Export statements for the current bindings.
    pub fn shell_script(&self, shell: Shell) -> String {
        let mut vars = self.store.vars();
        vars.remove(GOVM_BIN_VAR);
        shell.render(&vars)
    }
}

/// First entry of a GOPROXY list that is neither a URL nor `direct`/`off`.
pub fn invalid_goproxy_entry(goproxy: &str) -> Option<String> {
    goproxy
        .split([',', '|'])
        .map(str::trim)
        .find(|entry| {
            !(*entry == "direct"
                || *entry == "off"
                || entry.starts_with("http://")
                || entry.starts_with("https://")
                || entry.starts_with("file://"))
        })
        .map(str::to_string)
}
