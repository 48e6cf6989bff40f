//! User configuration persisted as `config.json` in the govm home.
//!
//! The core reads these values at startup and after each setter; nothing
//! else writes the file.

use crate::error::{GovmError, Result};
use crate::paths::write_atomic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_MIRROR: &str = "https://go.dev/dl/";
pub const DEFAULT_GOPROXY: &str = "https://proxy.golang.org,direct";
/// GOPROXY applied by `fix_goproxy`.
pub const FALLBACK_GOPROXY: &str = "https://goproxy.cn,direct";

/// How GOPATH is assigned across installed versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoPathMode {
    /// One GOPATH per installed version.
    #[default]
    Isolated,
    /// A single GOPATH for all versions.
    Shared,
}

impl fmt::Display for GoPathMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => f.write_str("isolated"),
            Self::Shared => f.write_str("shared"),
        }
    }
}

impl FromStr for GoPathMode {
    type Err = GovmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolated" => Ok(Self::Isolated),
            "shared" => Ok(Self::Shared),
            other => Err(GovmError::parse(
                "GOPATH mode",
                format!("expected 'isolated' or 'shared', got '{}'", other),
            )),
        }
    }
}

/// A selectable download mirror.
#[derive(Debug, Clone, Serialize)]
pub struct MirrorOption {
    pub name: &'static str,
    pub url: &'static str,
}

pub const MIRROR_OPTIONS: &[MirrorOption] = &[
    MirrorOption {
        name: "Official (go.dev)",
        url: "https://go.dev/dl/",
    },
    MirrorOption {
        name: "China (golang.google.cn)",
        url: "https://golang.google.cn/dl/",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mirror: String,
    /// HTTP(S) proxy for mirror and module-proxy requests; empty disables.
    pub proxy: String,
    pub goproxy: String,
    /// Custom install root; empty means `<home>/versions`.
    pub install_dir: String,
    /// Custom archive cache; empty means `<home>/cache`.
    pub cache_dir: String,
    pub gopath_mode: GoPathMode,
    pub shared_gopath: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            proxy: String::new(),
            goproxy: DEFAULT_GOPROXY.to_string(),
            install_dir: String::new(),
            cache_dir: String::new(),
            gopath_mode: GoPathMode::Isolated,
            shared_gopath: String::new(),
        }
    }
}

impl Config {
    /// Mirror URL guaranteed to end in `/` so filenames can be appended.
    pub fn mirror_base(&self) -> String {
        let mirror = if self.mirror.trim().is_empty() {
            DEFAULT_MIRROR
        } else {
            self.mirror.trim()
        };
        if mirror.ends_with('/') {
            mirror.to_string()
        } else {
            format!("{}/", mirror)
        }
    }

    /// First usable entry of the GOPROXY list (`direct` and `off` skipped).
    pub fn module_proxy(&self) -> String {
        self.goproxy
            .split([',', '|'])
            .map(str::trim)
            .find(|p| p.starts_with("http://") || p.starts_with("https://"))
            .unwrap_or("https://proxy.golang.org")
            .trim_end_matches('/')
            .to_string()
    }
}

/// Loads, holds and persists [`Config`].
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the config at `path`, falling back to defaults when missing.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)
                .map_err(|e| GovmError::parse(path.display().to_string(), e))?
        } else {
            Config::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn get(&self) -> &Config {
        &self.config
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config)?;
        write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }

    fn update(&mut self, f: impl FnOnce(&mut Config)) -> Result<()> {
        f(&mut self.config);
        self.save()
    }

    pub fn set_mirror(&mut self, mirror: &str) -> Result<()> {
        if !mirror.is_empty() && !mirror.starts_with("http://") && !mirror.starts_with("https://") {
            return Err(GovmError::parse("mirror URL", format!("'{}' is not an http(s) URL", mirror)));
        }
        self.update(|c| c.mirror = mirror.to_string())
    }

    pub fn set_proxy(&mut self, proxy: &str) -> Result<()> {
        self.update(|c| c.proxy = proxy.to_string())
    }

    pub fn set_goproxy(&mut self, goproxy: &str) -> Result<()> {
        self.update(|c| c.goproxy = goproxy.to_string())
    }

    pub fn set_install_dir(&mut self, dir: &str) -> Result<()> {
        self.update(|c| c.install_dir = dir.to_string())
    }

    pub fn set_cache_dir(&mut self, dir: &str) -> Result<()> {
        self.update(|c| c.cache_dir = dir.to_string())
    }

    pub fn set_gopath_mode(&mut self, mode: GoPathMode) -> Result<()> {
        self.update(|c| c.gopath_mode = mode)
    }

    pub fn set_shared_gopath(&mut self, path: &str) -> Result<()> {
        self.update(|c| c.shared_gopath = path.to_string())
    }

    pub fn reset(&mut self) -> Result<()> {
        self.update(|c| *c = Config::default())
    }
}
