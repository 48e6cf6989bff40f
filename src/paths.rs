//! On-disk layout of a govm home directory.
//!
//! ```text
//! ~/.govm/                 # Base directory (or GOVM_HOME)
//!   versions/              # Managed toolchains
//!     1.22.3/              # One extracted GOROOT per version
//!       .govm-receipt.json
//!   cache/                 # Downloaded archives
//!   gopath/                # Isolated-mode GOPATHs
//!     1.22.3/
//!   config.json            # User settings
//!   state.json             # Active version marker and extra install roots
//!   env.json               # Persisted environment bindings
//!   env.sh                 # Shell snippet generated from env.json
//! ```

use std::path::{Path, PathBuf};

/// Environment variable overriding the base directory.
pub const GOVM_HOME_ENV: &str = "GOVM_HOME";

/// Resolved directory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GovmPaths {
    pub base: PathBuf,
}

impl GovmPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Detect the base directory: `GOVM_HOME` first, then `~/.govm`.
    pub fn detect() -> Self {
        if let Some(home) = std::env::var_os(GOVM_HOME_ENV) {
            return Self::new(home);
        }
        Self::new(home_dir().join(".govm"))
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.base.join("versions")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.base.join("cache")
    }

    pub fn gopath_root(&self) -> PathBuf {
        self.base.join("gopath")
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.base.join("state.json")
    }

    pub fn env_file(&self) -> PathBuf {
        self.base.join("env.json")
    }

    pub fn env_script(&self) -> PathBuf {
        self.base.join("env.sh")
    }

    /// Create the directories every operation expects to exist.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.versions_dir())?;
        std::fs::create_dir_all(self.cache_dir())?;
        Ok(())
    }
}

/// The user's home directory, falling back to the working directory.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Write `contents` to `path` via a sibling temp file and rename, so readers
/// never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    std::io::Write::write_all(&mut tmp, contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
