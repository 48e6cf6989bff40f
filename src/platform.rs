//! Platform detection for selecting the correct release archive.
//!
//! Go publishes one archive per `<os>-<arch>` pair, named like
//! `go1.22.3.linux-amd64.tar.gz`. Rust's `std::env::consts` names differ
//! from Go's (`x86_64` vs `amd64`, `macos` vs `darwin`), so this module
//! translates between them.

use crate::error::{GovmError, Result};
use std::fmt;

/// A Go `GOOS`/`GOARCH` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Detect the host platform.
    ///
    /// # Errors
    ///
    /// Returns [`GovmError::Unsupported`] when the host OS or CPU has no Go
    /// tarball distribution.
    pub fn current() -> Result<Self> {
        let os = go_os(std::env::consts::OS)
            .ok_or_else(|| GovmError::Unsupported(format!("operating system {}", std::env::consts::OS)))?;
        let arch = go_arch(std::env::consts::ARCH)
            .ok_or_else(|| GovmError::Unsupported(format!("architecture {}", std::env::consts::ARCH)))?;
        Ok(Self::new(os, arch))
    }

    /// Archive kind for this platform as listed in the release index.
    pub fn archive_kind(&self) -> &'static str {
        "archive"
    }

    /// File extension of the archive this platform installs from.
    pub fn archive_extension(&self) -> &'static str {
        ".tar.gz"
    }

    /// Name of the `go` executable inside `GOROOT/bin`.
    pub fn go_binary(&self) -> &'static str {
        if self.os == "windows" { "go.exe" } else { "go" }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

fn go_os(rust_os: &str) -> Option<&'static str> {
    match rust_os {
        "linux" => Some("linux"),
        "macos" => Some("darwin"),
        "freebsd" => Some("freebsd"),
        _ => None,
    }
}

fn go_arch(rust_arch: &str) -> Option<&'static str> {
    match rust_arch {
        "x86_64" => Some("amd64"),
        "aarch64" => Some("arm64"),
        "x86" => Some("386"),
        "arm" => Some("armv6l"),
        "powerpc64" => Some("ppc64le"),
        "s390x" => Some("s390x"),
        "riscv64" => Some("riscv64"),
        "loongarch64" => Some("loong64"),
        _ => None,
    }
}

/// Name of the `go` executable on the host.
pub fn host_go_binary() -> &'static str {
    if cfg!(windows) { "go.exe" } else { "go" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_translation() {
        assert_eq!(go_arch("x86_64"), Some("amd64"));
        assert_eq!(go_arch("aarch64"), Some("arm64"));
        assert_eq!(go_arch("sparc"), None);
    }

    #[test]
    fn test_os_translation() {
        assert_eq!(go_os("macos"), Some("darwin"));
        assert_eq!(go_os("linux"), Some("linux"));
        assert_eq!(go_os("windows"), None);
    }

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    #[test]
    fn test_current_platform() {
        let platform = Platform::current().unwrap();
        assert!(!platform.arch.is_empty());
        assert!(platform.to_string().contains('-'));
    }
}
