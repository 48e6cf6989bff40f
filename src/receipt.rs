//! Install receipts for managed toolchains.
//!
//! Every toolchain govm installs carries a `.govm-receipt.json` at its root:
//!
//! ```text
//! ~/.govm/versions/1.22.3/
//!   .govm-receipt.json     # Metadata about this installation
//!   VERSION
//!   bin/
//! ```
//!
//! The receipt is written into the staged toolchain before it is renamed
//! into place, so an installed version always has one. System toolchains
//! that govm did not install have none.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const RECEIPT_FILE: &str = ".govm-receipt.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub version: String,
    pub installed_at: DateTime<Utc>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub sha256: String,
    /// Bytes on disk after extraction.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    pub govm_version: String,
}

impl InstallReceipt {
    pub fn new(version: &str, source_url: &str, sha256: &str, os: &str, arch: &str) -> Self {
        Self {
            version: version.to_string(),
            installed_at: Utc::now(),
            source_url: source_url.to_string(),
            sha256: sha256.to_string(),
            size: 0,
            os: os.to_string(),
            arch: arch.to_string(),
            govm_version: format!("govm/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Read the receipt of the toolchain at `goroot`.
    pub fn read(goroot: &Path) -> Result<Self> {
        let receipt_path = goroot.join(RECEIPT_FILE);
        let contents = fs::read_to_string(&receipt_path)
            .with_context(|| format!("Failed to read receipt: {}", receipt_path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse receipt: {}", receipt_path.display()))
    }

    pub fn write(&self, goroot: &Path) -> Result<()> {
        let receipt_path = goroot.join(RECEIPT_FILE);
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize install receipt")?;
        fs::write(&receipt_path, json)
            .with_context(|| format!("Failed to write receipt: {}", receipt_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut receipt = InstallReceipt::new("1.22.0", "https://go.dev/dl/x", "abc", "linux", "amd64");
        receipt.size = 42;
        receipt.write(dir.path()).unwrap();

        let read = InstallReceipt::read(dir.path()).unwrap();
        assert_eq!(read, receipt);
        assert!(read.govm_version.starts_with("govm/"));
    }

    #[test]
    fn test_missing_receipt_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(InstallReceipt::read(dir.path()).is_err());
    }
}
