//! Release index client for Go download mirrors.
//!
//! Mirrors serve the same JSON document as `https://go.dev/dl/?mode=json`.
//! With `include=all` the document lists every release, including betas and
//! release candidates:
//!
//! ```text
//! [
//!   {
//!     "version": "go1.22.3",
//!     "stable": true,
//!     "files": [
//!       { "filename": "go1.22.3.linux-amd64.tar.gz", "os": "linux",
//!         "arch": "amd64", "version": "go1.22.3", "sha256": "8920…",
//!         "size": 68958945, "kind": "archive" }
//!     ]
//!   }
//! ]
//! ```
//!
//! The index is fetched fresh on every query; nothing here is cached.

use crate::error::{GovmError, Result};
use crate::platform::Platform;
use crate::version::{compare_versions, normalize_tag};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One downloadable file of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub filename: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub kind: String,
}

/// A release available from the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVersion {
    pub version: String,
    pub stable: bool,
    #[serde(default)]
    pub files: Vec<FileInfo>,
}

impl RemoteVersion {
    /// The archive for `platform`, if this release ships one.
    pub fn archive_for(&self, platform: &Platform) -> Option<&FileInfo> {
        self.files.iter().find(|f| {
            f.os == platform.os
                && f.arch == platform.arch
                && f.kind == platform.archive_kind()
                && f.filename.ends_with(platform.archive_extension())
        })
    }
}

/// Build an HTTP client honoring an optional proxy URL.
///
/// Only connecting is bounded by `timeout`; archive downloads take as long
/// as they take. Metadata requests set their own per-request timeout.
pub fn http_client(proxy: &str, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .user_agent(format!("govm/{}", env!("CARGO_PKG_VERSION")));

    if !proxy.trim().is_empty() {
        let proxy = reqwest::Proxy::all(proxy.trim())
            .map_err(|e| GovmError::parse("proxy URL", e))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Client for a Go download mirror.
#[derive(Clone)]
pub struct GoApi {
    client: reqwest::Client,
    mirror: String,
}

impl GoApi {
    /// Create a client for `mirror` (a base URL such as `https://go.dev/dl/`).
    pub fn new(mirror: &str, proxy: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(proxy, REQUEST_TIMEOUT)?,
            mirror: with_trailing_slash(mirror),
        })
    }

    pub fn mirror(&self) -> &str {
        &self.mirror
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Full download URL of a release file.
    pub fn archive_url(&self, filename: &str) -> String {
        format!("{}{}", self.mirror, filename)
    }

    /// Fetch the release index, newest first.
    ///
    /// # Errors
    ///
    /// [`GovmError::Network`] when the mirror is unreachable or answers with a
    /// non-success status, [`GovmError::Parse`] when the body is not a valid
    /// release index.
    pub async fn list_remote(&self, include_unstable: bool) -> Result<Vec<RemoteVersion>> {
        let url = format!("{}?mode=json&include=all", self.mirror);
        debug!("Fetching release index from {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| GovmError::Network(format!("Failed to reach mirror {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(GovmError::Network(format!(
                "Mirror {} returned HTTP {}",
                url,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GovmError::Network(format!("Failed to read release index: {}", e)))?;

        let mut versions = parse_index(&body)?;
        if !include_unstable {
            versions.retain(|v| v.stable);
        }
        Ok(versions)
    }

    /// Look up a single release by tag.
    pub async fn find(&self, tag: &str) -> Result<Option<RemoteVersion>> {
        let tag = normalize_tag(tag);
        let versions = self.list_remote(true).await?;
        Ok(versions.into_iter().find(|v| v.version == tag))
    }

    /// Newest stable release tag.
    pub async fn latest_stable(&self) -> Result<String> {
        let versions = self.list_remote(false).await?;
        versions
            .iter()
            .map(|v| v.version.as_str())
            .max_by(|a, b| compare_versions(a, b))
            .map(str::to_string)
            .ok_or_else(|| GovmError::NotFound("no stable release in index".to_string()))
    }
}

/// Parse a release index document and normalize tags.
pub fn parse_index(body: &str) -> Result<Vec<RemoteVersion>> {
    let mut versions: Vec<RemoteVersion> =
        serde_json::from_str(body).map_err(|e| GovmError::parse("release index", e))?;

    for v in &mut versions {
        v.version = normalize_tag(&v.version);
        for f in &mut v.files {
            f.version = normalize_tag(&f.version);
        }
    }

    versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
    Ok(versions)
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
