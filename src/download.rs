//! Archive download with streaming checksum and progress reporting.

use crate::error::{GovmError, Result};
use crate::progress::{Phase, ProgressReporter};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Removes a partially written file unless disarmed.
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// SHA256 of a file as lowercase hex.
pub async fn sha256_file(file_path: &Path) -> Result<String> {
    let mut file = fs::File::open(file_path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 64 * 1024];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Download `url` to `dest`, verifying it against `expected_sha256`.
///
/// Bytes go to `<dest>.part` first and are renamed into place only after the
/// checksum matches, so `dest` is either absent or complete. An existing
/// `dest` whose checksum still matches is reused without a request.
///
/// # Errors
///
/// - [`GovmError::Network`] if the request fails or returns a non-success status
/// - [`GovmError::Integrity`] if the checksum does not match (nothing is kept)
/// - [`GovmError::Cancelled`] if the progress consumer went away mid-download
pub async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_sha256: &str,
    size_hint: u64,
    reporter: &mut ProgressReporter,
) -> Result<PathBuf> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    if dest.exists() {
        if sha256_file(dest).await?.eq_ignore_ascii_case(expected_sha256) {
            debug!("Reusing cached archive {}", dest.display());
            let size = fs::metadata(dest).await?.len();
            reporter.checkpoint(Phase::Downloading, size, size).await;
            return Ok(dest.to_path_buf());
        }
        warn!("Cached archive {} is corrupt, downloading again", dest.display());
        fs::remove_file(dest).await?;
    }

    let part_path = part_path(dest);
    let guard = PartialFile::new(part_path.clone());

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| GovmError::Network(format!("Failed to download {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(GovmError::Network(format!(
            "Failed to download {}: HTTP {}",
            url,
            response.status()
        )));
    }

    let total = response.content_length().unwrap_or(size_hint);
    reporter.checkpoint(Phase::Downloading, 0, total).await;

    let mut file = fs::File::create(&part_path).await?;
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;

    loop {
        if reporter.is_closed() {
            return Err(GovmError::Cancelled(url.to_string()));
        }
        let chunk = response
            .chunk()
            .await
            .map_err(|e| GovmError::Network(format!("Failed to read from {}: {}", url, e)))?;
        let Some(chunk) = chunk else { break };

        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        reporter.update(Phase::Downloading, downloaded, total.max(downloaded));
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    let actual = format!("{:x}", hasher.finalize());
    if !expected_sha256.is_empty() && !actual.eq_ignore_ascii_case(expected_sha256) {
        return Err(GovmError::Integrity {
            file: url.to_string(),
            expected: expected_sha256.to_string(),
            actual,
        });
    }

    reporter
        .checkpoint(Phase::Downloading, downloaded, total.max(downloaded))
        .await;

    fs::rename(&part_path, dest).await?;
    guard.disarm();
    Ok(dest.to_path_buf())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::InstallEvent;

    fn sha256_hex(data: &[u8]) -> String {
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_part_path() {
        let p = part_path(Path::new("/cache/go1.22.0.linux-amd64.tar.gz"));
        assert_eq!(p, PathBuf::from("/cache/go1.22.0.linux-amd64.tar.gz.part"));
    }

    #[tokio::test]
    async fn test_download_verifies_and_reports() {
        let body = vec![7u8; 4096];
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/go.tar.gz")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("go.tar.gz");
        let (mut reporter, mut rx) = ProgressReporter::channel("1.22.0", 64);
        let client = reqwest::Client::new();

        let path = download_archive(
            &client,
            &format!("{}/go.tar.gz", server.url()),
            &dest,
            &sha256_hex(&body),
            0,
            &mut reporter,
        )
        .await
        .unwrap();
        drop(reporter);

        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!part_path(&dest).exists());

        let mut last = 0;
        while let Some(InstallEvent::Progress(p)) = rx.recv().await {
            assert!(p.downloaded >= last);
            last = p.downloaded;
        }
        assert_eq!(last, 4096);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_discards_archive() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/go.tar.gz")
            .with_status(200)
            .with_body("tampered")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("go.tar.gz");
        let (mut reporter, _rx) = ProgressReporter::channel("1.22.0", 64);

        let err = download_archive(
            &reqwest::Client::new(),
            &format!("{}/go.tar.gz", server.url()),
            &dest,
            &sha256_hex(b"original"),
            0,
            &mut reporter,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GovmError::Integrity { .. }));
        assert!(!dest.exists());
        assert!(!part_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_cached_archive_reused_without_request() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("go.tar.gz");
        std::fs::write(&dest, b"cached").unwrap();
        let (mut reporter, _rx) = ProgressReporter::channel("1.22.0", 8);

        // Unroutable URL: a request would fail.
        let path = download_archive(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/never",
            &dest,
            &sha256_hex(b"cached"),
            0,
            &mut reporter,
        )
        .await
        .unwrap();
        assert_eq!(path, dest);
    }
}
