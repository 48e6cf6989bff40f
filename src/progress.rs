//! Install progress reporting.
//!
//! An install streams [`InstallEvent`]s over a bounded channel. Intermediate
//! byte counts are sent with `try_send`: when the consumer falls behind the
//! snapshot is dropped and the next one supersedes it, so a slow consumer
//! never stalls the download. Phase boundaries, the final snapshot of a phase
//! and the terminal event are always delivered.
//!
//! Ordering: phases arrive as `Downloading → Extracting → Verifying` and byte
//! counts never decrease within a phase.

use crate::registry::InstalledVersion;
use serde::Serialize;
use tokio::sync::mpsc;

/// Default channel capacity for progress streams.
pub const PROGRESS_BUFFER: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Downloading,
    Extracting,
    Verifying,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downloading => f.write_str("downloading"),
            Self::Extracting => f.write_str("extracting"),
            Self::Verifying => f.write_str("verifying"),
        }
    }
}

/// A point-in-time snapshot of an install.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub version: String,
    pub downloaded: u64,
    pub total: u64,
    pub percent: f64,
    pub phase: Phase,
}

impl DownloadProgress {
    fn new(version: &str, phase: Phase, downloaded: u64, total: u64) -> Self {
        let percent = if total > 0 {
            ((downloaded as f64 / total as f64) * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            version: version.to_string(),
            downloaded,
            total,
            percent,
            phase,
        }
    }
}

/// Element of an install's progress stream.
#[derive(Debug, Clone)]
pub enum InstallEvent {
    Progress(DownloadProgress),
    /// Terminal: the version is installed and visible to `list_installed`.
    Completed(InstalledVersion),
    /// Terminal: the install failed or was cancelled; nothing was registered.
    Failed(String),
}

impl InstallEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Sending half of a progress stream, owned by the install task.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: mpsc::Sender<InstallEvent>,
    version: String,
    last: Option<(Phase, u64)>,
}

impl ProgressReporter {
    pub fn channel(version: &str, capacity: usize) -> (Self, mpsc::Receiver<InstallEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                version: version.to_string(),
                last: None,
            },
            rx,
        )
    }

    /// True once the consumer has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn accept(&mut self, phase: Phase, downloaded: u64) -> bool {
        if let Some((last_phase, last_bytes)) = self.last {
            if phase < last_phase || (phase == last_phase && downloaded < last_bytes) {
                return false;
            }
        }
        self.last = Some((phase, downloaded));
        true
    }

    /// Report an intermediate snapshot; dropped if the buffer is full.
    pub fn update(&mut self, phase: Phase, downloaded: u64, total: u64) {
        if !self.accept(phase, downloaded) {
            return;
        }
        let event = InstallEvent::Progress(DownloadProgress::new(
            &self.version,
            phase,
            downloaded,
            total,
        ));
        let _ = self.tx.try_send(event);
    }

    /// Report a snapshot that must not be coalesced (phase start or end).
    pub async fn checkpoint(&mut self, phase: Phase, downloaded: u64, total: u64) {
        if !self.accept(phase, downloaded) {
            return;
        }
        let event = InstallEvent::Progress(DownloadProgress::new(
            &self.version,
            phase,
            downloaded,
            total,
        ));
        let _ = self.tx.send(event).await;
    }

    /// Deliver the terminal event.
    pub async fn finish(self, event: InstallEvent) {
        debug_assert!(event.is_terminal());
        let _ = self.tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(event: InstallEvent) -> DownloadProgress {
        match event {
            InstallEvent::Progress(p) => p,
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn test_percent() {
        let p = DownloadProgress::new("1.22.0", Phase::Downloading, 50, 200);
        assert_eq!(p.percent, 25.0);
        let p = DownloadProgress::new("1.22.0", Phase::Downloading, 50, 0);
        assert_eq!(p.percent, 0.0);
    }

    #[tokio::test]
    async fn test_full_buffer_coalesces_but_checkpoint_delivers() {
        let (mut reporter, mut rx) = ProgressReporter::channel("1.22.0", 2);

        for i in 1..=10 {
            reporter.update(Phase::Downloading, i * 10, 100);
        }
        // Only the first two fit; the rest were coalesced away.
        assert_eq!(progress(rx.recv().await.unwrap()).downloaded, 10);
        assert_eq!(progress(rx.recv().await.unwrap()).downloaded, 20);

        reporter.checkpoint(Phase::Downloading, 100, 100).await;
        let last = progress(rx.recv().await.unwrap());
        assert_eq!(last.downloaded, 100);
        assert_eq!(last.percent, 100.0);
    }

    #[tokio::test]
    async fn test_out_of_order_snapshots_are_dropped() {
        let (mut reporter, mut rx) = ProgressReporter::channel("1.22.0", 8);

        reporter.update(Phase::Downloading, 50, 100);
        reporter.update(Phase::Downloading, 40, 100);
        reporter.checkpoint(Phase::Extracting, 0, 0).await;
        reporter.update(Phase::Downloading, 60, 100);
        reporter.finish(InstallEvent::Failed("boom".into())).await;

        let mut phases = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                InstallEvent::Progress(p) => phases.push((p.phase, p.downloaded)),
                InstallEvent::Failed(msg) => assert_eq!(msg, "boom"),
                InstallEvent::Completed(_) => panic!("unexpected completion"),
            }
        }
        assert_eq!(
            phases,
            vec![(Phase::Downloading, 50), (Phase::Extracting, 0)]
        );
    }

    #[test]
    fn test_closed_after_receiver_drop() {
        let (reporter, rx) = ProgressReporter::channel("1.22.0", 1);
        assert!(!reporter.is_closed());
        drop(rx);
        assert!(reporter.is_closed());
    }
}
