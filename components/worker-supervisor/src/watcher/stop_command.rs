// External crates
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What released the stop-command watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTrigger {
    /// The parent wrote the stop marker.
    StopCommand,
    /// The process was interrupted (signal or explicit cancel).
    Interrupted,
}

/// Polling settings for [`StopCommandWatcher`].
#[derive(Debug, Clone, Copy)]
pub struct StopWatchSettings {
    /// Time between marker checks.
    pub poll_interval: Duration,
    /// Attempts at deleting the consumed marker.
    pub delete_attempts: u32,
    /// Pause between delete attempts.
    pub delete_backoff: Duration,
}

impl Default for StopWatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            delete_attempts: 5,
            delete_backoff: Duration::from_millis(5),
        }
    }
}

/// Waits for the parent agent's stop marker.
#[derive(Debug, Clone)]
pub struct StopCommandWatcher {
    marker: PathBuf,
    settings: StopWatchSettings,
}

impl StopCommandWatcher {
    /// Watcher for the marker at `marker`.
    pub fn new(marker: impl Into<PathBuf>, settings: StopWatchSettings) -> Self {
        Self {
            marker: marker.into(),
            settings,
        }
    }

    /// Block until the marker shows up (and consume it) or `interrupt` fires.
    #[instrument(name = "stop_command_watcher", target = "watcher::stop_command", level = "debug", skip_all, fields(marker = %self.marker.display()))]
    pub async fn wait(&self, interrupt: &CancellationToken) -> StopTrigger {
        debug!(poll_interval = ?self.settings.poll_interval, "Watching for stop command");
        loop {
            if interrupt.is_cancelled() {
                return StopTrigger::Interrupted;
            }

            if self.poll().await {
                info!("Received stop command from parent agent");
                return StopTrigger::StopCommand;
            }

            tokio::select! {
                biased;

                _ = interrupt.cancelled() => {
                    debug!("Stop command watcher interrupted");
                    return StopTrigger::Interrupted;
                }

                _ = sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Check once; consumes the marker when present.
    pub async fn poll(&self) -> bool {
        match tokio::fs::try_exists(&self.marker).await {
            Ok(true) => {
                self.consume_marker().await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(error = %e, "Cannot stat stop marker");
                false
            }
        }
    }

    /// Delete the marker with a few quick retries. Failure is only logged.
    async fn consume_marker(&self) -> bool {
        let attempts = self.settings.delete_attempts.max(1);
        for attempt in 1..=attempts {
            match tokio::fs::remove_file(&self.marker).await {
                Ok(()) => return true,
                Err(e) if e.kind() == ErrorKind::NotFound => return true,
                Err(e) => {
                    debug!(error = %e, attempt, "Failed to delete stop marker");
                    if attempt < attempts {
                        sleep(self.settings.delete_backoff).await;
                    }
                }
            }
        }
        warn!(attempts, "Giving up on deleting stop marker");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Instant;

    fn fast() -> StopWatchSettings {
        StopWatchSettings {
            poll_interval: Duration::from_millis(20),
            ..StopWatchSettings::default()
        }
    }

    #[tokio::test]
    async fn test_existing_marker_is_consumed_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("gsa-svc-1-stop");
        fs::write(&marker, b"").unwrap();
        let watcher = StopCommandWatcher::new(&marker, StopWatchSettings::default());

        let trigger = watcher.wait(&CancellationToken::new()).await;

        assert_eq!(trigger, StopTrigger::StopCommand);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_marker_created_later_is_detected_within_one_interval() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("gsa-svc-1-stop");
        let watcher = StopCommandWatcher::new(&marker, fast());

        let writer_marker = marker.clone();
        let writer = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            fs::write(&writer_marker, b"").unwrap();
            Instant::now()
        });

        let trigger = watcher.wait(&CancellationToken::new()).await;
        let detected = Instant::now();
        let written = writer.await.unwrap();

        assert_eq!(trigger, StopTrigger::StopCommand);
        assert!(detected.duration_since(written) <= Duration::from_millis(20) + Duration::from_millis(200));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_interrupt_releases_watcher_without_marker() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = StopCommandWatcher::new(dir.path().join("never"), StopWatchSettings::default());
        let interrupt = CancellationToken::new();

        let canceller = interrupt.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let trigger = watcher.wait(&interrupt).await;

        assert_eq!(trigger, StopTrigger::Interrupted);
        assert!(start.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_undeletable_marker_still_triggers() {
        // A directory in place of the marker exists but cannot be removed as a file.
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("stop-dir");
        fs::create_dir(&marker).unwrap();
        let watcher = StopCommandWatcher::new(&marker, fast());

        assert!(watcher.poll().await);
        assert!(marker.exists());
    }
}
