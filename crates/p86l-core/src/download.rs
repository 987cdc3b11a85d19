use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Minimum percentage advance that triggers a progress report.
const REPORT_PERCENT_STEP: f64 = 0.1;
/// Maximum time between two progress reports while bytes keep arriving.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("{context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed with HTTP {status}")]
    HttpStatus { status: reqwest::StatusCode },
    #[error("{context} {}: {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    fn http(context: &'static str, source: reqwest::Error) -> Self {
        Self::Http { context, source }
    }

    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Snapshot of an in-flight download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// `None` when the server did not send a content length.
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub elapsed: Duration,
}

impl DownloadProgress {
    #[must_use]
    pub fn starting(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes,
            downloaded_bytes: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Share of the download completed, clamped to `[0, 100]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent_complete(&self) -> Option<f64> {
        let total = self.total_bytes.filter(|total| *total > 0)?;
        let percent = self.downloaded_bytes as f64 / total as f64 * 100.0;
        Some(percent.clamp(0.0, 100.0))
    }

    /// Average throughput since the download started.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bytes_per_second(&self) -> Option<f64> {
        let elapsed = self.elapsed.as_secs_f64();
        if elapsed <= 0.0 {
            return None;
        }
        Some(self.downloaded_bytes as f64 / elapsed)
    }

    /// Estimated time left; unknown while no time has elapsed, nothing has
    /// arrived yet, or the total size is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eta(&self) -> Option<Duration> {
        let total = self.total_bytes?;
        let speed = self.bytes_per_second().filter(|speed| *speed > 0.0)?;
        let remaining = total.saturating_sub(self.downloaded_bytes) as f64;
        Duration::try_from_secs_f64(remaining / speed).ok()
    }

    /// Inline status line, e.g. `12.3% - ETA: 3m 2s`.
    #[must_use]
    pub fn status_text(&self) -> String {
        let eta = self.eta().map_or_else(|| "unknown".to_string(), format_eta);
        match self.percent_complete() {
            Some(percent) => format!("{percent:.1}% - ETA: {eta}"),
            None => format!("{} downloaded", format_bytes(self.downloaded_bytes)),
        }
    }
}

/// Human readable remaining time: `45s`, `3m 2s`, `1h 5m`.
#[must_use]
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const MIB: f64 = 1024.0 * 1024.0;
    format!("{:.1} MiB", bytes as f64 / MIB)
}

/// Counts bytes as they pass and decides when a report is due.
struct ProgressTracker {
    total: Option<u64>,
    downloaded: u64,
    started: Instant,
    last_percent: f64,
    last_report: Option<Instant>,
}

impl ProgressTracker {
    fn new(total: Option<u64>, started: Instant) -> Self {
        Self {
            total,
            downloaded: 0,
            started,
            last_percent: 0.0,
            last_report: None,
        }
    }

    fn snapshot(&self, now: Instant) -> DownloadProgress {
        DownloadProgress {
            total_bytes: self.total,
            downloaded_bytes: self.downloaded,
            elapsed: now.saturating_duration_since(self.started),
        }
    }

    /// Count a chunk; returns a snapshot when a report is due.
    fn record(&mut self, bytes: usize, now: Instant) -> Option<DownloadProgress> {
        self.downloaded = self.downloaded.saturating_add(bytes as u64);
        let snapshot = self.snapshot(now);
        let percent = snapshot.percent_complete().unwrap_or(self.last_percent);

        let due = match self.last_report {
            None => true,
            Some(last) => {
                percent - self.last_percent >= REPORT_PERCENT_STEP
                    || now.saturating_duration_since(last) >= REPORT_INTERVAL
            }
        };

        if due {
            self.last_percent = percent;
            self.last_report = Some(now);
            Some(snapshot)
        } else {
            None
        }
    }
}

/// Streams a URL to disk while publishing throttled progress.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    cancel: Option<CancellationToken>,
}

impl Downloader {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cancel: None,
        }
    }

    /// Abort the transfer with [`DownloadError::Cancelled`] once `token` fires.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Download `url` into `dest`, calling `on_progress` at a bounded rate
    /// and once more with the final totals.
    ///
    /// A failed or cancelled transfer removes `dest`, so a partial file is
    /// never left behind looking complete.
    ///
    /// # Errors
    /// Returns an error on request failure, a non-success status, a broken
    /// stream, a filesystem failure, or cancellation.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<DownloadProgress, DownloadError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        info!("Downloading {url} to {}", dest.display());

        let mut file_created = false;
        let transfer = self.stream_to_file(url, dest, &mut file_created, &mut on_progress);
        let result = match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(DownloadError::Cancelled),
                result = transfer => result,
            },
            None => transfer.await,
        };

        if result.is_err() && file_created {
            debug!("Removing incomplete download {}", dest.display());
            let _ = tokio::fs::remove_file(dest).await;
        }

        let progress = result?;
        info!(
            "Download complete: {} bytes in {:.1}s",
            progress.downloaded_bytes,
            progress.elapsed.as_secs_f64()
        );
        Ok(progress)
    }

    async fn stream_to_file<F>(
        &self,
        url: &str,
        dest: &Path,
        file_created: &mut bool,
        on_progress: &mut F,
    ) -> Result<DownloadProgress, DownloadError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| DownloadError::http("download request failed", error))?;

        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus {
                status: response.status(),
            });
        }

        let total = response.content_length();
        let mut tracker = ProgressTracker::new(total, Instant::now());
        on_progress(DownloadProgress::starting(total));

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|error| {
                DownloadError::io("failed to create download directory", parent, error)
            })?;
        }
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|error| DownloadError::io("failed to create download file", dest, error))?;
        *file_created = true;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|error| DownloadError::http("download stream error", error))?;
            file.write_all(&chunk)
                .await
                .map_err(|error| DownloadError::io("failed to write download data", dest, error))?;
            if let Some(progress) = tracker.record(chunk.len(), Instant::now()) {
                on_progress(progress);
            }
        }

        file.flush()
            .await
            .map_err(|error| DownloadError::io("failed to flush download file", dest, error))?;
        file.sync_all()
            .await
            .map_err(|error| DownloadError::io("failed to sync download file", dest, error))?;

        let final_progress = tracker.snapshot(Instant::now());
        on_progress(final_progress);
        Ok(final_progress)
    }
}
