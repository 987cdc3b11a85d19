//! Update and installation state machine.
//!
//! [`UpdatePipeline`] ties the release cache, fetcher, downloader, extractor
//! and launcher together. State is published through a `watch` channel with
//! whole-value replacement, so observers never see a half-updated value and
//! never need a lock to read it.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::{OwnedMutexGuard, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use p86l_platform::PathProvider;

use crate::checksum::sha256_file;
use crate::connectivity::{ConnectivityProbe, DEFAULT_PROBE_TIMEOUT, HttpProbe};
use crate::download::{DownloadError, DownloadProgress, Downloader};
use crate::error::{ErrorKind, PipelineError};
use crate::extract::extract_archive;
use crate::launch::{find_executable, run_executable};
use crate::lock::{InstallLock, LockError};
use crate::release::{
    AssetFilter, GitHubReleaseSource, ReleaseDescriptor, ReleaseFetcher, ReleaseNotes,
    ReleaseSource,
};
use crate::store::{BlobStore, InstalledRecord, ReleaseCache};
use crate::version::is_newer;

pub const DEFAULT_REPO_OWNER: &str = "Taliayaya";
pub const DEFAULT_REPO_NAME: &str = "Project-86";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(2);

pub const NO_INTERNET: &str = "NO INTERNET";
const EXTRACTING_TEXT: &str = "Extracting zip file...";

#[must_use]
pub fn default_executable_name() -> &'static str {
    if cfg!(windows) {
        "Project-86.exe"
    } else {
        "Project-86"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub owner: String,
    pub repo: String,
    pub executable_name: String,
    pub asset_filter: AssetFilter,
    pub cache_ttl: Duration,
    pub probe_timeout: Duration,
    pub probe_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            owner: DEFAULT_REPO_OWNER.to_string(),
            repo: DEFAULT_REPO_NAME.to_string(),
            executable_name: default_executable_name().to_string(),
            asset_filter: AssetFilter::default(),
            cache_ttl: DEFAULT_CACHE_TTL,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    /// No status check has completed yet.
    Unknown,
    NotInstalled,
    Installed {
        tag: String,
    },
    UpdateAvailable {
        installed: String,
        latest: String,
    },
    Downloading(DownloadProgress),
    Extracting,
}

impl PipelineState {
    /// An install is running; status checks must not interfere.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Downloading(_) | Self::Extracting)
    }

    #[must_use]
    pub fn installed_tag(&self) -> Option<&str> {
        match self {
            Self::Installed { tag } => Some(tag),
            Self::UpdateAvailable { installed, .. } => Some(installed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => f.write_str("status unknown"),
            Self::NotInstalled => f.write_str("not installed"),
            Self::Installed { tag } => write!(f, "installed ({tag})"),
            Self::UpdateAvailable { installed, latest } => {
                write!(f, "update available ({installed} -> {latest})")
            }
            Self::Downloading(_) => f.write_str("downloading"),
            Self::Extracting => f.write_str("extracting"),
        }
    }
}

/// Everything a front end needs to render the main action.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: PipelineState,
    pub online: bool,
    /// Non-fatal problem from the last status check.
    pub notice: Option<String>,
    /// Newest tag known from the release cache.
    pub latest: Option<String>,
}

impl StatusReport {
    /// Caption for the main action button.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match &self.state {
            PipelineState::Downloading(_) | PipelineState::Extracting => "Downloading...",
            PipelineState::Installed { .. } => "Play",
            PipelineState::UpdateAvailable { .. } if self.online => "Update",
            PipelineState::UpdateAvailable { .. } => "Play",
            PipelineState::NotInstalled | PipelineState::Unknown if self.online => "Install",
            PipelineState::NotInstalled | PipelineState::Unknown => NO_INTERNET,
        }
    }

    #[must_use]
    pub fn action_enabled(&self) -> bool {
        match &self.state {
            PipelineState::Installed { .. } | PipelineState::UpdateAvailable { .. } => true,
            PipelineState::NotInstalled => self.online && self.latest.is_some(),
            PipelineState::Unknown
            | PipelineState::Downloading(_)
            | PipelineState::Extracting => false,
        }
    }

    /// Secondary status line: progress while installing, otherwise the notice.
    #[must_use]
    pub fn detail(&self) -> String {
        match &self.state {
            PipelineState::Downloading(progress) => progress.status_text(),
            PipelineState::Extracting => EXTRACTING_TEXT.to_string(),
            _ => self.notice.clone().unwrap_or_default(),
        }
    }
}

/// Handle to a running install task.
pub struct InstallHandle {
    task: JoinHandle<Result<InstalledRecord, PipelineError>>,
    cancel: CancellationToken,
    state: watch::Receiver<PipelineState>,
}

impl InstallHandle {
    /// Latest published pipeline state.
    #[must_use]
    pub fn progress(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the install to stop. The pipeline returns to its previous state.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the install to finish.
    ///
    /// # Errors
    /// Returns the install's failure, or an error if the task panicked.
    pub async fn wait(self) -> Result<InstalledRecord, PipelineError> {
        match self.task.await {
            Ok(result) => result,
            Err(join_error) => Err(PipelineError::io(
                "install task failed",
                std::io::Error::other(join_error),
            )),
        }
    }
}

struct Inner {
    config: PipelineConfig,
    paths: Arc<dyn PathProvider>,
    client: reqwest::Client,
    fetcher: ReleaseFetcher,
    probe: Arc<dyn ConnectivityProbe>,
    cache: ReleaseCache,
    state: watch::Sender<PipelineState>,
    notice: Mutex<Option<String>>,
    last_probe: Mutex<Option<(Instant, bool)>>,
    install_slot: Arc<tokio::sync::Mutex<()>>,
    fetch_gate: tokio::sync::Mutex<()>,
    cancel: Mutex<CancellationToken>,
}

#[derive(Clone)]
pub struct UpdatePipeline {
    inner: Arc<Inner>,
}

impl UpdatePipeline {
    /// Pipeline backed by the GitHub API and the HTTP connectivity probe.
    #[must_use]
    pub fn new(config: PipelineConfig, paths: Arc<dyn PathProvider>, client: reqwest::Client) -> Self {
        let source = Arc::new(GitHubReleaseSource::new(client.clone()));
        let probe = Arc::new(HttpProbe::new(client.clone()).with_timeout(config.probe_timeout));
        Self::with_components(config, paths, client, source, probe)
    }

    #[must_use]
    pub fn with_components(
        config: PipelineConfig,
        paths: Arc<dyn PathProvider>,
        client: reqwest::Client,
        source: Arc<dyn ReleaseSource>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        let fetcher = ReleaseFetcher::new(source, config.asset_filter.clone(), config.cache_ttl);
        let cache = ReleaseCache::new(BlobStore::new(paths.store_dir()))
            .with_marker_store(BlobStore::new(paths.marker_dir()));
        let (state, _) = watch::channel(PipelineState::Unknown);

        Self {
            inner: Arc::new(Inner {
                config,
                paths,
                client,
                fetcher,
                probe,
                cache,
                state,
                notice: Mutex::new(None),
                last_probe: Mutex::new(None),
                install_slot: Arc::new(tokio::sync::Mutex::new(())),
                fetch_gate: tokio::sync::Mutex::new(()),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn cache(&self) -> &ReleaseCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        self.inner.paths.install_dir()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.inner.state.subscribe()
    }

    /// Snapshot for rendering; does not touch the network.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        let latest = match self.inner.cache.load_game() {
            Ok(descriptor) => descriptor.map(|descriptor| descriptor.tag),
            Err(error) => {
                warn!("Failed to read cached release: {error}");
                None
            }
        };
        let online = lock(&self.inner.last_probe).is_some_and(|(_, online)| online);

        StatusReport {
            state: self.state(),
            online,
            notice: lock(&self.inner.notice).clone(),
            latest,
        }
    }

    /// Refresh the cached release if needed and derive the install state.
    ///
    /// While an install is running this is a no-op returning the current
    /// state. Being offline, an unreachable API, or a release without a
    /// usable asset only set a notice; the state then reflects whatever was
    /// cached or installed before.
    ///
    /// # Errors
    /// Returns an error for integrity problems (corrupt cache record,
    /// unparsable tag) and local I/O failures.
    pub async fn check_status(&self) -> Result<PipelineState, PipelineError> {
        let current = self.state();
        if current.is_busy() {
            debug!("Skipping status check while {current}");
            return Ok(current);
        }

        let online = self.is_online().await;
        let installed = self.installed_record()?;
        let mut latest = self.inner.cache.load_game()?;
        let mut notice = (!online).then(|| NO_INTERNET.to_string());

        if online && latest.as_ref().is_none_or(|descriptor| !descriptor.is_fresh()) {
            match self.refresh_release().await {
                Ok(Some(descriptor)) => latest = Some(descriptor),
                Ok(None) => {}
                Err(error) if error.is_network() || error.kind() == ErrorKind::NoQualifyingAsset => {
                    warn!("Release check failed, using cached state: {error}");
                    notice = Some(error.to_string());
                }
                Err(error) => return Err(self.report(error)),
            }
        } else if !online {
            warn!("Offline, using cached release state");
        }

        let state = match (installed, latest) {
            (None, _) => PipelineState::NotInstalled,
            (Some(record), Some(latest)) => {
                if is_newer(&record.tag, &latest.tag).map_err(|error| self.report(error.into()))? {
                    PipelineState::UpdateAvailable {
                        installed: record.tag,
                        latest: latest.tag,
                    }
                } else {
                    PipelineState::Installed { tag: record.tag }
                }
            }
            (Some(record), None) => PipelineState::Installed { tag: record.tag },
        };

        *lock(&self.inner.notice) = notice;
        Ok(self.publish_unless_busy(state))
    }

    /// Start downloading and installing the cached release in the background.
    ///
    /// # Errors
    /// Returns [`PipelineError::InstallInProgress`] when another install
    /// holds the slot or the cross-process lock, [`PipelineError::InvalidState`]
    /// outside `NotInstalled`/`UpdateAvailable`, and
    /// [`PipelineError::NoInstallableRelease`] without a cached descriptor.
    pub fn start_install(&self) -> Result<InstallHandle, PipelineError> {
        let slot = Arc::clone(&self.inner.install_slot)
            .try_lock_owned()
            .map_err(|_| PipelineError::InstallInProgress)?;

        let previous = self.state();
        if !matches!(
            previous,
            PipelineState::NotInstalled | PipelineState::UpdateAvailable { .. }
        ) {
            return Err(PipelineError::invalid_state("install", &previous));
        }

        let descriptor = self
            .inner
            .cache
            .load_game()?
            .filter(ReleaseDescriptor::is_installable)
            .ok_or(PipelineError::NoInstallableRelease)?;

        let install_lock = InstallLock::acquire(&self.inner.paths.install_lock_file())
            .map_err(|error| match error {
                LockError::Held => PipelineError::InstallInProgress,
                LockError::Io { context, source } => PipelineError::io(context, source),
            })?;

        let token = CancellationToken::new();
        *lock(&self.inner.cancel) = token.clone();

        info!("Installing {} from {}", descriptor.tag, descriptor.download_url);
        self.inner
            .state
            .send_replace(PipelineState::Downloading(DownloadProgress::starting(
                descriptor.asset_size,
            )));

        let pipeline = self.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move {
            pipeline
                .run_install(descriptor, previous, task_token, slot, install_lock)
                .await
        });

        Ok(InstallHandle {
            task,
            cancel: token,
            state: self.subscribe(),
        })
    }

    /// Install or update and wait for completion.
    ///
    /// # Errors
    /// See [`UpdatePipeline::start_install`] and [`InstallHandle::wait`].
    pub async fn install_or_update(&self) -> Result<InstalledRecord, PipelineError> {
        self.start_install()?.wait().await
    }

    /// Launch the installed game and wait for it to exit.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidState`] unless installed, otherwise
    /// the launcher's `FileNotFound`/`LaunchFailed`.
    pub async fn play(&self) -> Result<ExitStatus, PipelineError> {
        let state = self.state();
        if state.installed_tag().is_none() {
            return Err(PipelineError::invalid_state("play", &state));
        }

        let executable = find_executable(
            &self.inner.paths.install_dir(),
            &self.inner.config.executable_name,
        )?;
        Ok(run_executable(&executable).await?)
    }

    /// Remove cached releases, the install marker and installed files.
    ///
    /// A running install is cancelled first and awaited.
    ///
    /// # Errors
    /// Returns an error if files cannot be removed.
    pub async fn reset(&self) -> Result<(), PipelineError> {
        lock(&self.inner.cancel).cancel();
        let _slot = self.inner.install_slot.lock().await;

        info!("Resetting cache and installed files");
        self.inner.cache.clear()?;
        self.inner.cache.remove_installed()?;
        remove_dir_if_exists(&self.inner.paths.install_dir(), "failed to remove install directory")?;
        remove_dir_if_exists(
            &self.inner.paths.download_dir(),
            "failed to remove download directory",
        )?;

        *lock(&self.inner.notice) = None;
        self.inner.state.send_replace(PipelineState::NotInstalled);
        Ok(())
    }

    /// Drop cached release records without touching the install.
    ///
    /// # Errors
    /// Returns an error if a cache namespace cannot be removed.
    pub fn clear_cache(&self) -> Result<(), PipelineError> {
        info!("Clearing release cache");
        Ok(self.inner.cache.clear()?)
    }

    /// Changelog of the latest release.
    ///
    /// Fresh cached notes are returned as is. Stale or missing notes are
    /// refetched when online; offline, the stale copy is still returned.
    ///
    /// # Errors
    /// Returns [`PipelineError::Offline`] when offline with nothing cached,
    /// or the fetch error when refetching fails with nothing cached.
    pub async fn release_notes(&self) -> Result<ReleaseNotes, PipelineError> {
        let cached = self.inner.cache.load_notes()?;
        if let Some(notes) = cached.as_ref().filter(|notes| notes.is_fresh()) {
            debug!("Using cached release notes");
            return Ok(notes.clone());
        }

        if !self.is_online().await {
            return cached.ok_or(PipelineError::Offline);
        }

        match self.refresh_release().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _in_flight = self.inner.fetch_gate.lock().await;
            }
            Err(error) if error.kind() == ErrorKind::NoQualifyingAsset => {}
            Err(error) if error.is_network() => {
                warn!("Failed to refresh release notes: {error}");
                return cached.ok_or(error);
            }
            Err(error) => return Err(error),
        }

        self.inner
            .cache
            .load_notes()?
            .or(cached)
            .ok_or(PipelineError::Offline)
    }

    /// Open the install root in the platform file manager.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or opened.
    pub fn open_install_folder(&self) -> Result<(), PipelineError> {
        let dir = self.inner.paths.install_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|error| PipelineError::io("failed to create install directory", error))?;
        open::that(&dir)
            .map_err(|error| PipelineError::io("failed to open install directory", error))
    }

    async fn is_online(&self) -> bool {
        let last_probe = *lock(&self.inner.last_probe);
        if let Some((probed_at, online)) = last_probe
            && probed_at.elapsed() < self.inner.config.probe_interval
        {
            return online;
        }

        let online = self.inner.probe.is_online().await;
        debug!("Connectivity probe: online={online}");
        *lock(&self.inner.last_probe) = Some((Instant::now(), online));
        online
    }

    fn installed_record(&self) -> Result<Option<InstalledRecord>, PipelineError> {
        let record = self.inner.cache.load_installed()?;
        if record.is_some() && !self.inner.paths.install_dir().is_dir() {
            warn!("Install marker present but install directory is missing");
            return Ok(None);
        }
        Ok(record)
    }

    /// Fetch the latest release once and cache its notes and descriptor.
    ///
    /// Returns `Ok(None)` without fetching when another fetch is in flight.
    async fn refresh_release(&self) -> Result<Option<ReleaseDescriptor>, PipelineError> {
        let Ok(_gate) = self.inner.fetch_gate.try_lock() else {
            debug!("Release fetch already in flight");
            return Ok(None);
        };

        let config = &self.inner.config;
        info!("Fetching latest release for {}/{}", config.owner, config.repo);
        let release = self
            .inner
            .fetcher
            .latest_release(&config.owner, &config.repo)
            .await?;

        self.inner
            .cache
            .save_notes(&self.inner.fetcher.notes(&release))?;
        let descriptor = self.inner.fetcher.describe(&release)?;
        self.inner.cache.save_game(&descriptor)?;
        info!("Latest release is {}", descriptor.tag);
        Ok(Some(descriptor))
    }

    async fn run_install(
        self,
        descriptor: ReleaseDescriptor,
        previous: PipelineState,
        token: CancellationToken,
        _slot: OwnedMutexGuard<()>,
        _install_lock: InstallLock,
    ) -> Result<InstalledRecord, PipelineError> {
        match self.install(&descriptor, &token).await {
            Ok(record) => {
                info!("Installed {}", record.tag);
                self.inner.state.send_replace(PipelineState::Installed {
                    tag: record.tag.clone(),
                });
                Ok(record)
            }
            Err(error) => {
                let error = self.report(error);
                self.inner.state.send_replace(previous);
                Err(error)
            }
        }
    }

    async fn install(
        &self,
        descriptor: &ReleaseDescriptor,
        token: &CancellationToken,
    ) -> Result<InstalledRecord, PipelineError> {
        let paths = &self.inner.paths;
        let download_dir = paths.download_dir();
        std::fs::create_dir_all(&download_dir)
            .map_err(|error| PipelineError::io("failed to create download directory", error))?;
        let scratch = tempfile::Builder::new()
            .prefix("install-")
            .tempdir_in(&download_dir)
            .map_err(|error| PipelineError::io("failed to create download directory", error))?;
        let archive = scratch.path().join(archive_file_name(descriptor));

        let state = &self.inner.state;
        Downloader::new(self.inner.client.clone())
            .with_cancellation(token.clone())
            .download(&descriptor.download_url, &archive, |progress| {
                state.send_replace(PipelineState::Downloading(progress));
            })
            .await
            .map_err(|error| match error {
                DownloadError::Cancelled => PipelineError::Cancelled,
                other => other.into(),
            })?;

        if let Some(expected) = &descriptor.sha256 {
            verify_checksum(&archive, &descriptor.asset_name, expected).await?;
        }
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        state.send_replace(PipelineState::Extracting);
        let data_dir = paths.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .map_err(|error| PipelineError::io("failed to create data directory", error))?;
        let staging = tempfile::Builder::new()
            .prefix(".run-staging-")
            .tempdir_in(&data_dir)
            .map_err(|error| PipelineError::io("failed to create staging directory", error))?;

        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &staging_path))
            .await
            .map_err(|error| {
                PipelineError::io("extraction task failed", std::io::Error::other(error))
            })??;

        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        swap_into_place(staging.path(), &paths.install_dir())?;

        let record = InstalledRecord {
            tag: descriptor.tag.clone(),
            asset_name: descriptor.asset_name.clone(),
            installed_at: Utc::now(),
        };
        self.inner.cache.save_installed(&record)?;
        Ok(record)
    }

    fn publish_unless_busy(&self, state: PipelineState) -> PipelineState {
        self.inner.state.send_if_modified(|current| {
            if current.is_busy() || *current == state {
                false
            } else {
                info!("Pipeline state: {state}");
                *current = state.clone();
                true
            }
        });
        self.state()
    }

    fn report(&self, error: PipelineError) -> PipelineError {
        if error.is_integrity_failure() {
            error!("Integrity failure ({}): {error}", error.kind());
        } else if error.kind() == ErrorKind::Cancelled {
            info!("Install cancelled");
        } else {
            warn!("Pipeline operation failed ({}): {error}", error.kind());
        }
        error
    }
}

async fn verify_checksum(archive: &Path, asset: &str, expected: &str) -> Result<(), PipelineError> {
    let path = archive.to_path_buf();
    let actual = tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|error| PipelineError::io("checksum task failed", std::io::Error::other(error)))?
        .map_err(|error| PipelineError::io("failed to hash downloaded archive", error))?;

    if actual.eq_ignore_ascii_case(expected) {
        debug!("Checksum verified for {asset}");
        Ok(())
    } else {
        Err(PipelineError::ChecksumMismatch {
            asset: asset.to_string(),
            expected: expected.to_string(),
            actual,
        })
    }
}

fn archive_file_name(descriptor: &ReleaseDescriptor) -> String {
    Path::new(&descriptor.asset_name)
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|name| !name.is_empty())
        .unwrap_or("game.zip")
        .to_string()
}

/// Replace `install_dir` with `staging`, restoring the old tree if the final
/// rename fails.
fn swap_into_place(staging: &Path, install_dir: &Path) -> Result<(), PipelineError> {
    let backup = install_dir.with_file_name(".run-previous");
    remove_dir_if_exists(&backup, "failed to remove stale install backup")?;

    let had_previous = install_dir.exists();
    if had_previous {
        std::fs::rename(install_dir, &backup)
            .map_err(|error| PipelineError::io("failed to move previous install aside", error))?;
    }

    if let Err(error) = std::fs::rename(staging, install_dir) {
        if had_previous && let Err(restore_error) = std::fs::rename(&backup, install_dir) {
            error!(
                "Failed to restore previous install from {}: {restore_error}",
                backup.display()
            );
        }
        return Err(PipelineError::io("failed to move new install into place", error));
    }

    if had_previous && let Err(error) = std::fs::remove_dir_all(&backup) {
        warn!("Failed to remove previous install {}: {error}", backup.display());
    }
    Ok(())
}

fn remove_dir_if_exists(path: &Path, context: &'static str) -> Result<(), PipelineError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(PipelineError::io(context, error)),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(state: PipelineState, online: bool, latest: Option<&str>) -> StatusReport {
        StatusReport {
            state,
            online,
            notice: None,
            latest: latest.map(str::to_string),
        }
    }

    #[test]
    fn labels_follow_state_and_connectivity() {
        assert_eq!(
            report(PipelineState::NotInstalled, true, Some("v1.0.0")).label(),
            "Install"
        );
        assert_eq!(
            report(PipelineState::NotInstalled, false, None).label(),
            "NO INTERNET"
        );
        assert_eq!(
            report(
                PipelineState::Installed {
                    tag: "1.0.0".to_string()
                },
                false,
                None
            )
            .label(),
            "Play"
        );

        let update = PipelineState::UpdateAvailable {
            installed: "1.0.0".to_string(),
            latest: "1.1.0".to_string(),
        };
        assert_eq!(report(update.clone(), true, None).label(), "Update");
        assert_eq!(report(update, false, None).label(), "Play");

        let downloading = report(
            PipelineState::Downloading(DownloadProgress::starting(Some(10))),
            true,
            None,
        );
        assert_eq!(downloading.label(), "Downloading...");
        assert!(!downloading.action_enabled());
    }

    #[test]
    fn install_needs_a_known_release() {
        assert!(!report(PipelineState::NotInstalled, true, None).action_enabled());
        assert!(report(PipelineState::NotInstalled, true, Some("v1")).action_enabled());
        assert!(!report(PipelineState::NotInstalled, false, Some("v1")).action_enabled());
    }

    #[test]
    fn detail_shows_progress_and_extraction() {
        let progress = DownloadProgress {
            total_bytes: Some(1000),
            downloaded_bytes: 123,
            elapsed: Duration::from_secs(1),
        };
        let downloading = report(PipelineState::Downloading(progress), true, None);
        assert_eq!(downloading.detail(), "12.3% - ETA: 7s");

        assert_eq!(
            report(PipelineState::Extracting, true, None).detail(),
            "Extracting zip file..."
        );

        let mut offline = report(PipelineState::NotInstalled, false, None);
        offline.notice = Some(NO_INTERNET.to_string());
        assert_eq!(offline.detail(), "NO INTERNET");
    }

    #[test]
    fn swap_replaces_previous_install() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let install_dir = temp.path().join("run");
        let staging = temp.path().join("staging");
        std::fs::create_dir_all(&install_dir).expect("install dir should be created");
        std::fs::write(install_dir.join("old.txt"), b"old").expect("old file should be written");
        std::fs::create_dir_all(&staging).expect("staging dir should be created");
        std::fs::write(staging.join("new.txt"), b"new").expect("new file should be written");

        swap_into_place(&staging, &install_dir).expect("swap should succeed");

        assert!(install_dir.join("new.txt").is_file());
        assert!(!install_dir.join("old.txt").exists());
        assert!(!staging.exists());
        assert!(!temp.path().join(".run-previous").exists());
    }

    #[test]
    fn archive_name_never_escapes_scratch_dir() {
        let mut descriptor = ReleaseDescriptor {
            tag: "v1.0.0".to_string(),
            download_url: "https://example.invalid/a.zip".to_string(),
            asset_name: "../../Project86-v1.0.0.zip".to_string(),
            asset_size: None,
            sha256: None,
            fetched_at: Utc::now(),
            ttl: DEFAULT_CACHE_TTL,
        };
        assert_eq!(archive_file_name(&descriptor), "Project86-v1.0.0.zip");

        descriptor.asset_name = String::new();
        assert_eq!(archive_file_name(&descriptor), "game.zip");
    }
}
