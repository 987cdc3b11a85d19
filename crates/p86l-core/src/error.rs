use std::fmt;

use thiserror::Error;

use crate::download::DownloadError;
use crate::extract::ExtractError;
use crate::launch::LaunchError;
use crate::release::FetchError;
use crate::store::StoreError;
use crate::version::VersionError;

/// Coarse classification shown to the user and used for recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoInternet,
    RemoteUnavailable,
    NoQualifyingAsset,
    InvalidVersionFormat,
    FsError,
    UnsafeArchiveEntry,
    FileNotFound,
    LaunchFailed,
    CacheCorrupt,
    ChecksumMismatch,
    Cancelled,
    InvalidState,
    InstallInProgress,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NoInternet => "no internet connection",
            Self::RemoteUnavailable => "release server unavailable",
            Self::NoQualifyingAsset => "no downloadable build in the latest release",
            Self::InvalidVersionFormat => "invalid version format",
            Self::FsError => "file system error",
            Self::UnsafeArchiveEntry => "unsafe archive entry",
            Self::FileNotFound => "file not found",
            Self::LaunchFailed => "launch failed",
            Self::CacheCorrupt => "cache corrupt",
            Self::ChecksumMismatch => "checksum mismatch",
            Self::Cancelled => "cancelled",
            Self::InvalidState => "operation not allowed right now",
            Self::InstallInProgress => "install already in progress",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("another install is already in progress")]
    InstallInProgress,

    #[error("no installable release is known; check for updates first")]
    NoInstallableRelease,

    #[error("operation cancelled")]
    Cancelled,

    #[error("no internet connection")]
    Offline,

    #[error("checksum mismatch for {asset}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        asset: String,
        expected: String,
        actual: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Version(_) => ErrorKind::InvalidVersionFormat,
            Self::Store(StoreError::Corrupt { .. }) => ErrorKind::CacheCorrupt,
            Self::Store(_) | Self::Io { .. } => ErrorKind::FsError,
            Self::Fetch(error) => match error {
                FetchError::NoInternet(_) => ErrorKind::NoInternet,
                FetchError::Request(_) | FetchError::HttpStatus { .. } | FetchError::Parse(_) => {
                    ErrorKind::RemoteUnavailable
                }
                FetchError::NoQualifyingAsset { .. } => ErrorKind::NoQualifyingAsset,
                FetchError::MissingTag => ErrorKind::InvalidVersionFormat,
            },
            Self::Download(error) => match error {
                DownloadError::Http { source, .. }
                    if source.is_connect() || source.is_timeout() =>
                {
                    ErrorKind::NoInternet
                }
                DownloadError::Http { .. } | DownloadError::HttpStatus { .. } => {
                    ErrorKind::RemoteUnavailable
                }
                DownloadError::Io { .. } => ErrorKind::FsError,
                DownloadError::Cancelled => ErrorKind::Cancelled,
            },
            Self::Extract(ExtractError::UnsafeArchiveEntry { .. }) => {
                ErrorKind::UnsafeArchiveEntry
            }
            Self::Extract(_) => ErrorKind::FsError,
            Self::Launch(LaunchError::FileNotFound { .. }) => ErrorKind::FileNotFound,
            Self::Launch(LaunchError::Io { .. }) => ErrorKind::FsError,
            Self::Launch(LaunchError::LaunchFailed { .. }) => ErrorKind::LaunchFailed,
            Self::InvalidState { .. } | Self::NoInstallableRelease => ErrorKind::InvalidState,
            Self::InstallInProgress => ErrorKind::InstallInProgress,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Offline => ErrorKind::NoInternet,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
        }
    }

    /// Malicious payloads and corrupted data, as opposed to transient failures.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsafeArchiveEntry
                | ErrorKind::InvalidVersionFormat
                | ErrorKind::CacheCorrupt
                | ErrorKind::ChecksumMismatch
        )
    }

    /// Network failures that a status check recovers from locally.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NoInternet | ErrorKind::RemoteUnavailable
        )
    }
}
