//! Release-driven update and installation pipeline for the Project 86 launcher.
//!
//! This crate holds everything between "is there a newer build?" and "the
//! game is running", independent of any UI:
//! - Version comparison for release tags.
//! - A namespaced on-disk store and the TTL release cache built on it.
//! - Latest-release lookup and qualifying asset selection.
//! - Streaming downloads with throttled progress and ETA.
//! - Traversal-safe zip extraction.
//! - Executable discovery and launching.
//! - The `UpdatePipeline` state machine tying it together.

mod checksum;
pub mod connectivity;
pub mod download;
mod error;
pub mod extract;
pub mod launch;
mod lock;
pub mod pipeline;
pub mod release;
pub mod store;
mod version;

/// Reachability probe used to decide whether network calls are attempted.
pub use connectivity::{ConnectivityProbe, HttpProbe};
/// Streaming downloader and its progress snapshots.
pub use download::{DownloadError, DownloadProgress, Downloader, format_eta};
/// Aggregated pipeline error and its user-facing classification.
pub use error::{ErrorKind, PipelineError};
/// Zip extraction guarded against path traversal.
pub use extract::{ExtractError, extract_archive};
/// Executable lookup and process launch.
pub use launch::{LaunchError, find_executable, run_executable};
/// Orchestrator, its configuration, and published state.
pub use pipeline::{
    InstallHandle, PipelineConfig, PipelineState, StatusReport, UpdatePipeline,
};
/// Release API types, asset selection, and cached release records.
pub use release::{
    AssetFilter, FetchError, GitHubAsset, GitHubRelease, GitHubReleaseSource, ReleaseDescriptor,
    ReleaseFetcher, ReleaseNotes, ReleaseSource,
};
/// Key/value store, TTL release cache, and install marker.
pub use store::{BlobStore, InstalledRecord, ReleaseCache, StoreError};
/// Strict version ordering for release tags.
pub use version::{ReleaseVersion, VersionError, is_newer, parse_version};
