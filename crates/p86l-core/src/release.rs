use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksum::parse_sha256_digest;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("p86l/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<GitHubAsset>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no internet connection: {0}")]
    NoInternet(#[source] reqwest::Error),
    #[error("failed to reach release API: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release API responded with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse release response: {0}")]
    Parse(#[source] reqwest::Error),
    #[error("release {tag} has no qualifying asset")]
    NoQualifyingAsset { tag: String },
    #[error("latest release has no tag")]
    MissingTag,
}

impl FetchError {
    fn request(source: reqwest::Error) -> Self {
        if source.is_connect() || source.is_timeout() {
            Self::NoInternet(source)
        } else {
            Self::Request(source)
        }
    }
}

/// File-name rules that pick the one distributable out of a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFilter {
    pub name_token: String,
    pub extension: String,
    pub excluded_marker: String,
}

impl Default for AssetFilter {
    fn default() -> Self {
        Self {
            name_token: "Project86-v".to_string(),
            extension: ".zip".to_string(),
            excluded_marker: "dev".to_string(),
        }
    }
}

impl AssetFilter {
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.contains(&self.name_token)
            && file_name
                .to_ascii_lowercase()
                .ends_with(&self.extension.to_ascii_lowercase())
            && (self.excluded_marker.is_empty() || !file_name.contains(&self.excluded_marker))
    }

    /// First asset, in API order, whose name passes the filter.
    #[must_use]
    pub fn select<'a>(&self, assets: &'a [GitHubAsset]) -> Option<&'a GitHubAsset> {
        assets.iter().find(|asset| self.matches(&asset.name))
    }
}

/// Cached description of the newest installable build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub tag: String,
    pub download_url: String,
    #[serde(default)]
    pub asset_name: String,
    #[serde(default)]
    pub asset_size: Option<u64>,
    #[serde(default)]
    pub sha256: Option<String>,
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
}

impl ReleaseDescriptor {
    /// Whether this descriptor points at a downloadable asset.
    #[must_use]
    pub fn is_installable(&self) -> bool {
        !self.download_url.is_empty()
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }

    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        is_fresh(self.fetched_at, self.ttl, now)
    }
}

/// Release notes shown on the changelog page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseNotes {
    pub body: String,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
}

impl ReleaseNotes {
    #[must_use]
    pub fn from_release(release: &GitHubRelease, ttl: Duration) -> Self {
        Self {
            body: release.body.clone().unwrap_or_default(),
            url: release.html_url.clone(),
            fetched_at: Utc::now(),
            ttl,
        }
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        is_fresh(self.fetched_at, self.ttl, Utc::now())
    }
}

fn is_fresh(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(fetched_at) < ttl
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Remote source of "latest published release" metadata.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<GitHubRelease, FetchError>;
}

pub struct GitHubReleaseSource {
    client: reqwest::Client,
    api_base: String,
}

impl GitHubReleaseSource {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_api_base(client, GITHUB_API_BASE)
    }

    #[must_use]
    pub fn with_api_base(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReleaseSource for GitHubReleaseSource {
    async fn latest_release(&self, owner: &str, repo: &str) -> Result<GitHubRelease, FetchError> {
        let url = format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base);
        info!("Requesting latest release from {url}");

        let response = self
            .client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(FetchError::request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_snippet = response
                .text()
                .await
                .ok()
                .map(|body| response_snippet(&body, 160))
                .unwrap_or_default();
            return Err(FetchError::HttpStatus {
                status,
                body_snippet,
            });
        }

        response.json().await.map_err(FetchError::Parse)
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

/// Turns the latest release of a repository into a [`ReleaseDescriptor`].
///
/// Performs no caching; storing the result is up to the caller.
#[derive(Clone)]
pub struct ReleaseFetcher {
    source: Arc<dyn ReleaseSource>,
    filter: AssetFilter,
    ttl: Duration,
}

impl ReleaseFetcher {
    pub fn new(source: Arc<dyn ReleaseSource>, filter: AssetFilter, ttl: Duration) -> Self {
        Self {
            source,
            filter,
            ttl,
        }
    }

    /// Fetch the latest release and select its qualifying asset.
    ///
    /// # Errors
    /// Fails when the API call fails, the release has no tag, or no asset
    /// matches the filter.
    pub async fn fetch_latest(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<ReleaseDescriptor, FetchError> {
        let release = self.latest_release(owner, repo).await?;
        self.describe(&release)
    }

    /// Raw latest release, for callers that also need the notes.
    ///
    /// # Errors
    /// Propagates the source's request, status, and parse failures.
    pub async fn latest_release(&self, owner: &str, repo: &str) -> Result<GitHubRelease, FetchError> {
        self.source.latest_release(owner, repo).await
    }

    /// Build a descriptor from an already fetched release.
    ///
    /// # Errors
    /// Returns [`FetchError::MissingTag`] for an untagged release and
    /// [`FetchError::NoQualifyingAsset`] if no asset passes the filter.
    pub fn describe(&self, release: &GitHubRelease) -> Result<ReleaseDescriptor, FetchError> {
        let tag = release
            .tag_name
            .as_deref()
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .ok_or(FetchError::MissingTag)?;

        let asset = self
            .filter
            .select(&release.assets)
            .filter(|asset| !asset.browser_download_url.is_empty())
            .ok_or_else(|| FetchError::NoQualifyingAsset {
                tag: tag.to_string(),
            })?;
        debug!("Selected asset {} for release {tag}", asset.name);

        Ok(ReleaseDescriptor {
            tag: tag.to_string(),
            download_url: asset.browser_download_url.clone(),
            asset_name: asset.name.clone(),
            asset_size: (asset.size > 0).then_some(asset.size),
            sha256: asset.digest.as_deref().and_then(parse_sha256_digest),
            fetched_at: Utc::now(),
            ttl: self.ttl,
        })
    }

    #[must_use]
    pub fn notes(&self, release: &GitHubRelease) -> ReleaseNotes {
        ReleaseNotes::from_release(release, self.ttl)
    }
}
