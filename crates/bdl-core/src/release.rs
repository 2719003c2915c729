use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::ReleaseConfig;
use crate::retry::{Attempt, RetryPolicy};

/// One downloadable file of a release, as reported by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetDescriptor {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseListing {
    #[serde(default)]
    assets: Vec<AssetDescriptor>,
}

#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed with HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("no release asset ends with '{suffix}'")]
    NoMatchingAsset { suffix: String },
    #[error("download of {url} is incomplete: expected {expected:?} bytes, got {actual}")]
    DownloadIncomplete {
        url: String,
        expected: Option<u64>,
        actual: u64,
    },
    #[error("checksum mismatch for {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    fn network(context: &'static str, source: reqwest::Error) -> Self {
        Self::Network { context, source }
    }

    /// Transport failures and server-side statuses are worth another try;
    /// everything else will fail the same way again.
    fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Source of the modification payload and its installer.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn fetch_asset(&self) -> Result<FetchedAsset, FetchError>;
    async fn fetch_installer(&self) -> Result<Vec<u8>, FetchError>;
}

/// Fetches release assets from a GitHub-style "latest release" endpoint.
#[derive(Debug, Clone)]
pub struct AssetFetcher {
    client: reqwest::Client,
    api_url: String,
    asset_suffix: String,
    installer_url: String,
    retry: RetryPolicy,
}

impl AssetFetcher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ReleaseConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| FetchError::network("failed to build HTTP client", source))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            asset_suffix: config.asset_suffix.clone(),
            installer_url: config.installer_url.clone(),
            retry: RetryPolicy::schedule(config.download_retry_delays.clone()),
        })
    }

    /// Query the release endpoint and pick the first asset matching the suffix
    /// filter.
    ///
    /// # Errors
    /// Returns an error if the request fails, the response is not a release
    /// listing, or no asset matches.
    pub async fn query(&self) -> Result<AssetDescriptor, FetchError> {
        let response = self
            .client
            .get(&self.api_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|source| FetchError::network("failed to query releases", source))?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus {
                url: self.api_url.clone(),
                status: response.status(),
            });
        }

        let listing: ReleaseListing = response
            .json()
            .await
            .map_err(|source| FetchError::network("failed to parse release listing", source))?;

        select_asset(&listing.assets, &self.asset_suffix)
            .cloned()
            .ok_or_else(|| FetchError::NoMatchingAsset {
                suffix: self.asset_suffix.clone(),
            })
    }

    /// Download an asset and check it against the size and digest the
    /// release reported.
    ///
    /// # Errors
    /// Returns an error when the download fails, is truncated, or does not
    /// match the advertised checksum.
    pub async fn download(&self, asset: &AssetDescriptor) -> Result<Vec<u8>, FetchError> {
        let bytes = self.download_url(&asset.browser_download_url).await?;
        verify_payload(asset, &bytes)?;
        Ok(bytes)
    }

    async fn download_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = &self.client;
        self.retry
            .run_async(move |attempt| async move {
                match download_once(client, url).await {
                    Ok(bytes) => Attempt::Done(bytes),
                    Err(error) if error.is_transient() => {
                        warn!("Download attempt {attempt} of {url} failed: {error}");
                        Attempt::Retry(error)
                    }
                    Err(error) => Attempt::Abort(error),
                }
            })
            .await
            .map_err(|error| {
                debug!("Giving up on {url} after {} attempt(s)", error.attempts());
                error.into_inner()
            })
    }
}

#[async_trait]
impl ReleaseSource for AssetFetcher {
    async fn fetch_asset(&self) -> Result<FetchedAsset, FetchError> {
        let asset = self.query().await?;
        info!("Downloading {} from {}", asset.name, asset.browser_download_url);
        let bytes = self.download(&asset).await?;
        Ok(FetchedAsset {
            name: asset.name,
            bytes,
        })
    }

    async fn fetch_installer(&self) -> Result<Vec<u8>, FetchError> {
        info!("Downloading installer from {}", self.installer_url);
        let bytes = self.download_url(&self.installer_url).await?;
        if bytes.is_empty() {
            return Err(FetchError::DownloadIncomplete {
                url: self.installer_url.clone(),
                expected: None,
                actual: 0,
            });
        }
        Ok(bytes)
    }
}

async fn download_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    use futures_util::StreamExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::network("download request failed", source))?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus {
            url: url.to_string(),
            status: response.status(),
        });
    }

    let total = response.content_length();
    let mut bytes = Vec::with_capacity(
        total
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default(),
    );
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|source| FetchError::network("download stream error", source))?;
        bytes.extend_from_slice(&chunk);
    }

    if let Some(total) = total
        && total != bytes.len() as u64
    {
        return Err(FetchError::DownloadIncomplete {
            url: url.to_string(),
            expected: Some(total),
            actual: bytes.len() as u64,
        });
    }

    debug!("Downloaded {} bytes from {url}", bytes.len());
    Ok(bytes)
}

#[must_use]
pub fn select_asset<'a>(
    assets: &'a [AssetDescriptor],
    suffix: &str,
) -> Option<&'a AssetDescriptor> {
    assets.iter().find(|asset| asset.name.ends_with(suffix))
}

fn verify_payload(asset: &AssetDescriptor, bytes: &[u8]) -> Result<(), FetchError> {
    let actual_len = bytes.len() as u64;
    if actual_len == 0 || asset.size.is_some_and(|size| size != actual_len) {
        return Err(FetchError::DownloadIncomplete {
            url: asset.browser_download_url.clone(),
            expected: asset.size,
            actual: actual_len,
        });
    }

    let Some(expected) = asset.digest.as_deref().and_then(parse_sha256_digest) else {
        warn!(
            "Release asset {} has no sha256 digest; installing unverified payload",
            asset.name
        );
        return Ok(());
    };

    let actual = format!("{:x}", Sha256::digest(bytes));
    if actual == expected {
        debug!("Checksum verified for {}", asset.name);
        Ok(())
    } else {
        Err(FetchError::ChecksumMismatch {
            name: asset.name.clone(),
            expected,
            actual,
        })
    }
}

fn parse_sha256_digest(digest: &str) -> Option<String> {
    let (algorithm, hash) = digest.split_once(':')?;
    if !algorithm.eq_ignore_ascii_case("sha256") {
        return None;
    }
    if hash.len() != 64 || !hash.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    Some(hash.to_ascii_lowercase())
}
