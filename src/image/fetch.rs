//! Cloud image acquisition
//!
//! The last downloaded image is kept in a cache directory. A run reuses
//! the cached copy when its digest matches the remote manifest and
//! downloads a fresh one otherwise.

use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::checksum::{Manifest, digests_match, sha256_file};
use crate::ProvisionError;
use crate::config::ImageConfig;

/// File name of the image behind `url` (last non-empty path segment)
pub fn image_filename(url: &str) -> Result<String, ProvisionError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path
        .split_once("://")
        .map(|(_, rest)| rest.split_once('/').map_or("", |(_, p)| p))
        .unwrap_or(path);

    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ProvisionError::Config(format!("cannot derive an image file name from {}", url))
        })
}

/// Where an acquired image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Cached copy matched the manifest
    Cache,
    /// Fresh download
    Download,
}

/// Result of [`ImageFetcher::acquire`]
#[derive(Debug, Clone)]
pub struct AcquiredImage {
    pub path: PathBuf,
    pub source: ImageSource,
}

/// Downloads and caches a cloud image
pub struct ImageFetcher {
    client: reqwest::Client,
    image_url: String,
    checksum_url: String,
    cache_dir: PathBuf,
    dry_run: bool,
}

fn http_error(action: &str, url: &str, e: reqwest::Error) -> ProvisionError {
    ProvisionError::Http(format!("{} {} failed: {}", action, url, e))
}

impl ImageFetcher {
    pub fn new(config: &ImageConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            image_url: config.url.clone(),
            checksum_url: config.checksum_url.clone(),
            cache_dir: config.cache_dir.clone(),
            dry_run: false,
        }
    }

    /// Leave the cache untouched after a download
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Place a verified or freshly downloaded image in `dest_dir`
    pub async fn acquire(&self, dest_dir: &Path) -> Result<AcquiredImage, ProvisionError> {
        let filename = image_filename(&self.image_url)?;
        let manifest = self.fetch_manifest().await?;
        let expected = manifest.digest_for(&filename);

        let cached = self.cache_dir.join(&filename);
        let dest = dest_dir.join(&filename);

        if let Some(expected) = expected {
            if self.cache_matches(&cached, expected).await? {
                info!("Using cached image {}", cached.display());
                fs::copy(&cached, &dest).await?;
                return Ok(AcquiredImage {
                    path: dest,
                    source: ImageSource::Cache,
                });
            }
        } else {
            debug!("Manifest has no entry for {}", filename);
        }

        info!("Downloading {}", self.image_url);
        self.download(&dest).await?;

        if let Some(expected) = expected {
            let actual = sha256_file(&dest).await?;
            if !digests_match(&actual, expected) {
                warn!(
                    "Downloaded {} has digest {}, manifest says {}",
                    filename, actual, expected
                );
            }
        }

        if self.dry_run {
            info!("[dry-run] not updating cache {}", cached.display());
        } else {
            self.update_cache(&dest, &cached).await?;
        }

        Ok(AcquiredImage {
            path: dest,
            source: ImageSource::Download,
        })
    }

    async fn fetch_manifest(&self) -> Result<Manifest, ProvisionError> {
        debug!("Fetching checksum manifest {}", self.checksum_url);

        let response = self
            .client
            .get(&self.checksum_url)
            .send()
            .await
            .map_err(|e| http_error("request to", &self.checksum_url, e))?;

        if !response.status().is_success() {
            return Err(ProvisionError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                self.checksum_url
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| http_error("reading", &self.checksum_url, e))?;

        Ok(Manifest::parse(&text))
    }

    async fn cache_matches(&self, cached: &Path, expected: &str) -> Result<bool, ProvisionError> {
        if !cached.exists() {
            debug!("No cached image at {}", cached.display());
            return Ok(false);
        }

        let actual = sha256_file(cached).await?;
        let matches = digests_match(&actual, expected);
        if !matches {
            debug!("Cached image {} is stale", cached.display());
        }
        Ok(matches)
    }

    async fn download(&self, dest: &Path) -> Result<(), ProvisionError> {
        let response = self
            .client
            .get(&self.image_url)
            .send()
            .await
            .map_err(|e| http_error("request to", &self.image_url, e))?;

        if !response.status().is_success() {
            return Err(ProvisionError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                self.image_url
            )));
        }

        let mut file = fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| http_error("reading", &self.image_url, e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }

    async fn update_cache(&self, fresh: &Path, cached: &Path) -> Result<(), ProvisionError> {
        fs::create_dir_all(&self.cache_dir).await?;

        let partial = cached.with_extension("part");
        fs::copy(fresh, &partial).await?;
        fs::rename(&partial, cached).await?;

        debug!("Cached image at {}", cached.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_filename() {
        let url = "https://cloud-images.ubuntu.com/jammy/current/jammy-server-cloudimg-amd64.img";
        assert_eq!(image_filename(url).unwrap(), "jammy-server-cloudimg-amd64.img");
        assert_eq!(
            image_filename("http://mirror/images/debian.qcow2?download=1").unwrap(),
            "debian.qcow2"
        );
        assert_eq!(image_filename("http://mirror/images/").unwrap(), "images");
    }

    #[test]
    fn test_image_filename_without_path() {
        assert!(image_filename("http://mirror").is_err());
        assert!(image_filename("http://mirror/").is_err());
    }
}
