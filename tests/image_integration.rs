//! Integration tests for image acquisition using wiremock

use fleet_provision::ProvisionError;
use fleet_provision::config::ImageConfig;
use fleet_provision::image::checksum::sha256_bytes;
use fleet_provision::image::{ImageFetcher, ImageSource};
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMAGE_NAME: &str = "noble-server-cloudimg-amd64.img";
const FRESH: &[u8] = b"fresh cloud image contents";
const STALE: &[u8] = b"stale cloud image contents";

struct Fixture {
    server: MockServer,
    temp: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            temp: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> ImageConfig {
        ImageConfig {
            url: format!("{}/images/{}", self.server.uri(), IMAGE_NAME),
            checksum_url: format!("{}/images/SHA256SUMS", self.server.uri()),
            cache_dir: self.temp.path().join("cache"),
        }
    }

    fn dest_dir(&self) -> std::path::PathBuf {
        let dir = self.temp.path().join("work");
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn seed_cache(&self, contents: &[u8]) {
        let dir = self.temp.path().join("cache");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(IMAGE_NAME), contents).unwrap();
    }

    fn cached(&self) -> Vec<u8> {
        fs::read(self.temp.path().join("cache").join(IMAGE_NAME)).unwrap()
    }

    async fn serve_manifest(&self, body: String) {
        Mock::given(method("GET"))
            .and(path("/images/SHA256SUMS"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    async fn serve_image(&self, expected_requests: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/images/{}", IMAGE_NAME)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(FRESH))
            .expect(expected_requests)
            .mount(&self.server)
            .await;
    }
}

fn manifest_for(contents: &[u8]) -> String {
    format!(
        "{}  other-image.img\n{} *{}\n",
        sha256_bytes(b"unrelated"),
        sha256_bytes(contents),
        IMAGE_NAME
    )
}

/// A cached image whose digest matches the manifest is reused
#[tokio::test]
async fn test_cache_hit_skips_download() {
    let fx = Fixture::new().await;
    fx.seed_cache(FRESH);
    fx.serve_manifest(manifest_for(FRESH)).await;
    fx.serve_image(0).await;

    let acquired = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(acquired.source, ImageSource::Cache);
    assert_eq!(acquired.path, fx.dest_dir().join(IMAGE_NAME));
    assert_eq!(fs::read(&acquired.path).unwrap(), FRESH);
}

/// A stale cached image is replaced by a fresh download
#[tokio::test]
async fn test_cache_mismatch_downloads() {
    let fx = Fixture::new().await;
    fx.seed_cache(STALE);
    fx.serve_manifest(manifest_for(FRESH)).await;
    fx.serve_image(1).await;

    let acquired = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(acquired.source, ImageSource::Download);
    assert_eq!(fs::read(&acquired.path).unwrap(), FRESH);
    assert_eq!(fx.cached(), FRESH);
}

/// A dry run still downloads into the working directory but keeps the stale cache
#[tokio::test]
async fn test_dry_run_keeps_cache() {
    let fx = Fixture::new().await;
    fx.seed_cache(STALE);
    fx.serve_manifest(manifest_for(FRESH)).await;
    fx.serve_image(1).await;

    let acquired = ImageFetcher::new(&fx.config())
        .with_dry_run(true)
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(acquired.source, ImageSource::Download);
    assert_eq!(fs::read(&acquired.path).unwrap(), FRESH);
    assert_eq!(fx.cached(), STALE);
}

/// Without a cached copy the image is downloaded and cached
#[tokio::test]
async fn test_empty_cache_downloads_and_caches() {
    let fx = Fixture::new().await;
    fx.serve_manifest(manifest_for(FRESH)).await;
    fx.serve_image(1).await;

    let acquired = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(acquired.source, ImageSource::Download);
    assert_eq!(fx.cached(), FRESH);
    // No partial file left behind
    assert!(!fx.temp.path().join("cache").join("noble-server-cloudimg-amd64.part").exists());
}

/// A manifest without an entry for the image counts as a mismatch
#[tokio::test]
async fn test_missing_manifest_entry_downloads() {
    let fx = Fixture::new().await;
    fx.seed_cache(FRESH);
    fx.serve_manifest(format!("{}  other-image.img\n", sha256_bytes(FRESH)))
        .await;
    fx.serve_image(1).await;

    let acquired = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(acquired.source, ImageSource::Download);
}

/// A download whose digest disagrees with the manifest is still used
#[tokio::test]
async fn test_download_digest_mismatch_is_not_fatal() {
    let fx = Fixture::new().await;
    fx.serve_manifest(manifest_for(STALE)).await;
    fx.serve_image(1).await;

    let acquired = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap();

    assert_eq!(fs::read(&acquired.path).unwrap(), FRESH);
}

#[tokio::test]
async fn test_manifest_not_found() {
    let fx = Fixture::new().await;
    Mock::given(method("GET"))
        .and(path("/images/SHA256SUMS"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&fx.server)
        .await;
    fx.serve_image(0).await;

    let err = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Http(_)));
    assert!(err.to_string().contains("404"));
}

#[tokio::test]
async fn test_image_server_error() {
    let fx = Fixture::new().await;
    fx.serve_manifest(manifest_for(FRESH)).await;
    Mock::given(method("GET"))
        .and(path(format!("/images/{}", IMAGE_NAME)))
        .respond_with(ResponseTemplate::new(500))
        .mount(&fx.server)
        .await;

    let err = ImageFetcher::new(&fx.config())
        .acquire(&fx.dest_dir())
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Http(_)));
    assert!(!fx.temp.path().join("cache").join(IMAGE_NAME).exists());
}
