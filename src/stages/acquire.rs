//! Acquire stage - places the cloud image in the working directory
//!
//! Responsibilities:
//! - Fetch the remote checksum manifest
//! - Reuse the cached image when its digest matches
//! - Download a fresh image and refresh the cache otherwise

use crate::image::{ImageFetcher, ImageSource};
use crate::{ProvisionContext, ProvisionError};
use tracing::info;

/// Run the acquire stage
pub async fn run(ctx: &mut ProvisionContext<'_>) -> Result<(), ProvisionError> {
    info!("Acquire stage: fetching {}", ctx.config.image.url);

    let fetcher = ImageFetcher::new(&ctx.config.image).with_dry_run(ctx.runner.is_dry_run());
    let acquired = fetcher.acquire(ctx.workdir).await?;

    match acquired.source {
        ImageSource::Cache => info!("Acquire stage: reused cached image"),
        ImageSource::Download => info!("Acquire stage: downloaded fresh image"),
    }

    ctx.image = Some(acquired.path);
    Ok(())
}
