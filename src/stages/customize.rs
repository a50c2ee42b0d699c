//! Customize stage - modifies the working image offline
//!
//! Responsibilities:
//! - Make sure the customization tool is installed on the host
//! - Grow the image file
//! - Grow the root partition and filesystem
//! - Install packages and run extra commands inside the image

use std::path::Path;

use crate::config::{CustomizeConfig, ToolsConfig};
use crate::runner::{CommandRunner, Op};
use crate::{ProvisionContext, ProvisionError, Stage, ops};
use tracing::{debug, info};

/// Run the customize stage
pub async fn run(ctx: &mut ProvisionContext<'_>) -> Result<(), ProvisionError> {
    let image = ctx.image(Stage::Customize)?.to_path_buf();
    info!("Customize stage: modifying {}", image.display());

    ensure_tool(ctx.runner, &ctx.config.tools).await?;

    let steps = plan(&ctx.config.tools, &ctx.config.customize, &image);
    ctx.runner.run_all(&steps).await?;

    info!("Customize stage: applied {} modifications", steps.len());
    Ok(())
}

/// Install the customization tool if it is not on the PATH
pub async fn ensure_tool(
    runner: &dyn CommandRunner,
    tools: &ToolsConfig,
) -> Result<(), ProvisionError> {
    match runner.run(&ops::which(&tools.virt_customize)).await {
        Ok(()) => {
            debug!("{} is available", tools.virt_customize);
            Ok(())
        }
        Err(ProvisionError::CommandFailed { .. }) if !tools.host_packages.is_empty() => {
            info!(
                "{} not found, installing {} host packages",
                tools.virt_customize,
                tools.host_packages.len()
            );
            runner.run(&ops::install_host_packages(tools)).await
        }
        Err(e) => Err(e),
    }
}

/// Ordered image modifications
pub fn plan(tools: &ToolsConfig, settings: &CustomizeConfig, image: &Path) -> Vec<Op> {
    let mut steps = Vec::new();

    if !settings.disk_grow.trim().is_empty() {
        steps.push(ops::resize_image(tools, image, &settings.disk_grow));
    }

    steps.push(ops::grow_partition(tools, image, settings));
    steps.push(ops::resize_filesystem(tools, image, settings));

    if !settings.packages.is_empty() {
        steps.push(ops::install_image_packages(tools, image, &settings.packages));
    }

    for command in &settings.run_commands {
        steps.push(ops::customize_run(tools, image, command));
    }

    if settings.reset_machine_id {
        steps.push(ops::reset_machine_id(tools, image));
    }

    steps
}
