//! Template stage - turns the customized image into a template VM
//!
//! Responsibilities:
//! - Destroy any VM already holding the template ID
//! - Create the VM, import the disk, attach the cloud-init drive
//! - Convert the VM into a template

use std::path::Path;

use crate::config::FleetConfig;
use crate::runner::Op;
use crate::{ProvisionContext, ProvisionError, Stage, cluster, ops};
use tracing::info;

/// Run the template stage
pub async fn run(ctx: &mut ProvisionContext<'_>) -> Result<(), ProvisionError> {
    let image = ctx.image(Stage::Template)?.to_path_buf();
    let template = &ctx.config.template;
    info!("Template stage: building template {} ({})", template.id, template.name);

    let existing = cluster::existing_vms(ctx.runner, &ctx.config.tools).await?;
    cluster::destroy_if_exists(ctx.runner, &ctx.config.tools, &existing, template.id).await?;

    ctx.runner.run_all(&plan(ctx.config, &image)).await?;

    info!("Template stage: template {} ready", template.id);
    Ok(())
}

/// Ordered commands building the template
pub fn plan(config: &FleetConfig, image: &Path) -> Vec<Op> {
    let tools = &config.tools;
    let template = &config.template;

    vec![
        ops::create_vm(tools, template),
        ops::import_disk(tools, template, image),
        ops::attach_cloudinit(tools, template),
        ops::set_cloudinit_user(tools, template),
        ops::convert_to_template(tools, template.id),
    ]
}
