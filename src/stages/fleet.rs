//! Fleet stage - clones and starts the instances
//!
//! Clone `i` in `1..=N` is built strictly in order: destroy any VM with
//! the same ID, clone the template, tag the NIC with VLAN `i + 1`, write
//! and attach its network snippet, start it. A failure stops the fleet;
//! clones already started are left running.

use crate::cluster::{self, ExistingVms};
use crate::config::FleetConfig;
use crate::fleet::{self, CloneSpec};
use crate::{ProvisionContext, ProvisionError, ops, snippet};
use tracing::{debug, info};

/// Run the fleet stage
pub async fn run(ctx: &mut ProvisionContext<'_>) -> Result<(), ProvisionError> {
    if ctx.fleet_size == 0 {
        info!("Fleet stage: fleet size is 0, nothing to clone");
        return Ok(());
    }

    info!(
        "Fleet stage: cloning {} instances from template {}",
        ctx.fleet_size, ctx.config.template.id
    );

    let specs = fleet::plan(ctx.config, ctx.fleet_size)?;
    let template = snippet::load_template(ctx.config.fleet.network_template.as_deref()).await?;
    FleetConfig::check_network_template(&template);

    let existing = cluster::existing_vms(ctx.runner, &ctx.config.tools).await?;

    for spec in &specs {
        provision_clone(ctx, spec, &template, &existing).await?;
    }

    info!("Fleet stage: {} instances started", specs.len());
    Ok(())
}

async fn provision_clone(
    ctx: &ProvisionContext<'_>,
    spec: &CloneSpec,
    network_template: &str,
    existing: &ExistingVms,
) -> Result<(), ProvisionError> {
    let tools = &ctx.config.tools;
    let settings = &ctx.config.fleet;

    info!(
        "Provisioning clone {}/{}: VM {} ({}) on VLAN {}",
        spec.index, ctx.fleet_size, spec.vmid, spec.name, spec.vlan
    );

    cluster::destroy_if_exists(ctx.runner, tools, existing, spec.vmid).await?;

    ctx.runner
        .run(&ops::clone_vm(tools, ctx.config.template.id, spec.vmid, &spec.name))
        .await?;
    ctx.runner
        .run(&ops::set_vlan(tools, spec.vmid, ctx.config.fleet_bridge(), spec.vlan))
        .await?;

    let file = snippet::file_name(&settings.snippet_prefix, spec.vmid);
    let content = snippet::render(network_template, spec.address);
    if ctx.runner.is_dry_run() {
        info!(
            "[dry-run] write {}:\n{}",
            settings.snippets_dir.join(&file).display(),
            content
        );
    } else {
        snippet::write(&settings.snippets_dir, &file, &content).await?;
    }
    debug!("Clone {} network address value {}", spec.vmid, spec.address);

    ctx.runner
        .run(&ops::set_network_snippet(tools, spec.vmid, &settings.snippet_storage, &file))
        .await?;
    ctx.runner.run(&ops::start_vm(tools, spec.vmid)).await?;

    Ok(())
}
