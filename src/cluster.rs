//! Cluster resource queries
//!
//! VM IDs are only kept unique by destroying an existing VM before one is
//! created under the same ID. The set of existing IDs comes from the
//! cluster resource listing.

use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::ProvisionError;
use crate::config::ToolsConfig;
use crate::ops;
use crate::runner::CommandRunner;

/// One row of the cluster resource listing; only the ID is used
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterResource {
    pub vmid: Option<u32>,
}

/// VM IDs currently defined in the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingVms {
    ids: BTreeSet<u32>,
}

impl ExistingVms {
    /// Parse the JSON listing; empty output means no VMs
    pub fn parse(json: &str) -> Result<Self, ProvisionError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }

        let resources: Vec<ClusterResource> = serde_json::from_str(json)?;
        Ok(resources.into_iter().filter_map(|r| r.vmid).collect())
    }

    pub fn contains(&self, vmid: u32) -> bool {
        self.ids.contains(&vmid)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<u32> for ExistingVms {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Query the cluster for existing VM IDs
pub async fn existing_vms(
    runner: &dyn CommandRunner,
    tools: &ToolsConfig,
) -> Result<ExistingVms, ProvisionError> {
    let output = runner.capture(&ops::list_vm_resources(tools)).await?;
    let existing = ExistingVms::parse(&output)?;
    debug!("Cluster has {} VMs", existing.len());
    Ok(existing)
}

/// Destroy `vmid` if it is already defined
pub async fn destroy_if_exists(
    runner: &dyn CommandRunner,
    tools: &ToolsConfig,
    existing: &ExistingVms,
    vmid: u32,
) -> Result<(), ProvisionError> {
    if existing.contains(vmid) {
        info!("VM {} already exists, destroying it", vmid);
        runner.run(&ops::destroy_vm(tools, vmid)).await?;
    }
    Ok(())
}
