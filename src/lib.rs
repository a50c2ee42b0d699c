//! fleet-provision library
//!
//! Builds a VM template from a cloud image on a Proxmox VE host and clones
//! a fleet of instances from it.
//!
//! # Pipeline
//!
//! 1. **Acquire**: fetch the cloud image, reusing a cached copy whose
//!    SHA-256 matches the remote manifest
//! 2. **Customize**: grow the disk and install packages with `virt-customize`
//! 3. **Template**: create a VM around the image and convert it to a template
//! 4. **Fleet**: clone the template N times with per-clone VLAN and network
//!    configuration, then start each clone
//!
//! Everything runs sequentially. The first failing external command aborts
//! the run; the temporary working directory is removed on every exit path.

pub mod cluster;
pub mod config;
pub mod fleet;
pub mod image;
pub mod ops;
pub mod runner;
pub mod snippet;
pub mod stages;
pub mod workdir;

mod error;

pub use error::ProvisionError;

use std::path::{Path, PathBuf};
use tracing::info;

use config::FleetConfig;
use runner::CommandRunner;
use workdir::WorkDir;

/// Provisioning stages, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Fetch or reuse the cloud image
    Acquire,
    /// Modify the image offline
    Customize,
    /// Create the template VM
    Template,
    /// Clone and start the fleet
    Fleet,
}

impl Stage {
    /// Every stage, in pipeline order
    pub const ALL: [Stage; 4] = [Stage::Acquire, Stage::Customize, Stage::Template, Stage::Fleet];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Acquire => write!(f, "acquire"),
            Stage::Customize => write!(f, "customize"),
            Stage::Template => write!(f, "template"),
            Stage::Fleet => write!(f, "fleet"),
        }
    }
}

/// State shared by the stages of one run
pub struct ProvisionContext<'a> {
    pub config: &'a FleetConfig,
    pub runner: &'a dyn CommandRunner,
    pub workdir: &'a Path,
    pub fleet_size: u32,
    /// Working copy of the image, set by the acquire stage
    pub image: Option<PathBuf>,
}

impl<'a> ProvisionContext<'a> {
    pub fn new(
        config: &'a FleetConfig,
        runner: &'a dyn CommandRunner,
        workdir: &'a Path,
        fleet_size: u32,
    ) -> Self {
        Self {
            config,
            runner,
            workdir,
            fleet_size,
            image: None,
        }
    }

    /// The acquired image, or an error naming the stage that needs it
    pub fn image(&self, stage: Stage) -> Result<&Path, ProvisionError> {
        self.image.as_deref().ok_or_else(|| {
            ProvisionError::stage(
                stage.to_string(),
                "no image has been acquired; run the acquire stage first",
            )
        })
    }
}

/// Options for a full provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub fleet_size: u32,
    pub stages: Vec<Stage>,
    pub keep_workdir: bool,
}

impl ProvisionOptions {
    /// Run every stage for a fleet of `fleet_size`
    pub fn new(fleet_size: u32) -> Self {
        Self {
            fleet_size,
            stages: Stage::ALL.to_vec(),
            keep_workdir: false,
        }
    }
}

/// Run the selected stages inside a fresh working directory
///
/// The working directory is removed before this returns, whether the run
/// succeeded or not (unless `keep_workdir` is set).
pub async fn provision(
    config: &FleetConfig,
    runner: &dyn CommandRunner,
    options: &ProvisionOptions,
) -> Result<(), ProvisionError> {
    config.validate(options.fleet_size)?;

    let mut workdir = WorkDir::create(config.workdir_parent.as_deref())?;
    if options.keep_workdir {
        workdir.keep();
    }

    let mut ctx = ProvisionContext::new(config, runner, workdir.path(), options.fleet_size);
    run_stages(&mut ctx, &options.stages).await
}

/// Run the given stages in pipeline order
pub async fn run_stages(
    ctx: &mut ProvisionContext<'_>,
    stages: &[Stage],
) -> Result<(), ProvisionError> {
    let mut ordered = stages.to_vec();
    ordered.sort();
    ordered.dedup();

    for stage in ordered {
        info!("Starting stage: {}", stage);
        run_stage(ctx, stage).await?;
        info!("Completed stage: {}", stage);
    }
    Ok(())
}

async fn run_stage(ctx: &mut ProvisionContext<'_>, stage: Stage) -> Result<(), ProvisionError> {
    match stage {
        Stage::Acquire => stages::acquire::run(ctx).await,
        Stage::Customize => stages::customize::run(ctx).await,
        Stage::Template => stages::template::run(ctx).await,
        Stage::Fleet => stages::fleet::run(ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let mut stages = vec![Stage::Fleet, Stage::Acquire, Stage::Template, Stage::Customize];
        stages.sort();
        assert_eq!(stages, Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_display() {
        let names: Vec<String> = Stage::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["acquire", "customize", "template", "fleet"]);
    }

    #[test]
    fn test_context_without_image() {
        let config = FleetConfig::default();
        let runner = runner::mock::RecordingRunner::new();
        let ctx = ProvisionContext::new(&config, &runner, Path::new("/tmp"), 1);

        let err = ctx.image(Stage::Customize).unwrap_err();
        assert!(err.to_string().contains("customize"));
    }
}
