//! fleet-provision - build a cloud-image template and clone a fleet from it
//!
//! Exits 0 on success and 1 on any failure. The output of a failed
//! external command is printed to stderr.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use fleet_provision::config::{DEFAULT_CONFIG_PATH, loader::load_config};
use fleet_provision::runner::SystemRunner;
use fleet_provision::{ProvisionError, ProvisionOptions, Stage, provision};

#[derive(Parser)]
#[command(name = "fleet-provision")]
#[command(author, version, long_about = None)]
#[command(about = "Build a VM template from a cloud image and clone a fleet")]
struct Cli {
    /// Number of clones to create
    count: u32,

    /// Configuration file
    #[arg(short, long, env = "FLEET_PROVISION_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run only these stages (repeatable; default: all)
    #[arg(short, long = "stage", value_enum)]
    stages: Vec<StageArg>,

    /// Log commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Do not remove the working directory on exit
    #[arg(long)]
    keep_workdir: bool,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    /// Download or reuse the cloud image
    Acquire,
    /// Grow and customize the image
    Customize,
    /// Create the template VM
    Template,
    /// Clone and start the fleet
    Fleet,
}

impl From<StageArg> for Stage {
    fn from(arg: StageArg) -> Self {
        match arg {
            StageArg::Acquire => Stage::Acquire,
            StageArg::Customize => Stage::Customize,
            StageArg::Template => Stage::Template,
            StageArg::Fleet => Stage::Fleet,
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

async fn run(cli: Cli) -> Result<(), ProvisionError> {
    let config = load_config(&cli.config).await?;

    let mut options = ProvisionOptions::new(cli.count);
    if !cli.stages.is_empty() {
        options.stages = cli.stages.into_iter().map(Stage::from).collect();
    }
    options.keep_workdir = cli.keep_workdir;

    if cli.dry_run {
        info!("Dry run: external commands will be logged, not executed");
    }
    let runner = SystemRunner::dry_run(cli.dry_run);

    provision(&config, &runner, &options).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => {
            info!("Provisioning complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            if let Some(stderr) = e.captured_stderr() {
                eprintln!("{}", stderr.trim_end());
            }
            ExitCode::FAILURE
        }
    }
}
