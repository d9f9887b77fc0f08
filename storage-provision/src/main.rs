// SPDX-License-Identifier: GPL-3.0-only

//! manage-instance-storage - prepares ephemeral instance storage at boot
//!
//! Discovers ephemeral devices from instance metadata, joins them into one
//! LVM volume when there are several, formats the result as ext4, records
//! it in fstab and mounts it. Meant to run once per boot from init.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use storage_sys::{MetadataClient, SystemRunner, tools};
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod provision;

use config::Config;
use provision::{Outcome, Provisioner};

#[derive(Parser, Debug)]
#[command(name = "manage-instance-storage", version, about)]
struct Cli {
    /// Configuration file (defaults to /etc/instance-storage.toml if present)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log every command and probe, and show command stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "manage_instance_storage=debug,storage_sys=debug,warn"
    } else {
        "manage_instance_storage=info,storage_sys=info,warn"
    };

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Privileges and tools needed to touch devices; skipped when there are none
fn preflight() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("manage-instance-storage must run as root");
        anyhow::bail!("Must run with root privileges");
    }

    tools::require(tools::BASE_TOOLS)?;
    let missing_lvm = tools::missing(tools::LVM_TOOLS);
    if !missing_lvm.is_empty() {
        tracing::warn!(
            "LVM tools not found ({}); multiple ephemeral devices cannot be joined",
            missing_lvm.join(", ")
        );
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing::info!(
        "Starting manage-instance-storage v{}",
        env!("CARGO_PKG_VERSION")
    );

    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let runner = SystemRunner::new(cwd)
        .quiet(!cli.verbose)
        .show_stderr(cli.verbose);
    let metadata = MetadataClient::new(&config.metadata.url, config.metadata.timeout())?
        .with_retry(config.metadata.attempts, config.metadata.backoff());

    let outcome = Provisioner::new(&runner, &metadata, &config)
        .with_preflight(preflight)
        .run()
        .await?;

    match outcome {
        Outcome::NothingToDo => tracing::info!("No ephemeral storage to provision"),
        Outcome::Provisioned {
            device,
            mount_point,
        } => tracing::info!(
            "{} is mounted at {}",
            device.display(),
            mount_point.display()
        ),
    }

    Ok(())
}
