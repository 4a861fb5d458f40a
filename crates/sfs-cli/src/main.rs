#![forbid(unsafe_code)]
//! Mount a scratchfs instance: RAM-backed POSIX scratch space over FUSE.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sfs_core::{FileSystem, FsConfig};
use sfs_fuse::MountOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Default capacity: 512 MiB.
const DEFAULT_SIZE: u64 = 512 << 20;

#[derive(Parser)]
#[command(
    name = "scratchfs",
    about = "In-memory POSIX scratch filesystem served over FUSE",
    version
)]
struct Cli {
    /// Directory to mount the filesystem on.
    mountpoint: PathBuf,

    /// Maximum filesystem size in bytes.
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    size: u64,

    /// Turn on verbose logging.
    #[arg(long)]
    debug: bool,

    /// Allow other users to access the mount.
    #[arg(long)]
    allow_other: bool,

    /// Do not unmount automatically when the process exits.
    #[arg(long)]
    no_auto_unmount: bool,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if cli.size == 0 {
        bail!("--size must be positive");
    }

    let fs = Arc::new(FileSystem::new(&FsConfig {
        capacity_bytes: cli.size,
        ..FsConfig::default()
    }));

    info!(
        mountpoint = %cli.mountpoint.display(),
        size_bytes = cli.size,
        "mounting scratchfs"
    );

    let options = MountOptions {
        allow_other: cli.allow_other,
        auto_unmount: !cli.no_auto_unmount,
    };
    sfs_fuse::mount(fs, &cli.mountpoint, &options)
        .with_context(|| format!("mounting on {}", cli.mountpoint.display()))?;

    info!("unmounted");
    Ok(())
}
