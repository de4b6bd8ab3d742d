//! multifs command-line entry point.
//!
//! Mounts an ordered list of backing directories as one FUSE filesystem.
//! Files fill the first directory until it runs out of space, then spill
//! onto the next one, so the mount exposes the combined capacity.
//!
//! Usage:
//!   multifs /mnt/combined --fss /mnt/ssd/tier:/mnt/hdd/tier

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use multifs_storage::{DirBackend, StorageBackend};
use multifs_vfs::fuse::{spawn_mount, MultiFs, VfsStatsCollector};
use multifs_vfs::VfsOptions;

/// Mount several directories as one filesystem with capacity spillover.
#[derive(Debug, Parser)]
#[command(name = "multifs", version, about)]
struct Args {
    /// Where to mount the combined filesystem.
    mountpoint: PathBuf,

    /// Colon-separated backing directories, in spillover order.
    #[arg(long, value_delimiter = ':', required = true, value_name = "DIR[:DIR...]")]
    fss: Vec<PathBuf>,

    /// Byte quota applied to each backing directory.
    #[arg(long, value_name = "BYTES")]
    quota: Option<u64>,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,

    /// Allow access by users other than the mounting user.
    #[arg(long)]
    allow_other: bool,

    /// Print a JSON stats snapshot every N seconds.
    #[arg(long, value_name = "SECS")]
    stats: Option<u64>,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let filter: EnvFilter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.debug { "debug" } else { "info" }));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &args.log {
        Some(path) => {
            let file: File = File::create(path)
                .with_context(|| format!("log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Arc::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = Args::parse();
    init_logging(&args)?;

    let mountpoint: PathBuf = args
        .mountpoint
        .canonicalize()
        .with_context(|| format!("mountpoint {}", args.mountpoint.display()))?;

    let mut backends: Vec<Arc<dyn StorageBackend>> = Vec::new();
    for dir in &args.fss {
        let root: PathBuf = dir
            .canonicalize()
            .with_context(|| format!("backing directory {}", dir.display()))?;
        anyhow::ensure!(
            root != mountpoint,
            "backing directory {} is the mountpoint itself",
            root.display()
        );
        let backend: DirBackend = DirBackend::with_quota(root, args.quota)?;
        backends.push(Arc::new(backend));
    }

    let options: VfsOptions = VfsOptions {
        allow_other: args.allow_other,
        ..VfsOptions::default()
    };
    let vfs: MultiFs = MultiFs::new(backends, options)?;
    let stats: VfsStatsCollector = vfs.stats_collector();

    info!(
        mountpoint = %mountpoint.display(),
        backends = args.fss.len(),
        "mounting"
    );
    let session = spawn_mount(vfs, &mountpoint)
        .with_context(|| format!("mounting at {}", mountpoint.display()))?;

    if let Some(secs) = args.stats {
        // Collection bridges into the runtime via block_on, so this loop
        // must live on a plain thread rather than a runtime worker.
        std::thread::spawn(move || loop {
            std::thread::sleep(Duration::from_secs(secs.max(1)));
            match serde_json::to_string_pretty(&stats.collect()) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("stats serialization failed: {}", e),
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("unmounting");
    drop(session);
    Ok(())
}
