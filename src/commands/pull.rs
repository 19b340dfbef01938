use crate::adb::SyncService;
use crate::commands::stat::open_sync;
use crate::commands::{
    blocking, cancel_on_interrupt, expand_local, formatter, transfer_monitor, SubCommand,
};
use crate::core::context::CommandContext;
use crate::error::{BridgeError, Result};
use crate::files::FileListingService;
use crate::output::TransferInfo;
use crate::progress::SyncProgressMonitor;
use async_trait::async_trait;
use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

pub struct PullCommand;

#[derive(Debug, Clone, clap::Args)]
pub struct PullArgs {
    /// Remote file(s) or directories on device to pull
    #[clap(required = true)]
    pub src: Vec<String>,

    /// Local destination: a directory, or a file name for a single remote file
    pub dst: String,
}

impl PullCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PullCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull `sources` to `dst`.
///
/// A single source pulled to anything but an existing directory is copied to
/// that exact file name. Otherwise every source is resolved through `listing`
/// and copied, recursively, into `dst`.
pub fn pull_paths(
    sync: &mut SyncService,
    listing: &FileListingService,
    sources: &[String],
    dst: &Path,
    monitor: &dyn SyncProgressMonitor,
) -> Result<()> {
    if let [source] = sources {
        if !dst.is_dir() {
            return sync.pull_file(source, dst, monitor);
        }
    }

    let mut entries = Vec::with_capacity(sources.len());
    for source in sources {
        let entry = listing.resolve(source)?.ok_or_else(|| {
            BridgeError::InvalidArgument(format!("{}: no such remote path", source))
        })?;
        entries.push(entry);
    }
    sync.pull(&entries, dst, listing, monitor)
}

#[async_trait]
impl SubCommand for PullCommand {
    type Args = PullArgs;

    async fn run(&self, ctx: &CommandContext, args: Self::Args) -> Result<()> {
        let dst = expand_local(&args.dst)?;
        let device = ctx.device.clone();
        let monitor = transfer_monitor(ctx);
        let interrupt = cancel_on_interrupt(&monitor);
        let started = Instant::now();

        info!("Pulling {:?} to {}", args.src, dst.display());
        let result = {
            let monitor = Arc::clone(&monitor);
            let sources = args.src.clone();
            let dst = dst.clone();
            blocking(move || {
                let mut sync = open_sync(&device)?;
                let listing = device.file_listing_service()?;
                let result = pull_paths(&mut sync, &listing, &sources, &dst, monitor.as_ref());
                sync.close();
                result
            })
            .await
        };
        interrupt.abort();
        result?;

        let summary = TransferInfo::new(args.src.join(" "), dst.display().to_string())
            .with_bytes(monitor.transferred())
            .with_seconds(started.elapsed().as_secs_f64());
        formatter(ctx).render(&[summary])
    }
}
