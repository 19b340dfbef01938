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
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct PushCommand;

#[derive(Debug, Clone, clap::Args)]
pub struct PushArgs {
    /// Local file(s) or directories to push
    #[clap(required = true)]
    pub src: Vec<String>,

    /// Remote destination: a directory, or a file path for a single local file
    pub dst: String,
}

impl PushCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PushCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Push `sources` to `dst`.
///
/// An existing remote directory receives every source recursively. A single
/// local file may instead target a remote file path, existing or not.
pub fn push_paths(
    sync: &mut SyncService,
    listing: &FileListingService,
    sources: &[PathBuf],
    dst: &str,
    monitor: &dyn SyncProgressMonitor,
) -> Result<()> {
    let target = listing.resolve(dst)?;

    match (target, sources) {
        (Some(entry), _) if entry.is_directory() => sync.push_to_entry(sources, &entry, monitor),
        (_, [source]) if !source.is_dir() => sync.push_file(source, dst, monitor),
        (Some(entry), _) => sync.push_to_entry(sources, &entry, monitor),
        (None, _) => Err(BridgeError::InvalidArgument(format!(
            "{}: remote directory does not exist",
            dst
        ))),
    }
}

#[async_trait]
impl SubCommand for PushCommand {
    type Args = PushArgs;

    async fn run(&self, ctx: &CommandContext, args: Self::Args) -> Result<()> {
        let sources = args
            .src
            .iter()
            .map(|s| expand_local(s))
            .collect::<Result<Vec<_>>>()?;
        let device = ctx.device.clone();
        let monitor = transfer_monitor(ctx);
        let interrupt = cancel_on_interrupt(&monitor);
        let started = Instant::now();

        info!("Pushing {:?} to {}", sources, args.dst);
        let result = {
            let monitor = Arc::clone(&monitor);
            let dst = args.dst.clone();
            blocking(move || {
                let mut sync = open_sync(&device)?;
                let listing = device.file_listing_service()?;
                let result = push_paths(&mut sync, &listing, &sources, &dst, monitor.as_ref());
                sync.close();
                result
            })
            .await
        };
        interrupt.abort();
        result?;

        let summary = TransferInfo::new(args.src.join(" "), args.dst)
            .with_bytes(monitor.transferred())
            .with_seconds(started.elapsed().as_secs_f64());
        formatter(ctx).render(&[summary])
    }
}
