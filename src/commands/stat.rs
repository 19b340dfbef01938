use crate::adb::{AdbDevice, FileStat, SyncService};
use crate::commands::{blocking, formatter, SubCommand};
use crate::core::context::CommandContext;
use crate::error::{BridgeError, Result, SyncError};
use crate::output::StatInfo;
use async_trait::async_trait;

pub struct StatCommand;

#[derive(Debug, Clone, clap::Args)]
pub struct StatArgs {
    /// Remote path
    pub path: String,
}

impl StatCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StatCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// STAT `path`, treating mode 0 as a missing object.
pub fn stat_path(sync: &mut SyncService, path: &str) -> Result<FileStat> {
    match sync.stat(path)? {
        Some(stat) if stat.exists() => Ok(stat),
        Some(_) => Err(SyncError::RemoteObjectMissing.into()),
        None => Err(BridgeError::Protocol(format!("no STAT reply for {}", path))),
    }
}

pub(crate) fn open_sync(device: &AdbDevice) -> Result<SyncService> {
    device
        .sync_service()?
        .ok_or_else(|| BridgeError::CommandRejected("sync service unavailable".to_string()))
}

#[async_trait]
impl SubCommand for StatCommand {
    type Args = StatArgs;

    async fn run(&self, ctx: &CommandContext, args: Self::Args) -> Result<()> {
        let device = ctx.device.clone();
        let path = args.path.clone();
        let stat = blocking(move || {
            let mut sync = open_sync(&device)?;
            let result = stat_path(&mut sync, &path);
            sync.close();
            result
        })
        .await?;

        formatter(ctx).render(&[StatInfo::new(args.path, &stat)])
    }
}
