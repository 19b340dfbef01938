use crate::core::context::CommandContext;
use crate::error::{BridgeError, Result};
use crate::output::OutputFormatter;
use crate::progress::IndicatifMonitor;
use async_trait::async_trait;
use log::debug;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod ls;
pub mod pull;
pub mod push;
pub mod stat;
pub mod version;

/// Base trait for all subcommands
#[async_trait]
pub trait SubCommand {
    type Args;

    async fn run(&self, ctx: &CommandContext, args: Self::Args) -> Result<()>;
}

/// Run blocking bridge work off the async runtime.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BridgeError::Io(io::Error::other(e)))?
}

pub fn formatter(ctx: &CommandContext) -> OutputFormatter {
    OutputFormatter::new(ctx.output_format).with_quiet(ctx.quiet)
}

/// A progress bar that is hidden when output must stay machine readable.
pub fn transfer_monitor(ctx: &CommandContext) -> Arc<IndicatifMonitor> {
    Arc::new(if ctx.should_show_progress() {
        IndicatifMonitor::new()
    } else {
        IndicatifMonitor::hidden()
    })
}

/// Cancel the transfer driven by `monitor` on Ctrl-C. Abort the handle once
/// the transfer is over.
pub fn cancel_on_interrupt(monitor: &IndicatifMonitor) -> JoinHandle<()> {
    let cancel = monitor.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, canceling transfer");
            cancel.store(true, Ordering::Relaxed);
        }
    })
}

/// Expand `~` and environment variables in a local path.
pub fn expand_local(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| BridgeError::InvalidArgument(format!("{}: {}", path, e)))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
