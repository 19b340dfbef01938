use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Progress and cancellation hooks for sync transfers.
///
/// The engine calls [`start`](Self::start) once with the total weight of the
/// operation, [`advance`](Self::advance) as bytes move, and polls
/// [`is_canceled`](Self::is_canceled) before every chunk and every entry.
pub trait SyncProgressMonitor: Send + Sync {
    fn start(&self, total_work: u64);
    fn advance(&self, work: u64);
    fn start_sub_task(&self, name: &str);
    fn stop(&self);
    fn is_canceled(&self) -> bool;
}

/// Monitor for callers indifferent to progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressMonitor;

impl SyncProgressMonitor for NullProgressMonitor {
    fn start(&self, _total_work: u64) {}
    fn advance(&self, _work: u64) {}
    fn start_sub_task(&self, _name: &str) {}
    fn stop(&self) {}
    fn is_canceled(&self) -> bool {
        false
    }
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Terminal progress bar. Cancellation is driven by the shared flag, which a
/// signal handler can set.
pub struct IndicatifMonitor {
    bar: ProgressBar,
    cancel: Arc<AtomicBool>,
}

impl IndicatifMonitor {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
            bar.set_style(style.progress_chars("#>-"));
        }

        Self {
            bar,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A monitor that draws nothing but still honours cancellation.
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Work reported through [`advance`](SyncProgressMonitor::advance) since
    /// the last start.
    pub fn transferred(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for IndicatifMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProgressMonitor for IndicatifMonitor {
    fn start(&self, total_work: u64) {
        self.bar.set_length(total_work);
        self.bar.set_position(0);
    }

    fn advance(&self, work: u64) {
        self.bar.inc(work);
    }

    fn start_sub_task(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn stop(&self) {
        if self.is_canceled() {
            self.bar.abandon_with_message("Canceled");
        } else {
            self.bar.finish_with_message("Complete");
        }
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}
