use crate::adb::shell::{LineProcessor, MultiLineReceiver, ShellExecutor};
use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::files::entry::{EntryId, FileEntry, FileTree, ListingRow, FILE_SEPARATOR};
use crate::files::ls_receiver::{finish_links, LsReceiver};
use lazy_static::lazy_static;
use log::*;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

const PM_LIST_PACKAGES: &str = "pm list packages -f";

/// Asynchronous listings that may wait behind the one being run.
pub const LISTING_QUEUE_DEPTH: usize = 64;

lazy_static! {
    static ref PM_PATTERN: Regex = Regex::new(r"^package:(.+?)=(.+)$").unwrap();
}

/// Callbacks for asynchronous listings.
pub trait ListingReceiver: Send + Sync {
    /// Fresh children of `entry`, in name order.
    fn set_children(&self, entry: &FileEntry, children: &[FileEntry]);

    /// `entry` changed after its listing was delivered, e.g. its package name
    /// became known.
    fn refresh_entry(&self, entry: &FileEntry);

    /// The listing of `entry` failed. The cached children are left as they
    /// were.
    fn listing_failed(&self, _entry: &FileEntry, _error: &BridgeError) {}
}

struct ListingJob {
    entry: EntryId,
    receiver: Arc<dyn ListingReceiver>,
}

struct Lister {
    shell: Arc<dyn ShellExecutor>,
    tree: Arc<Mutex<FileTree>>,
    shell_timeout: Duration,
}

impl Lister {
    /// Run `ls -l` for `id`, merge the rows into the tree and return the
    /// new children.
    ///
    /// The fetch time is stamped whether or not the command succeeds; on
    /// failure the previous children stay in place.
    fn list(&self, id: EntryId) -> Result<Vec<FileEntry>> {
        let (escaped_path, is_directory) = {
            let tree = self.tree.lock();
            if !tree.contains(id) {
                return Err(BridgeError::InvalidArgument(format!(
                    "unknown entry {:?}",
                    id
                )));
            }
            (
                tree.full_escaped_path(id),
                tree.file_type(id).is_some_and(|t| t.is_directory()),
            )
        };

        let mut command = format!("ls -l {}", escaped_path);
        if is_directory {
            command.push_str(FILE_SEPARATOR);
        }
        debug!("Listing {}", command);

        let result = self.run_ls(&command, &escaped_path);

        let mut tree = self.tree.lock();
        tree.mark_fetched(id, Instant::now());
        let rows = result?;
        tree.merge_children(id, rows);
        Ok(tree.cached_children(id))
    }

    fn run_ls(&self, command: &str, escaped_path: &str) -> Result<Vec<ListingRow>> {
        let mut receiver = MultiLineReceiver::new(LsReceiver::new());
        self.shell
            .execute_shell_command(command, &mut receiver, self.shell_timeout)?;

        let mut rows = receiver.into_inner().into_rows();
        finish_links(self.shell.as_ref(), escaped_path, &mut rows, self.shell_timeout)?;
        Ok(rows)
    }

    fn run_job(&self, job: ListingJob) {
        let Some(entry) = self.tree.lock().snapshot(job.entry) else {
            return;
        };

        match self.list(job.entry) {
            Ok(children) => {
                job.receiver.set_children(&entry, &children);

                if children.first().is_some_and(|c| c.is_app_package) {
                    self.refresh_packages(&children, Arc::clone(&job.receiver));
                }
            }
            Err(e) => {
                warn!("Failed to list {}: {}", entry.path, e);
                job.receiver.listing_failed(&entry, &e);
            }
        }
    }

    /// Map installed APK paths to package names and report each match.
    fn refresh_packages(&self, children: &[FileEntry], receiver: Arc<dyn ListingReceiver>) {
        let by_path = children
            .iter()
            .map(|c| (c.path.clone(), c.id))
            .collect::<HashMap<_, _>>();

        let mut pm = MultiLineReceiver::new(PackageReceiver {
            by_path,
            tree: Arc::clone(&self.tree),
            receiver,
        });

        if let Err(e) = self
            .shell
            .execute_shell_command(PM_LIST_PACKAGES, &mut pm, self.shell_timeout)
        {
            debug!("Package lookup failed: {}", e);
        }
    }
}

/// Consumes `pm list packages -f` and tags matching entries with their
/// package name.
struct PackageReceiver {
    by_path: HashMap<String, EntryId>,
    tree: Arc<Mutex<FileTree>>,
    receiver: Arc<dyn ListingReceiver>,
}

impl LineProcessor for PackageReceiver {
    fn process_new_lines(&mut self, lines: &[String]) {
        let refreshed: Vec<FileEntry> = {
            let mut tree = self.tree.lock();
            lines
                .iter()
                .filter_map(|line| PM_PATTERN.captures(line))
                .filter_map(|caps| {
                    let id = *self.by_path.get(&caps[1])?;
                    tree.set_info(id, &caps[2]);
                    tree.snapshot(id)
                })
                .collect()
        };

        for entry in &refreshed {
            trace!("{} is {:?}", entry.path, entry.info);
            self.receiver.refresh_entry(entry);
        }
    }
}

/// Lazily mirrors the device filesystem by running `ls` over the shell.
///
/// Asynchronous listings go through a single worker thread, so at most one
/// of them talks to the device at a time and they complete in the order
/// they were requested.
pub struct FileListingService {
    lister: Arc<Lister>,
    jobs: mpsc::Sender<ListingJob>,
    staleness: Duration,
}

impl FileListingService {
    pub fn new(shell: Arc<dyn ShellExecutor>, config: &Config) -> Result<Self> {
        Self::with_queue_depth(shell, config, LISTING_QUEUE_DEPTH)
    }

    pub(crate) fn with_queue_depth(
        shell: Arc<dyn ShellExecutor>,
        config: &Config,
        depth: usize,
    ) -> Result<Self> {
        let lister = Arc::new(Lister {
            shell,
            tree: Arc::new(Mutex::new(FileTree::new())),
            shell_timeout: config.shell_timeout(),
        });

        let (jobs, mut queue) = mpsc::channel::<ListingJob>(depth);
        let worker = Arc::clone(&lister);
        thread::Builder::new()
            .name("file-listing".to_string())
            .spawn(move || {
                while let Some(job) = queue.blocking_recv() {
                    worker.run_job(job);
                }
                trace!("file listing worker exiting");
            })?;

        Ok(Self {
            lister,
            jobs,
            staleness: config.refresh_rate() * 4 / 5,
        })
    }

    /// The `/` entry.
    pub fn get_root(&self) -> FileEntry {
        self.lister.tree.lock().root_entry()
    }

    /// Children of `entry`.
    ///
    /// With `use_cache`, children fetched within the staleness window are
    /// returned without touching the device. Otherwise, without a receiver
    /// the listing runs here and its errors propagate; with one, the listing
    /// is queued, `Ok(None)` comes back at once and the receiver is called
    /// when it completes. A full queue fails with `ListingBacklog`.
    pub fn get_children(
        &self,
        entry: &FileEntry,
        use_cache: bool,
        receiver: Option<Arc<dyn ListingReceiver>>,
    ) -> Result<Option<Vec<FileEntry>>> {
        if use_cache {
            let tree = self.lister.tree.lock();
            if !tree.needs_fetch(entry.id, self.staleness) {
                return Ok(Some(tree.cached_children(entry.id)));
            }
        }

        match receiver {
            None => self.lister.list(entry.id).map(Some),
            Some(receiver) => {
                let job = ListingJob {
                    entry: entry.id,
                    receiver,
                };
                // Never waits: receivers may queue listings from the worker.
                match self.jobs.try_send(job) {
                    Ok(()) => Ok(None),
                    Err(TrySendError::Full(_)) => Err(BridgeError::ListingBacklog),
                    Err(TrySendError::Closed(_)) => {
                        error!("File listing worker is gone");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// List `entry` now, bypassing the cache.
    pub fn get_children_sync(&self, entry: &FileEntry) -> Result<Vec<FileEntry>> {
        self.lister.list(entry.id)
    }

    /// Whatever children are cached, without any I/O.
    pub fn cached_children(&self, entry: &FileEntry) -> Vec<FileEntry> {
        self.lister.tree.lock().cached_children(entry.id)
    }

    /// Current state of the entry behind `id`.
    pub fn entry(&self, id: EntryId) -> Option<FileEntry> {
        self.lister.tree.lock().snapshot(id)
    }

    pub fn parent(&self, entry: &FileEntry) -> Option<FileEntry> {
        let tree = self.lister.tree.lock();
        tree.parent(entry.id).and_then(|p| tree.snapshot(p))
    }

    /// Walk `path` from the root, listing directories as needed.
    ///
    /// `Ok(None)` when some segment does not exist.
    pub fn resolve(&self, path: &str) -> Result<Option<FileEntry>> {
        let mut current = self.get_root();

        for segment in path.split(FILE_SEPARATOR).filter(|s| !s.is_empty()) {
            let children = self.get_children(&current, true, None)?.unwrap_or_default();
            match children.into_iter().find(|c| c.name == segment) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }
}
