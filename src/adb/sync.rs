use crate::adb::connection::AdbConnection;
use crate::adb::protocol::{self, sync, FileStat, SyncHeader};
use crate::config::Config;
use crate::core::types::DeviceId;
use crate::error::{BridgeError, Result, SyncError};
use crate::files::{FileEntry, FileListingService, FileType};
use crate::progress::SyncProgressMonitor;
use log::*;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// A `sync:` session with one device.
///
/// Closed until [`open`](Self::open) succeeds; every transfer needs an open
/// session and fails with [`SyncError::SessionClosed`] otherwise. The session
/// owns its connection, which is dropped on [`close`](Self::close).
pub struct SyncService {
    config: Config,
    device: Option<DeviceId>,
    channel: Option<AdbConnection>,
}

impl SyncService {
    pub fn new(config: &Config, device: Option<DeviceId>) -> Self {
        Self {
            config: config.clone(),
            device,
            channel: None,
        }
    }

    /// Connect to the server and enter sync mode.
    ///
    /// `Ok(false)` when the daemon refuses the `sync:` service.
    pub fn open(&mut self) -> Result<bool> {
        let conn = AdbConnection::open(&self.config)?;
        self.open_on(conn)
    }

    /// Enter sync mode over an existing connection.
    pub fn open_on(&mut self, mut conn: AdbConnection) -> Result<bool> {
        self.close();

        conn.select_device(self.device.as_ref())?;
        conn.send_request("sync:")?;
        let response = conn.read_response(false)?;
        if !response.okay {
            warn!("Got unhappy response from ADB sync req: {}", response.message);
            return Ok(false);
        }

        self.channel = Some(conn);
        Ok(true)
    }

    pub fn close(&mut self) {
        if self.channel.take().is_some() {
            debug!("Sync session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    fn channel(&mut self) -> Result<&mut AdbConnection> {
        self.channel
            .as_mut()
            .ok_or_else(|| SyncError::SessionClosed.into())
    }

    /// Stat a remote path. `None` when the reply is not a STAT reply.
    pub fn stat(&mut self, path: &str) -> Result<Option<FileStat>> {
        let conn = self.channel()?;
        conn.write_all(&protocol::file_request(sync::STAT, path.as_bytes()))?;

        let mut reply = [0u8; sync::STAT_REPLY_SIZE];
        conn.read_exact(&mut reply)?;
        Ok(FileStat::from_reply(&reply))
    }

    /// Pull one remote file by path.
    ///
    /// A STAT reporting mode 0 fails with
    /// [`RemoteObjectMissing`](SyncError::RemoteObjectMissing); an unreadable
    /// STAT does not stop the attempt.
    pub fn pull_file(
        &mut self,
        remote: &str,
        local: &Path,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        check_remote_path(remote)?;

        let total = match self.stat(remote)? {
            None => 0,
            Some(stat) if !stat.exists() => return Err(SyncError::RemoteObjectMissing.into()),
            Some(stat) => u64::from(stat.size),
        };

        monitor.start(total);
        self.receive_file(remote, local, monitor)?;
        monitor.stop();
        Ok(())
    }

    /// Pull one listed file, sized from its listing instead of a STAT.
    pub fn pull_entry(
        &mut self,
        entry: &FileEntry,
        local: &Path,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        monitor.start(entry.size_value().unwrap_or(0));
        self.receive_file(&entry.path, local, monitor)?;
        monitor.stop();
        Ok(())
    }

    /// Push one local file to `remote`.
    pub fn push_file(
        &mut self,
        local: &Path,
        remote: &str,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        let metadata = fs::metadata(local).map_err(|_| SyncError::NoLocalFile)?;
        if metadata.is_dir() {
            return Err(SyncError::LocalIsDirectory.into());
        }

        monitor.start(metadata.len());
        self.send_file(local, remote, monitor)?;
        monitor.stop();
        Ok(())
    }

    /// Pull files and directories into the existing directory `local_dir`.
    ///
    /// Directories are re-created locally and walked through `listing`. The
    /// progress total is the byte size of every file plus one per directory.
    pub fn pull(
        &mut self,
        entries: &[FileEntry],
        local_dir: &Path,
        listing: &FileListingService,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        if !local_dir.exists() {
            return Err(SyncError::TargetMissing.into());
        }
        if !local_dir.is_dir() {
            return Err(SyncError::TargetIsFile.into());
        }

        let total = remote_weight(entries, listing);
        monitor.start(total);
        self.pull_entries(entries, local_dir, listing, monitor)?;
        monitor.stop();
        Ok(())
    }

    /// Push local files and directories under the remote directory
    /// `remote_dir`. Paths that do not exist are skipped.
    pub fn push(
        &mut self,
        local: &[PathBuf],
        remote_dir: &str,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        let total = local_weight(local);
        monitor.start(total);
        self.push_paths(local, remote_dir.trim_end_matches('/'), monitor)?;
        monitor.stop();
        Ok(())
    }

    /// [`push`](Self::push) into a listed remote directory.
    pub fn push_to_entry(
        &mut self,
        local: &[PathBuf],
        remote: &FileEntry,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        if !remote.is_directory() {
            return Err(SyncError::RemoteIsFile.into());
        }
        self.push(local, &remote.path, monitor)
    }

    fn pull_entries(
        &mut self,
        entries: &[FileEntry],
        local_dir: &Path,
        listing: &FileListingService,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        for entry in entries {
            if monitor.is_canceled() {
                return Err(SyncError::Cancelled.into());
            }

            let dest = local_dir.join(&entry.name);
            match entry.file_type {
                FileType::Directory | FileType::DirectoryLink => {
                    monitor.start_sub_task(&entry.path);
                    match fs::create_dir(&dest) {
                        Err(e) if e.kind() != io::ErrorKind::AlreadyExists => {
                            return Err(SyncError::local_io(&dest, e).into());
                        }
                        _ => {}
                    }

                    // Sized during the weight pass, so the cache is warm.
                    let children = listing
                        .get_children(entry, true, None)?
                        .unwrap_or_default();
                    self.pull_entries(&children, &dest, listing, monitor)?;
                    monitor.advance(1);
                }
                FileType::File => {
                    monitor.start_sub_task(&entry.path);
                    self.receive_file(&entry.path, &dest, monitor)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn push_paths(
        &mut self,
        paths: &[PathBuf],
        remote_dir: &str,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        for path in paths {
            if monitor.is_canceled() {
                return Err(SyncError::Cancelled.into());
            }

            let Ok(metadata) = fs::metadata(path) else {
                continue;
            };
            let Some(name) = path.file_name() else {
                continue;
            };
            let dest = format!("{}/{}", remote_dir, name.to_string_lossy());

            if metadata.is_dir() {
                monitor.start_sub_task(&dest);
                let children: Vec<PathBuf> = WalkDir::new(path)
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.into_path())
                    .collect();
                self.push_paths(&children, &dest, monitor)?;
                monitor.advance(1);
            } else if metadata.is_file() {
                monitor.start_sub_task(&dest);
                self.send_file(path, &dest, monitor)?;
            }
        }
        Ok(())
    }

    /// RECV `remote` into `local`. The monitor must already be started.
    fn receive_file(
        &mut self,
        remote: &str,
        local: &Path,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        let path = check_remote_path(remote)?;
        let conn = self.channel()?;

        conn.write_all(&protocol::file_request(sync::RECV, path))?;
        let mut header = read_header(conn)?;
        if !header.is(sync::DATA) && !header.is(sync::DONE) {
            return Err(protocol_error(conn, &header));
        }

        let mut file = File::create(local).map_err(|e| SyncError::local_io(local, e))?;
        let mut data = vec![0u8; sync::MAX_CHUNK];

        loop {
            if monitor.is_canceled() {
                return Err(SyncError::Cancelled.into());
            }

            if header.is(sync::DONE) {
                break;
            }
            if !header.is(sync::DATA) {
                return Err(protocol_error(conn, &header));
            }

            let length = header.length as usize;
            if length > sync::MAX_CHUNK {
                return Err(SyncError::BufferOverrun.into());
            }

            conn.read_exact(&mut data[..length])?;
            header = read_header(conn)?;

            file.write_all(&data[..length])
                .map_err(|e| SyncError::local_io(local, e))?;
            monitor.advance(length as u64);
        }

        file.flush().map_err(|e| SyncError::local_io(local, e))?;
        trace!("Pulled {} into {}", remote, local.display());
        Ok(())
    }

    /// SEND `local` to `remote`. The monitor must already be started.
    fn send_file(
        &mut self,
        local: &Path,
        remote: &str,
        monitor: &dyn SyncProgressMonitor,
    ) -> Result<()> {
        let path = check_remote_path(remote)?;
        let mut file = File::open(local).map_err(|e| SyncError::local_io(local, e))?;
        let mtime = file
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let conn = self.channel()?;
        conn.write_all(&protocol::send_file_request(
            path,
            sync::DEFAULT_MODE_SUFFIX,
        ))?;

        let mut buf = vec![0u8; sync::HEADER_SIZE + sync::MAX_CHUNK];
        buf[..4].copy_from_slice(sync::DATA);

        loop {
            if monitor.is_canceled() {
                return Err(SyncError::Cancelled.into());
            }

            let read = file
                .read(&mut buf[sync::HEADER_SIZE..])
                .map_err(|e| SyncError::local_io(local, e))?;
            if read == 0 {
                break;
            }

            buf[4..sync::HEADER_SIZE].copy_from_slice(&(read as u32).to_le_bytes());
            conn.write_all(&buf[..sync::HEADER_SIZE + read])?;
            monitor.advance(read as u64);
        }

        conn.write_all(&protocol::sync_request(sync::DONE, mtime))?;

        let result = read_header(conn)?;
        if !result.is(sync::OKAY) {
            return Err(protocol_error(conn, &result));
        }

        trace!("Pushed {} to {}", local.display(), remote);
        Ok(())
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .finish()
    }
}

fn check_remote_path(remote: &str) -> Result<&[u8]> {
    let path = remote.as_bytes();
    if path.len() > sync::MAX_PATH_LENGTH {
        return Err(SyncError::RemotePathTooLong.into());
    }
    Ok(path)
}

fn read_header(conn: &mut AdbConnection) -> Result<SyncHeader> {
    let mut header = [0u8; sync::HEADER_SIZE];
    conn.read_exact(&mut header)?;
    Ok(SyncHeader::parse(&header))
}

/// Build the protocol error for an unexpected header, reading the FAIL text
/// that follows it when there is one.
fn protocol_error(conn: &mut AdbConnection, header: &SyncHeader) -> BridgeError {
    match read_error_message(conn, header) {
        Ok(message) => SyncError::TransferProtocol(message).into(),
        Err(e) => e,
    }
}

fn read_error_message(conn: &mut AdbConnection, header: &SyncHeader) -> Result<Option<String>> {
    if !header.is(sync::FAIL) || header.length == 0 {
        debug!("Unexpected sync reply {}", header.tag_str());
        return Ok(None);
    }

    let length = (header.length as usize).min(sync::MAX_CHUNK);
    let mut message = vec![0u8; length];
    conn.read_exact(&mut message)?;

    let message = String::from_utf8_lossy(&message).into_owned();
    error!("transfer error: {}", message);
    Ok(Some(message))
}

/// Bytes of every remote file plus one per directory. Listing failures
/// count as empty directories.
fn remote_weight(entries: &[FileEntry], listing: &FileListingService) -> u64 {
    entries
        .iter()
        .map(|entry| match entry.file_type {
            FileType::Directory | FileType::DirectoryLink => {
                let children = listing
                    .get_children(entry, false, None)
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                remote_weight(&children, listing) + 1
            }
            FileType::File => entry.size_value().unwrap_or(0),
            _ => 0,
        })
        .sum()
}

/// Bytes of every local file plus one per directory, across whole trees.
fn local_weight(paths: &[PathBuf]) -> u64 {
    paths
        .iter()
        .flat_map(|path| WalkDir::new(path).into_iter().filter_map(|e| e.ok()))
        .map(|entry| {
            let file_type = entry.file_type();
            if file_type.is_dir() {
                1
            } else if file_type.is_file() {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            } else {
                0
            }
        })
        .sum()
}
