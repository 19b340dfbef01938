use crate::adb::shell::{ShellExecutor, ShellOutputReceiver};
use crate::error::{BridgeError, Result};
use crate::progress::SyncProgressMonitor;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// In-memory ADB peer: replays scripted reply bytes and records what the
/// client writes.
///
/// Once the script runs dry reads return EOF, or `WouldBlock` forever after
/// [`stall`](Self::stall).
pub struct ScriptedChannel {
    incoming: VecDeque<u8>,
    written: Arc<Mutex<Vec<u8>>>,
    stall: bool,
    max_read: usize,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self {
            incoming: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            stall: false,
            max_read: usize::MAX,
        }
    }

    pub fn reply(mut self, bytes: &[u8]) -> Self {
        self.incoming.extend(bytes);
        self
    }

    pub fn stall(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Hand out at most `n` bytes per read.
    pub fn trickle(mut self, n: usize) -> Self {
        self.max_read = n.max(1);
        self
    }

    /// Everything the client has written so far.
    pub fn written(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

impl Read for ScriptedChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.incoming.is_empty() {
            return if self.stall {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "stalled"))
            } else {
                Ok(0)
            };
        }

        let n = buf.len().min(self.incoming.len()).min(self.max_read);
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Shell double: answers commands with canned output and records them.
///
/// Tracks how many commands run at once so tests can assert the listing
/// worker never overlaps two of them.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    outputs: Arc<Mutex<HashMap<String, String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    commands: Arc<Mutex<Vec<String>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    delay: Duration,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(self, command: &str, output: &str) -> Self {
        self.outputs
            .lock()
            .insert(command.to_string(), output.to_string());
        self
    }

    /// Make `command` fail as rejected by the daemon.
    pub fn with_failure(self, command: &str, message: &str) -> Self {
        self.failures
            .lock()
            .insert(command.to_string(), message.to_string());
        self
    }

    /// Replace the output of `command` for subsequent runs.
    pub fn set_output(&self, command: &str, output: &str) {
        self.outputs
            .lock()
            .insert(command.to_string(), output.to_string());
    }

    pub fn set_failure(&self, command: &str, message: &str) {
        self.failures
            .lock()
            .insert(command.to_string(), message.to_string());
    }

    /// Hold every command open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl ShellExecutor for ScriptedShell {
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        _max_time_to_output: Duration,
    ) -> Result<()> {
        self.commands.lock().push(command.to_string());
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        let failure = self.failures.lock().get(command).cloned();
        let output = self.outputs.lock().get(command).cloned();

        let result = match failure {
            Some(message) => Err(BridgeError::CommandRejected(message)),
            None => {
                if let Some(output) = output {
                    receiver.add_output(output.as_bytes());
                }
                receiver.flush();
                Ok(())
            }
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A recorded progress callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Start(u64),
    Advance(u64),
    SubTask(String),
    Stop,
}

/// Progress monitor that records every call, optionally reporting
/// cancellation once a number of advances has been seen.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<ProgressEvent>>,
    cancel_after_advances: Option<usize>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_after(advances: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            cancel_after_advances: Some(advances),
        }
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn advances(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Advance(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    pub fn total(&self) -> Option<u64> {
        self.events.lock().iter().find_map(|e| match e {
            ProgressEvent::Start(n) => Some(*n),
            _ => None,
        })
    }
}

impl SyncProgressMonitor for RecordingMonitor {
    fn start(&self, total_work: u64) {
        self.events.lock().push(ProgressEvent::Start(total_work));
    }

    fn advance(&self, work: u64) {
        self.events.lock().push(ProgressEvent::Advance(work));
    }

    fn start_sub_task(&self, name: &str) {
        self.events
            .lock()
            .push(ProgressEvent::SubTask(name.to_string()));
    }

    fn stop(&self) {
        self.events.lock().push(ProgressEvent::Stop);
    }

    fn is_canceled(&self) -> bool {
        match self.cancel_after_advances {
            Some(limit) => self.advances().len() >= limit,
            None => false,
        }
    }
}
