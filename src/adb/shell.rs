use crate::adb::connection::{AdbConnection, ReadStatus};
use crate::config::Config;
use crate::core::types::DeviceId;
use crate::error::{BridgeError, Result};
use log::*;
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

/// Pause between read attempts while a shell command is silent.
const SHELL_POLL_INTERVAL: Duration = Duration::from_millis(25);
const SHELL_BUFFER_SIZE: usize = 16 * 1024;

/// Services that run a command on the device and stream its output back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdbService {
    /// `shell:` allocates a PTY-less shell; stderr is merged into stdout.
    Shell,
    /// `exec:` streams raw stdout, suitable for binary output and input.
    Exec,
}

impl AdbService {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdbService::Shell => "shell",
            AdbService::Exec => "exec",
        }
    }
}

/// Consumer of raw shell output.
pub trait ShellOutputReceiver: Send {
    /// Called with each chunk of bytes as it arrives.
    fn add_output(&mut self, data: &[u8]);

    /// Called once when the command reaches EOF.
    fn flush(&mut self);

    /// Polled before every read; returning true stops the command quietly.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Runs shell commands on one device.
pub trait ShellExecutor: Send + Sync {
    /// Run `command`, streaming its output to `receiver`.
    ///
    /// Fails with [`BridgeError::ShellUnresponsive`] when the command goes
    /// quiet for longer than `max_time_to_output`. Zero waits forever.
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_time_to_output: Duration,
    ) -> Result<()>;
}

/// Line-oriented consumer fed by [`MultiLineReceiver`].
pub trait LineProcessor: Send {
    fn process_new_lines(&mut self, lines: &[String]);

    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called after the last line has been delivered.
    fn done(&mut self) {}
}

/// Splits raw output into lines and hands complete lines to a [`LineProcessor`].
///
/// Lines may span chunk boundaries; `\r` is stripped. Whatever trails the last
/// newline is held back until more output arrives or the command ends.
pub struct MultiLineReceiver<P: LineProcessor> {
    processor: P,
    pending: Vec<u8>,
}

impl<P: LineProcessor> MultiLineReceiver<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            pending: Vec::new(),
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn into_inner(self) -> P {
        self.processor
    }
}

impl<P: LineProcessor> ShellOutputReceiver for MultiLineReceiver<P> {
    fn add_output(&mut self, data: &[u8]) {
        if self.processor.is_cancelled() {
            return;
        }

        self.pending.extend_from_slice(data);

        let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') else {
            return;
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        let lines: Vec<String> = complete[..last_newline]
            .split(|&b| b == b'\n')
            .map(decode_line)
            .collect();

        if !lines.is_empty() {
            self.processor.process_new_lines(&lines);
        }
    }

    fn flush(&mut self) {
        if !self.processor.is_cancelled() && !self.pending.is_empty() {
            let last = std::mem::take(&mut self.pending);
            self.processor.process_new_lines(&[decode_line(&last)]);
        }
        self.processor.done();
    }

    fn is_cancelled(&self) -> bool {
        self.processor.is_cancelled()
    }
}

/// Decode one complete line; multi-byte characters never straddle it.
fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Open a connection and run `command` on `device` through `service`.
pub fn execute_remote_command(
    config: &Config,
    service: AdbService,
    command: &str,
    device: Option<&DeviceId>,
    receiver: &mut dyn ShellOutputReceiver,
    max_time_to_output: Duration,
    input: Option<&mut dyn Read>,
) -> Result<()> {
    let mut conn = AdbConnection::open(config)?;
    run_remote_command(
        &mut conn,
        service,
        command,
        device,
        receiver,
        max_time_to_output,
        input,
    )
}

/// Run `command` over an already open connection.
///
/// `input`, when given, is streamed up after the service accepts the command
/// and before any output is read.
pub fn run_remote_command(
    conn: &mut AdbConnection,
    service: AdbService,
    command: &str,
    device: Option<&DeviceId>,
    receiver: &mut dyn ShellOutputReceiver,
    max_time_to_output: Duration,
    input: Option<&mut dyn Read>,
) -> Result<()> {
    trace!("execute: running {}", command);

    conn.select_device(device)?;

    conn.send_request(&format!("{}:{}", service.as_str(), command))?;
    let response = conn.read_response(false)?;
    if !response.okay {
        error!(
            "ADB rejected shell command ({}): {}",
            command, response.message
        );
        return Err(BridgeError::CommandRejected(response.message));
    }

    let mut buf = vec![0u8; SHELL_BUFFER_SIZE];

    if let Some(input) = input {
        loop {
            let read = input.read(&mut buf)?;
            if read == 0 {
                break;
            }
            conn.write_all(&buf[..read])?;
        }
    }

    let mut silent = Duration::ZERO;
    loop {
        if receiver.is_cancelled() {
            trace!("execute: cancelled");
            break;
        }

        let attempt = Instant::now();
        match conn.try_read(&mut buf)? {
            ReadStatus::Eof => {
                receiver.flush();
                trace!("execute '{}': EOF hit", command);
                break;
            }
            ReadStatus::Data(n) => {
                silent = Duration::ZERO;
                receiver.add_output(&buf[..n]);
            }
            ReadStatus::Idle => {
                let spent = attempt.elapsed();
                if spent < SHELL_POLL_INTERVAL {
                    thread::sleep(SHELL_POLL_INTERVAL - spent);
                }
                silent += spent.max(SHELL_POLL_INTERVAL);
                if !max_time_to_output.is_zero() && silent > max_time_to_output {
                    warn!("Shell command '{}' stopped producing output", command);
                    return Err(BridgeError::ShellUnresponsive);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChannel;

    #[derive(Default)]
    struct Lines {
        lines: Vec<String>,
        done: bool,
    }

    impl LineProcessor for Lines {
        fn process_new_lines(&mut self, lines: &[String]) {
            self.lines.extend_from_slice(lines);
        }

        fn done(&mut self) {
            self.done = true;
        }
    }

    fn connection(channel: ScriptedChannel) -> AdbConnection {
        AdbConnection::from_channel(channel, Duration::from_millis(200))
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut receiver = MultiLineReceiver::new(Lines::default());
        receiver.add_output(b"first li");
        receiver.add_output(b"ne\r\nsecond\nthi");
        receiver.flush();

        let lines = receiver.into_inner();
        assert_eq!(lines.lines, vec!["first line", "second", "thi"]);
        assert!(lines.done);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let row = "-rw-r--r-- root root 5 2021-01-01 00:00 caf\u{e9}.txt\n".as_bytes();
        let split = row.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut receiver = MultiLineReceiver::new(Lines::default());
        receiver.add_output(&row[..split]);
        receiver.add_output(&row[split..]);
        receiver.add_output("na\u{ef}".as_bytes().split_last().unwrap().1);
        receiver.add_output(&[0xAF, b'v', b'e']);
        receiver.flush();

        assert_eq!(
            receiver.processor().lines,
            vec![
                "-rw-r--r-- root root 5 2021-01-01 00:00 caf\u{e9}.txt",
                "na\u{ef}ve"
            ]
        );
    }

    #[test]
    fn test_no_partial_line_on_flush() {
        let mut receiver = MultiLineReceiver::new(Lines::default());
        receiver.add_output(b"only\n");
        receiver.flush();
        assert_eq!(receiver.processor().lines, vec!["only"]);
    }

    #[test]
    fn test_shell_output_streams_to_receiver() {
        let channel = ScriptedChannel::new()
            .reply(b"OKAY")
            .reply(b"OKAY")
            .reply(b"a.txt\nb.txt\n");
        let written = channel.written();
        let mut conn = connection(channel);
        let mut receiver = MultiLineReceiver::new(Lines::default());

        run_remote_command(
            &mut conn,
            AdbService::Shell,
            "ls /sdcard",
            Some(&DeviceId::new("abc")),
            &mut receiver,
            Duration::from_secs(1),
            None,
        )
        .unwrap();

        assert_eq!(receiver.processor().lines, vec!["a.txt", "b.txt"]);
        assert!(receiver.processor().done);
        let sent = String::from_utf8(written.lock().clone()).unwrap();
        assert_eq!(sent, "0012host:transport:abc0010shell:ls /sdcard");
    }

    #[test]
    fn test_exec_streams_input_before_output() {
        let channel = ScriptedChannel::new().reply(b"OKAY").reply(b"done\n");
        let written = channel.written();
        let mut conn = connection(channel);
        let mut receiver = MultiLineReceiver::new(Lines::default());
        let mut input: &[u8] = b"payload";

        run_remote_command(
            &mut conn,
            AdbService::Exec,
            "cat > /data/local/tmp/x",
            None,
            &mut receiver,
            Duration::ZERO,
            Some(&mut input),
        )
        .unwrap();

        let sent = written.lock().clone();
        assert!(sent.starts_with(b"001Cexec:cat > /data/local/tmp/x"));
        assert!(sent.ends_with(b"payload"));
        assert_eq!(receiver.processor().lines, vec!["done"]);
    }

    #[test]
    fn test_rejected_shell_command() {
        let channel = ScriptedChannel::new().reply(b"FAIL0006closed");
        let mut conn = connection(channel);
        let mut receiver = MultiLineReceiver::new(Lines::default());

        let err = run_remote_command(
            &mut conn,
            AdbService::Shell,
            "ls",
            None,
            &mut receiver,
            Duration::ZERO,
            None,
        )
        .unwrap_err();
        assert!(err.is_command_rejected());
        assert!(!err.is_device_selection_error());
    }

    #[test]
    fn test_silent_shell_is_unresponsive() {
        let channel = ScriptedChannel::new().reply(b"OKAY").reply(b"partial").stall();
        let mut conn = connection(channel);
        let mut receiver = MultiLineReceiver::new(Lines::default());

        let err = run_remote_command(
            &mut conn,
            AdbService::Shell,
            "sleep 100",
            None,
            &mut receiver,
            Duration::from_millis(60),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ShellUnresponsive));
    }

    #[test]
    fn test_cancelled_receiver_stops_without_error() {
        struct Cancelled;
        impl LineProcessor for Cancelled {
            fn process_new_lines(&mut self, _lines: &[String]) {
                panic!("no lines expected after cancellation");
            }
            fn is_cancelled(&self) -> bool {
                true
            }
        }

        let channel = ScriptedChannel::new().reply(b"OKAY").reply(b"x\n").stall();
        let mut conn = connection(channel);
        let mut receiver = MultiLineReceiver::new(Cancelled);

        run_remote_command(
            &mut conn,
            AdbService::Shell,
            "logcat",
            None,
            &mut receiver,
            Duration::ZERO,
            None,
        )
        .unwrap();
    }
}
