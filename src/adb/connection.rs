use crate::adb::protocol::{self, latin1_decode};
use crate::config::Config;
use crate::core::types::DeviceId;
use crate::error::{BridgeError, Result};
use log::*;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

/// How long a single blocking attempt on the socket may take before the
/// deadline loop re-checks its budget.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Anything that can carry the ADB byte stream.
pub trait Channel: Read + Write + Send {}

impl<T: Read + Write + Send> Channel for T {}

/// Status reply to a service request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdbResponse {
    pub okay: bool,
    /// Diagnostic text. Empty when none was sent or it could not be read.
    pub message: String,
}

/// Outcome of a single non-blocking read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Data(usize),
    Idle,
    Eof,
}

/// A connection to the ADB server, owned by one logical operation.
///
/// Every read and write runs a deadline loop: attempts that move no bytes
/// accumulate idle time, progress resets it, and once the idle time exceeds
/// the configured timeout the operation fails with [`BridgeError::Timeout`].
/// A zero timeout waits forever. EOF is reported as
/// [`BridgeError::ConnectionClosed`].
pub struct AdbConnection {
    stream: Box<dyn Channel>,
    timeout: Duration,
    device_id: Option<DeviceId>,
}

impl AdbConnection {
    /// Connect to the ADB server described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        debug!("=== Creating new ADB connection ===");

        let stream = Self::establish_connection(config)?;

        Ok(Self {
            stream: Box::new(stream),
            timeout: config.timeout(),
            device_id: None,
        })
    }

    /// Wrap an already connected channel.
    pub fn from_channel(channel: impl Channel + 'static, timeout: Duration) -> Self {
        Self {
            stream: Box::new(channel),
            timeout,
            device_id: None,
        }
    }

    fn establish_connection(config: &Config) -> Result<TcpStream> {
        let server_address = config.server_address();
        debug!("Connecting to address: {}", server_address);

        let address = server_address.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not resolve address")
        })?;

        debug!("Resolved address: {:?}", address);

        let stream = if config.timeout().is_zero() {
            TcpStream::connect(address)?
        } else {
            TcpStream::connect_timeout(&address, config.timeout())?
        };
        debug!("Connection established");

        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        stream.set_write_timeout(Some(POLL_INTERVAL))?;

        Ok(stream)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Route the rest of this connection to `device`. `None` leaves the
    /// server to pick, and sends nothing.
    pub fn select_device(&mut self, device: Option<&DeviceId>) -> Result<()> {
        let Some(device_id) = device else {
            return Ok(());
        };

        self.send_request(&format!("host:transport:{}", device_id.as_str()))?;
        let response = self.read_response(false)?;
        if !response.okay {
            warn!(
                "ADB rejected device selection for {}: {}",
                device_id, response.message
            );
            return Err(BridgeError::DeviceSelectionRejected(response.message));
        }

        self.device_id = Some(device_id.clone());
        Ok(())
    }

    /// Frame and send a service request.
    pub fn send_request(&mut self, payload: &str) -> Result<()> {
        debug!("Sending request: {}", payload);
        let request = protocol::format_request(payload)?;
        self.write_all(&request)
    }

    /// Send a request and require an OKAY reply.
    pub fn request_okay(&mut self, payload: &str) -> Result<()> {
        self.send_request(payload)?;
        let response = self.read_response(false)?;
        if !response.okay {
            error!("ADB rejected {}: {}", payload, response.message);
            return Err(BridgeError::CommandRejected(response.message));
        }
        Ok(())
    }

    /// Read a status reply.
    ///
    /// A non-OKAY status is always followed by a diagnostic string; with
    /// `read_diag` an OKAY status is too. Failures while reading the
    /// diagnostic leave the message empty.
    pub fn read_response(&mut self, read_diag: bool) -> Result<AdbResponse> {
        let mut status = [0u8; 4];
        self.read_exact(&mut status)?;

        let okay = protocol::is_okay(&status);
        let mut response = AdbResponse {
            okay,
            message: String::new(),
        };

        if read_diag || !okay {
            match self.read_diagnostic() {
                Ok(Some(message)) => {
                    trace!(
                        "Got reply '{}', diag='{}'",
                        latin1_decode(&status),
                        message
                    );
                    response.message = message;
                }
                Ok(None) => {
                    warn!("Reply was {}", latin1_decode(&status));
                }
                Err(e) => debug!("Could not read diagnostic string: {}", e),
            }
        }

        Ok(response)
    }

    /// `<4 hex digits><text>`. `Ok(None)` when the length field is not hex.
    fn read_diagnostic(&mut self) -> Result<Option<String>> {
        let mut length_field = [0u8; 4];
        self.read_exact(&mut length_field)?;

        let Some(length) = protocol::parse_frame_length(&length_field) else {
            warn!("Expected digits, got {:?}", length_field);
            return Ok(None);
        };

        let mut message = vec![0u8; length];
        self.read_exact(&mut message)?;
        Ok(Some(latin1_decode(&message)))
    }

    /// Write the whole buffer or fail.
    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        let mut idle = IdleClock::new(self.timeout);

        while written < buf.len() {
            let attempt = Instant::now();
            match self.stream.write(&buf[written..]) {
                Ok(0) => {
                    debug!("write: channel EOF");
                    return Err(BridgeError::ConnectionClosed);
                }
                Ok(n) => {
                    written += n;
                    idle.reset();
                }
                Err(e) if is_idle(&e) => idle.wait(attempt, "write")?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.stream.flush()?;
        Ok(())
    }

    /// Fill the whole buffer or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        let mut idle = IdleClock::new(self.timeout);

        while filled < buf.len() {
            let attempt = Instant::now();
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {
                    debug!("read: channel EOF");
                    return Err(BridgeError::ConnectionClosed);
                }
                Ok(n) => {
                    filled += n;
                    idle.reset();
                }
                Err(e) if is_idle(&e) => idle.wait(attempt, "read")?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// One read attempt, for streaming loops that keep their own clock.
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        loop {
            match self.stream.read(buf) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => return Ok(ReadStatus::Data(n)),
                Err(e) if is_idle(&e) => return Ok(ReadStatus::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Check if a device is selected
    pub fn has_device(&self) -> bool {
        self.device_id.is_some()
    }

    /// Get the selected device ID
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }
}

impl std::fmt::Debug for AdbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdbConnection")
            .field("timeout", &self.timeout)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Idle time accumulated since the last attempt that moved bytes.
struct IdleClock {
    timeout: Duration,
    idle: Duration,
}

impl IdleClock {
    fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            idle: Duration::ZERO,
        }
    }

    fn reset(&mut self) {
        self.idle = Duration::ZERO;
    }

    /// Account for an attempt that moved nothing. Channels that return
    /// immediately are paced to one attempt per poll interval.
    fn wait(&mut self, attempt: Instant, op: &str) -> Result<()> {
        if !self.timeout.is_zero() && self.idle > self.timeout {
            debug!("{}: timeout", op);
            return Err(BridgeError::Timeout);
        }

        let spent = attempt.elapsed();
        if spent < POLL_INTERVAL {
            thread::sleep(POLL_INTERVAL - spent);
        }
        self.idle += spent.max(POLL_INTERVAL);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChannel;

    fn connection(channel: ScriptedChannel) -> AdbConnection {
        AdbConnection::from_channel(channel, Duration::from_millis(50))
    }

    #[test]
    fn test_read_response_okay() {
        let mut conn = connection(ScriptedChannel::new().reply(b"OKAY"));
        let response = conn.read_response(false).unwrap();
        assert!(response.okay);
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_read_response_fail_carries_message() {
        let mut conn = connection(ScriptedChannel::new().reply(b"FAIL0004boom"));
        let response = conn.read_response(false).unwrap();
        assert!(!response.okay);
        assert_eq!(response.message, "boom");
    }

    #[test]
    fn test_read_response_okay_with_diagnostic() {
        let mut conn = connection(ScriptedChannel::new().reply(b"OKAY0003abc"));
        let response = conn.read_response(true).unwrap();
        assert!(response.okay);
        assert_eq!(response.message, "abc");
    }

    #[test]
    fn test_malformed_diagnostic_length_means_no_message() {
        let mut conn = connection(ScriptedChannel::new().reply(b"FAILzzzz"));
        let response = conn.read_response(false).unwrap();
        assert!(!response.okay);
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_truncated_diagnostic_is_swallowed() {
        let mut conn = connection(ScriptedChannel::new().reply(b"FAIL0010shor"));
        let response = conn.read_response(false).unwrap();
        assert!(!response.okay);
        assert!(response.message.is_empty());
    }

    #[test]
    fn test_eof_is_connection_closed() {
        let mut conn = connection(ScriptedChannel::new().reply(b"OK"));
        let mut buf = [0u8; 4];
        let err = conn.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, BridgeError::ConnectionClosed));
    }

    #[test]
    fn test_stalled_peer_times_out() {
        let mut conn = connection(ScriptedChannel::new().reply(b"OK").stall());
        let mut buf = [0u8; 4];
        let started = Instant::now();
        let err = conn.read_exact(&mut buf).unwrap_err();
        assert!(matches!(err, BridgeError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_send_request_frames_payload() {
        let channel = ScriptedChannel::new();
        let written = channel.written();
        let mut conn = connection(channel);
        conn.send_request("host:version").unwrap();
        assert_eq!(written.lock().as_slice(), b"000Chost:version");
    }

    #[test]
    fn test_select_device_sends_transport_preamble() {
        let channel = ScriptedChannel::new().reply(b"OKAY");
        let written = channel.written();
        let mut conn = connection(channel);

        conn.select_device(Some(&DeviceId::new("emulator-5554")))
            .unwrap();

        assert_eq!(
            written.lock().as_slice(),
            b"001Chost:transport:emulator-5554"
        );
        assert!(conn.has_device());
    }

    #[test]
    fn test_select_device_rejection_is_flagged() {
        let channel = ScriptedChannel::new().reply(b"FAIL0010device not found");
        let mut conn = connection(channel);

        let err = conn
            .select_device(Some(&DeviceId::new("abc")))
            .unwrap_err();
        assert!(err.is_device_selection_error());
        assert!(format!("{}", err).contains("device not found"));
        assert!(!conn.has_device());
    }

    #[test]
    fn test_no_device_selects_nothing() {
        let channel = ScriptedChannel::new();
        let written = channel.written();
        let mut conn = connection(channel);
        conn.select_device(None).unwrap();
        assert!(written.lock().is_empty());
    }

    #[test]
    fn test_request_okay_rejection() {
        let mut conn = connection(ScriptedChannel::new().reply(b"FAIL0006closed"));
        let err = conn.request_okay("sync:").unwrap_err();
        assert!(matches!(err, BridgeError::CommandRejected(ref m) if m == "closed"));
    }
}
