use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the bridge transport and the engines built on it.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No progress was made on the connection within the configured timeout.
    #[error("Timed out waiting for the ADB server")]
    Timeout,

    #[error("ADB connection closed by peer")]
    ConnectionClosed,

    #[error("ADB connection error: {0}")]
    Io(#[from] io::Error),

    #[error("ADB rejected the command: {0}")]
    CommandRejected(String),

    /// The `host:transport:<serial>` preamble was refused, usually because the
    /// device went offline.
    #[error("ADB rejected device selection: {0}")]
    DeviceSelectionRejected(String),

    #[error("Shell command produced no output within the allowed time")]
    ShellUnresponsive,

    #[error("Unexpected reply from ADB server: {0}")]
    Protocol(String),

    #[error("Request of {0} bytes does not fit a 4-digit length prefix")]
    RequestTooLong(usize),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Too many file listings are already queued")]
    ListingBacklog,
}

impl BridgeError {
    /// True for any FAIL returned at the service-request level, including
    /// a refusal during device selection.
    pub fn is_command_rejected(&self) -> bool {
        matches!(
            self,
            BridgeError::CommandRejected(_) | BridgeError::DeviceSelectionRejected(_)
        )
    }

    pub fn is_device_selection_error(&self) -> bool {
        matches!(self, BridgeError::DeviceSelectionRejected(_))
    }

    /// Returns the sync failure kind, if this error came from the sync engine.
    pub fn sync_error(&self) -> Option<&SyncError> {
        match self {
            BridgeError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

/// Failures specific to a sync session.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Operation was canceled by the user")]
    Cancelled,

    #[error("Remote path is too long")]
    RemotePathTooLong,

    #[error("{}", .0.as_deref().unwrap_or("Adb transfer protocol error"))]
    TransferProtocol(Option<String>),

    #[error("Buffer overrun: device sent a chunk larger than the transfer buffer")]
    BufferOverrun,

    #[error("Local file error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Target directory does not exist")]
    TargetMissing,

    #[error("Target path is not a directory")]
    TargetIsFile,

    #[error("Remote object doesn't exist")]
    RemoteObjectMissing,

    #[error("Local file doesn't exist")]
    NoLocalFile,

    #[error("Local path is a directory")]
    LocalIsDirectory,

    #[error("Remote path is a file")]
    RemoteIsFile,

    #[error("Sync session is not open")]
    SessionClosed,
}

impl SyncError {
    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SyncError::LocalIo {
            path: path.into(),
            source,
        }
    }
}
