pub mod connection;
pub mod device;
pub mod host;
pub mod protocol;
pub mod shell;
pub mod sync;


pub use connection::{AdbConnection, AdbResponse};
pub use device::AdbDevice;
pub use protocol::FileStat;
pub use shell::{LineProcessor, MultiLineReceiver, ShellExecutor, ShellOutputReceiver};
pub use sync::SyncService;
