pub mod context;
pub mod types;

pub use context::CommandContext;
pub use types::{DeviceId, OutputFormat};
