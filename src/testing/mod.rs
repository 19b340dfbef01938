pub mod fixtures;
pub mod mocks;

pub use mocks::{ProgressEvent, RecordingMonitor, ScriptedChannel, ScriptedShell};
