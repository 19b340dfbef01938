use crate::adb::AdbDevice;
use crate::config::Config;
use crate::core::types::{DeviceId, OutputFormat};

/// Shared context for all commands
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: Config,
    pub device: AdbDevice,
    pub output_format: OutputFormat,
    pub quiet: bool,
}

impl CommandContext {
    pub fn new(config: Config, serial: Option<DeviceId>) -> Self {
        let device = AdbDevice::new(&config, serial);
        Self {
            config,
            device,
            output_format: OutputFormat::Table,
            quiet: false,
        }
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Check if progress/status messages should be shown
    /// Returns false if quiet mode is enabled or output format is JSON
    pub fn should_show_progress(&self) -> bool {
        !self.quiet && self.output_format != OutputFormat::Json
    }
}
