use crate::adb::connection::AdbConnection;
use crate::adb::host;
use crate::adb::shell::{execute_remote_command, AdbService, ShellExecutor, ShellOutputReceiver};
use crate::adb::sync::SyncService;
use crate::config::Config;
use crate::core::types::DeviceId;
use crate::error::Result;
use crate::files::FileListingService;
use log::*;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

/// One device reachable through the ADB server.
///
/// Without a serial the server picks the only attached device.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    config: Config,
    serial: Option<DeviceId>,
}

impl AdbDevice {
    pub fn new(config: &Config, serial: Option<DeviceId>) -> Self {
        Self {
            config: config.clone(),
            serial,
        }
    }

    pub fn serial(&self) -> Option<&DeviceId> {
        self.serial.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open a sync session. `Ok(None)` when the device refuses sync.
    pub fn sync_service(&self) -> Result<Option<SyncService>> {
        let mut service = SyncService::new(&self.config, self.serial.clone());
        if service.open()? {
            Ok(Some(service))
        } else {
            warn!("Sync service refused by {}", self.describe());
            Ok(None)
        }
    }

    /// A listing service that runs its `ls` commands on this device.
    pub fn file_listing_service(&self) -> Result<FileListingService> {
        FileListingService::new(Arc::new(self.clone()), &self.config)
    }

    /// Run `command` through `exec:`, feeding it `input`.
    pub fn execute_with_input(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        input: &mut dyn Read,
    ) -> Result<()> {
        execute_remote_command(
            &self.config,
            AdbService::Exec,
            command,
            self.serial.as_ref(),
            receiver,
            self.config.shell_timeout(),
            Some(input),
        )
    }

    pub fn create_forward(&self, local: &str, remote: &str) -> Result<()> {
        let mut conn = AdbConnection::open(&self.config)?;
        host::create_forward(&mut conn, self.serial.as_ref(), local, remote)
    }

    pub fn remove_forward(&self, local: &str) -> Result<()> {
        let mut conn = AdbConnection::open(&self.config)?;
        host::remove_forward(&mut conn, self.serial.as_ref(), local)
    }

    pub fn reboot(&self, into: Option<&str>) -> Result<()> {
        let mut conn = AdbConnection::open(&self.config)?;
        host::reboot(&mut conn, self.serial.as_ref(), into)
    }

    fn describe(&self) -> &str {
        self.serial.as_ref().map_or("default device", DeviceId::as_str)
    }
}

impl ShellExecutor for AdbDevice {
    fn execute_shell_command(
        &self,
        command: &str,
        receiver: &mut dyn ShellOutputReceiver,
        max_time_to_output: Duration,
    ) -> Result<()> {
        execute_remote_command(
            &self.config,
            AdbService::Shell,
            command,
            self.serial.as_ref(),
            receiver,
            max_time_to_output,
            None,
        )
    }
}
