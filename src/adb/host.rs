use crate::adb::connection::AdbConnection;
use crate::config::Config;
use crate::core::types::DeviceId;
use crate::error::{BridgeError, Result};
use log::*;

/// Version of the ADB server at `config`.
pub fn server_version(config: &Config) -> Result<u32> {
    let mut conn = AdbConnection::open(config)?;
    read_server_version(&mut conn)
}

/// `host:version`: OKAY followed by the version as four hex digits.
pub fn read_server_version(conn: &mut AdbConnection) -> Result<u32> {
    conn.send_request("host:version")?;
    let response = conn.read_response(true)?;
    if !response.okay {
        return Err(BridgeError::CommandRejected(response.message));
    }

    let version = u32::from_str_radix(response.message.trim(), 16)
        .map_err(|_| BridgeError::Protocol(format!("bad version '{}'", response.message)))?;
    debug!("ADB server version {}", version);
    Ok(version)
}

/// Forward `local` on the host to `remote` on the device, e.g. `tcp:8700`
/// to `jdwp:1234`.
pub fn create_forward(
    conn: &mut AdbConnection,
    device: Option<&DeviceId>,
    local: &str,
    remote: &str,
) -> Result<()> {
    let request = format!("{}:forward:{};{}", host_prefix(device), local, remote);
    conn.request_okay(&request)
        .inspect_err(|e| warn!("Error creating forward: {}", e))
}

pub fn remove_forward(
    conn: &mut AdbConnection,
    device: Option<&DeviceId>,
    local: &str,
) -> Result<()> {
    let request = format!("{}:killforward:{}", host_prefix(device), local);
    conn.request_okay(&request)
        .inspect_err(|e| warn!("Error removing forward: {}", e))
}

/// Reboot the device, optionally into `bootloader` or `recovery`.
///
/// The daemon drops the connection instead of answering, so no reply is
/// read.
pub fn reboot(
    conn: &mut AdbConnection,
    device: Option<&DeviceId>,
    into: Option<&str>,
) -> Result<()> {
    conn.select_device(device)?;
    let request = match into {
        Some(target) => format!("reboot:{}", target),
        None => "reboot:".to_string(),
    };
    info!("Rebooting {}", device.map(DeviceId::as_str).unwrap_or("device"));
    conn.send_request(&request)
}

/// Turn `conn` into a pass-through socket to `port` on the device.
pub fn open_tunnel(
    conn: &mut AdbConnection,
    device: Option<&DeviceId>,
    port: u16,
) -> Result<()> {
    conn.select_device(device)?;
    conn.request_okay(&format!("tcp:{}", port))
}

fn host_prefix(device: Option<&DeviceId>) -> String {
    match device {
        Some(id) => format!("host-serial:{}", id),
        None => "host".to_string(),
    }
}
