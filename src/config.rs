use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE_NAME: &str = ".devbridge.toml";

/// Connection and listing settings.
///
/// Every field falls back to its default when missing from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ADB server host
    pub host: String,
    /// ADB server port
    pub port: u16,
    /// Read/write timeout on the ADB socket, in milliseconds. 0 waits forever.
    pub timeout_ms: u64,
    /// Maximum silence from a shell command before it is considered hung, in
    /// milliseconds. 0 waits forever.
    pub shell_timeout_ms: u64,
    /// Nominal refresh period of the directory listing cache, in milliseconds.
    pub refresh_rate_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5037,
            timeout_ms: 5000,
            shell_timeout_ms: 5000,
            refresh_rate_ms: 5000,
        }
    }
}

impl Config {
    /// Load `~/.devbridge.toml`, or defaults when it is missing or unreadable.
    pub fn load() -> Self {
        match Config::get_config_path() {
            Some(path) => Config::load_from_path(&path),
            None => {
                debug!("No home directory, using default config");
                Config::default()
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Self {
        debug!("Loading config from: {:?}", path);

        let Ok(content) = fs::read_to_string(path) else {
            debug!("No config file found or unable to read it");
            return Config::default();
        };

        match Config::parse(&content) {
            Ok(config) => {
                debug!("Parsed config: {:?}", config);
                config
            }
            Err(e) => {
                warn!("Error parsing config file {}: {}", path.display(), e);
                Config::default()
            }
        }
    }

    pub fn parse(content: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn get_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_FILE_NAME))
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        self.refresh_rate_ms = rate.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn shell_timeout(&self) -> Duration {
        Duration::from_millis(self.shell_timeout_ms)
    }

    pub fn refresh_rate(&self) -> Duration {
        Duration::from_millis(self.refresh_rate_ms)
    }

    /// `host:port`, with `localhost` pinned to the IPv4 loopback the server
    /// listens on.
    pub fn server_address(&self) -> String {
        format!(
            "{}:{}",
            if self.host == "localhost" {
                "127.0.0.1"
            } else {
                &self.host
            },
            self.port
        )
    }
}
