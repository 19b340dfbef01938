use crate::adb::FileStat;
use crate::files::FileEntry;
use crate::output::{PlainFormat, TableFormat};
use serde::Serialize;

/// Format size in human-readable format
pub fn format_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G", "T"];

    let mut value = size as f64;
    let mut unit_index = 0;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{}{}", size, UNITS[0])
    } else {
        format!("{:.1}{}", value, UNITS[unit_index])
    }
}

/// One row of a remote directory listing
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub path: String,
    pub file_type: String,
    pub permissions: String,
    pub owner: String,
    pub group: String,
    /// Byte count, or the raw column for device nodes (`1, 3`).
    pub size: String,
    pub modified: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl From<&FileEntry> for EntryInfo {
    fn from(entry: &FileEntry) -> Self {
        Self {
            name: entry.name.clone(),
            path: entry.path.clone(),
            file_type: entry.file_type.as_str().to_string(),
            permissions: entry.permissions.clone(),
            owner: entry.owner.clone(),
            group: entry.group.clone(),
            size: entry.size.clone(),
            modified: format!("{} {}", entry.date, entry.time),
            info: entry.info.clone(),
        }
    }
}

impl EntryInfo {
    fn display_size(&self) -> String {
        match self.size.trim().parse() {
            Ok(size) => format_size(size),
            Err(_) => self.size.clone(),
        }
    }

    fn display_name(&self) -> String {
        match &self.info {
            Some(info) => format!("{} {}", self.name, info),
            None => self.name.clone(),
        }
    }
}

impl TableFormat for EntryInfo {
    fn headers() -> Vec<&'static str> {
        vec!["NAME", "SIZE", "TYPE", "PERMISSIONS", "OWNER", "MODIFIED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.display_name(),
            self.display_size(),
            self.file_type.clone(),
            self.permissions.clone(),
            format!("{}:{}", self.owner, self.group),
            self.modified.clone(),
        ]
    }
}

impl PlainFormat for EntryInfo {
    fn plain(&self) -> String {
        format!(
            "{} {} {} {}",
            self.permissions,
            self.display_size(),
            self.modified,
            self.display_name()
        )
    }
}

/// Result of a sync STAT
#[derive(Debug, Clone, Serialize)]
pub struct StatInfo {
    pub path: String,
    pub file_type: String,
    pub mode: String,
    pub size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

impl StatInfo {
    pub fn new(path: impl Into<String>, stat: &FileStat) -> Self {
        Self {
            path: path.into(),
            file_type: stat.file_type().as_str().to_string(),
            mode: format!("{:o}", stat.mode),
            size: stat.size,
            modified: stat
                .last_modified()
                .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

impl TableFormat for StatInfo {
    fn headers() -> Vec<&'static str> {
        vec!["PATH", "TYPE", "MODE", "SIZE", "MODIFIED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.path.clone(),
            self.file_type.clone(),
            self.mode.clone(),
            format_size(u64::from(self.size)),
            self.modified.clone().unwrap_or_default(),
        ]
    }
}

impl PlainFormat for StatInfo {
    fn plain(&self) -> String {
        format!(
            "{} {} {} {}",
            self.mode,
            self.size,
            self.modified.as_deref().unwrap_or("-"),
            self.path
        )
    }
}

/// Summary of one finished transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferInfo {
    pub source: String,
    pub destination: String,
    pub bytes: u64,
    pub seconds: f64,
}

impl TransferInfo {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            bytes: 0,
            seconds: 0.0,
        }
    }

    pub fn with_bytes(mut self, bytes: u64) -> Self {
        self.bytes = bytes;
        self
    }

    pub fn with_seconds(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn format_rate(&self) -> String {
        if self.seconds > 0.0 {
            format!("{}/s", format_size((self.bytes as f64 / self.seconds) as u64))
        } else {
            "-".to_string()
        }
    }
}

impl TableFormat for TransferInfo {
    fn headers() -> Vec<&'static str> {
        vec!["SOURCE", "DESTINATION", "SIZE", "RATE"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.source.clone(),
            self.destination.clone(),
            format_size(self.bytes),
            self.format_rate(),
        ]
    }
}

impl PlainFormat for TransferInfo {
    fn plain(&self) -> String {
        format!(
            "{} -> {}: {} ({})",
            self.source,
            self.destination,
            format_size(self.bytes),
            self.format_rate()
        )
    }
}
