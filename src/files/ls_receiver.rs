use crate::adb::shell::{LineProcessor, MultiLineReceiver, ShellExecutor};
use crate::error::Result;
use crate::files::entry::{escape, FileType, ListingRow, FILE_SEPARATOR};
use lazy_static::lazy_static;
use log::*;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    /// One `ls -l` row: permissions, owner, group, size, date, time, name.
    /// The link count column printed by toybox is skipped when present.
    pub static ref LS_L_PATTERN: Regex = Regex::new(
        r"^([bcdlsp-][-r][-w][-xsS][-r][-w][-xsS][-r][-w][-xstST])\s+(?:\d+\s+)?(\S+)\s+(\S+)\s+([\d\s,]*)\s+(\d{4}-\d\d-\d\d)\s+(\d\d:\d\d)\s+(.*)$"
    )
    .unwrap();

    /// A directory row as printed by `ls -l -d <path>/`.
    pub static ref LS_LD_PATTERN: Regex = Regex::new(
        r"^d[rwxsStT-]{9}\s+(?:\d+\s+)?\S+\s+\S+\s+(?:[\d,]+\s+)?[0-9-]{10}\s+\d{2}:\d{2}(?:\s+.*)?$"
    )
    .unwrap();

    static ref LINK_SEPARATOR: Regex = Regex::new(r"\s->\s").unwrap();
}

/// Parse one `ls -l` row. Empty and non-matching lines give `None`.
pub fn parse_ls_line(line: &str) -> Option<ListingRow> {
    if line.is_empty() {
        return None;
    }

    let caps = LS_L_PATTERN.captures(line)?;
    let permissions = caps[1].to_string();
    let mut name = caps[7].to_string();
    let mut file_type = FileType::from_permissions(&permissions);
    let mut info = None;

    if file_type == FileType::Link {
        let segments: Vec<&str> = LINK_SEPARATOR.split(&name).collect();
        if segments.len() == 2 {
            let target = segments[1].to_string();
            name = segments[0].to_string();

            // A link to `..` is a directory without asking the device.
            let target_segments: Vec<&str> = target.split(FILE_SEPARATOR).collect();
            if target_segments.len() == 1 && target_segments[0] == ".." {
                file_type = FileType::DirectoryLink;
            }
            info = Some(format!("-> {}", target));
        }
    }

    Some(ListingRow {
        name,
        file_type,
        permissions,
        owner: caps[2].to_string(),
        group: caps[3].to_string(),
        size: caps[4].to_string(),
        date: caps[5].to_string(),
        time: caps[6].to_string(),
        info,
    })
}

/// Collects the rows of an `ls -l` listing.
#[derive(Debug, Default)]
pub struct LsReceiver {
    rows: Vec<ListingRow>,
}

impl LsReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ListingRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ListingRow> {
        self.rows
    }
}

impl LineProcessor for LsReceiver {
    fn process_new_lines(&mut self, lines: &[String]) {
        self.rows
            .extend(lines.iter().filter_map(|line| parse_ls_line(line)));
    }
}

/// Counts lines that look like a directory row.
#[derive(Debug, Default)]
struct DirectoryProbe {
    matches: usize,
}

impl LineProcessor for DirectoryProbe {
    fn process_new_lines(&mut self, lines: &[String]) {
        self.matches += lines
            .iter()
            .filter(|line| LS_LD_PATTERN.is_match(line))
            .count();
    }
}

/// Resolve which `LINK` rows point at directories.
///
/// Each remaining link under `parent_escaped_path` is probed with
/// `ls -l -d <link>/`; a directory row in the answer turns it into a
/// `DIRECTORY_LINK`.
pub fn finish_links(
    shell: &dyn ShellExecutor,
    parent_escaped_path: &str,
    rows: &mut [ListingRow],
    max_time_to_output: Duration,
) -> Result<()> {
    for row in rows.iter_mut().filter(|r| r.file_type == FileType::Link) {
        let command = format!(
            "ls -l -d {}{}{}{}",
            parent_escaped_path,
            FILE_SEPARATOR,
            escape(&row.name),
            FILE_SEPARATOR
        );

        let mut receiver = MultiLineReceiver::new(DirectoryProbe::default());
        shell.execute_shell_command(&command, &mut receiver, max_time_to_output)?;

        if receiver.processor().matches > 0 {
            trace!("{} resolves to a directory", row.name);
            row.file_type = FileType::DirectoryLink;
        }
    }
    Ok(())
}
