use crate::commands::{blocking, formatter, SubCommand};
use crate::core::context::CommandContext;
use crate::error::{BridgeError, Result};
use crate::files::{FileEntry, FileListingService};
use crate::output::EntryInfo;
use async_trait::async_trait;

pub struct LsCommand;

#[derive(Debug, Clone, clap::Args)]
pub struct LsArgs {
    /// Remote directory or file
    #[clap(default_value = "/")]
    pub path: String,
}

impl Default for LsArgs {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
        }
    }
}

impl LsCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LsCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Entries shown for `path`: the children of a directory, or the entry itself.
pub fn list_path(listing: &FileListingService, path: &str) -> Result<Vec<FileEntry>> {
    let entry = listing
        .resolve(path)?
        .ok_or_else(|| BridgeError::InvalidArgument(format!("{}: no such remote path", path)))?;

    if entry.is_directory() {
        listing.get_children_sync(&entry)
    } else {
        Ok(vec![entry])
    }
}

#[async_trait]
impl SubCommand for LsCommand {
    type Args = LsArgs;

    async fn run(&self, ctx: &CommandContext, args: Self::Args) -> Result<()> {
        let device = ctx.device.clone();
        let entries = blocking(move || {
            let listing = device.file_listing_service()?;
            list_path(&listing, &args.path)
        })
        .await?;

        let rows: Vec<EntryInfo> = entries.iter().map(EntryInfo::from).collect();
        formatter(ctx).render(&rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::fixtures::*;
    use crate::testing::ScriptedShell;
    use std::sync::Arc;

    fn listing() -> FileListingService {
        let shell = ScriptedShell::new()
            .with_output("ls -l /", ROOT_LISTING)
            .with_output("ls -l -d /sdcard/", SDCARD_PROBE)
            .with_output("ls -l /data/", DATA_LISTING);
        FileListingService::new(Arc::new(shell), &Config::default()).unwrap()
    }

    #[test]
    fn test_list_directory_children() {
        let names: Vec<String> = list_path(&listing(), "/data")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["app", "local"]);
    }

    #[test]
    fn test_list_single_file() {
        let entries = list_path(&listing(), "/default.prop").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/default.prop");
    }

    #[test]
    fn test_missing_path() {
        let err = list_path(&listing(), "/nope").unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }
}
