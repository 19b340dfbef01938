use crate::adb::host;
use crate::commands::{blocking, formatter, SubCommand};
use crate::core::context::CommandContext;
use crate::error::Result;
use crate::output::{PlainFormat, TableFormat};
use async_trait::async_trait;
use serde::Serialize;

pub struct VersionCommand;

#[derive(Debug, Serialize)]
struct VersionInfo {
    server_version: u32,
}

impl TableFormat for VersionInfo {
    fn headers() -> Vec<&'static str> {
        vec!["ADB SERVER VERSION"]
    }

    fn row(&self) -> Vec<String> {
        vec![self.server_version.to_string()]
    }
}

impl PlainFormat for VersionInfo {
    fn plain(&self) -> String {
        self.server_version.to_string()
    }
}

impl VersionCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VersionCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubCommand for VersionCommand {
    type Args = ();

    async fn run(&self, ctx: &CommandContext, _args: Self::Args) -> Result<()> {
        let config = ctx.config.clone();
        let server_version = blocking(move || host::server_version(&config)).await?;

        formatter(ctx).render(&[VersionInfo { server_version }])
    }
}
