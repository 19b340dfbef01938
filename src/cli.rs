use crate::commands::{ls::LsArgs, pull::PullArgs, push::PushArgs, stat::StatArgs};
use crate::core::types::OutputFormat;
use clap::{Parser, Subcommand};

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum OutputType {
    Table,
    Json,
    Plain,
}

impl From<OutputType> for OutputFormat {
    fn from(output: OutputType) -> Self {
        match output {
            OutputType::Table => OutputFormat::Table,
            OutputType::Json => OutputFormat::Json,
            OutputType::Plain => OutputFormat::Plain,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level; `-q` also hides progress bars and summaries
    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,

    /// ADB server hostname (overrides the config file)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// ADB server port (overrides the config file)
    #[arg(long, short = 'p', global = true)]
    pub port: Option<u16>,

    /// Socket timeout in milliseconds, 0 waits forever
    #[arg(long, short = 't', global = true)]
    pub timeout: Option<u64>,

    /// Target device serial, required when several devices are attached
    #[arg(long, short = 's', global = true)]
    pub serial: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "table")]
    pub output: OutputType,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List a remote directory
    Ls(LsArgs),

    /// Show mode, size and modification time of a remote path
    Stat(StatArgs),

    /// Copy remote files or directories to the host
    Pull(PullArgs),

    /// Copy local files or directories to the device
    Push(PushArgs),

    /// Print the ADB server protocol version
    Version,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Ls(LsArgs::default()))
    }
}
