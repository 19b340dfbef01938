use clap::Parser;
use devbridge::cli::{Cli, Commands};
use devbridge::commands::ls::LsCommand;
use devbridge::commands::pull::PullCommand;
use devbridge::commands::push::PushCommand;
use devbridge::commands::stat::StatCommand;
use devbridge::commands::version::VersionCommand;
use devbridge::commands::SubCommand;
use devbridge::config::Config;
use devbridge::core::{CommandContext, DeviceId};
use devbridge::error::Result;
use devbridge::output::OutputFormatter;
use log::debug;
use std::process::ExitCode;
use std::time::Duration;

fn build_context(cli: &Cli) -> CommandContext {
    let mut config = Config::load();
    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(timeout) = cli.timeout {
        config = config.with_timeout(Duration::from_millis(timeout));
    }
    debug!("Effective config: {:?}", config);

    CommandContext::new(config, cli.serial.clone().map(DeviceId::from))
        .with_output_format(cli.output.into())
        .with_quiet(cli.verbose.is_silent())
}

async fn dispatch(ctx: &CommandContext, command: Commands) -> Result<()> {
    match command {
        Commands::Ls(args) => LsCommand::new().run(ctx, args).await,
        Commands::Stat(args) => StatCommand::new().run(ctx, args).await,
        Commands::Pull(args) => PullCommand::new().run(ctx, args).await,
        Commands::Push(args) => PushCommand::new().run(ctx, args).await,
        Commands::Version => VersionCommand::new().run(ctx, ()).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let ctx = build_context(&cli);
    match dispatch(&ctx, cli.command()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
