use anyhow::Result;
use clap::Parser;
use snapbed::cli::{self, Commands};
use snapbed::{commands, config};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Only use colors when outputting to a TTY (not when piped to file)
    let use_color = atty::is(atty::Stream::Stdout);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}

async fn run(cli: cli::Cli) -> Result<()> {
    let config = config::load_config(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Image(args) => commands::cmd_image(args, &config).await,
        Commands::Run(args) => commands::cmd_run(args, &config).await,
        Commands::Exec(args) => commands::cmd_exec(args, &config).await,
        Commands::Copy(args) => commands::cmd_copy(args, &config).await,
        Commands::Sources(args) => commands::cmd_sources(args).await,
        Commands::Fixup(args) => commands::cmd_fixup(args).await,
        Commands::BuildPackages(args) => commands::cmd_build_packages(args).await,
    }
}
