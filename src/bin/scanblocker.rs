use anyhow::{Context, Result};
use clap::Parser;
use scanblocker::cli::Cli;
use scanblocker::config::ScanConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ScanConfig::load(&cli).context("Invalid configuration")?;

    scanblocker::daemon::run(config).await
}
