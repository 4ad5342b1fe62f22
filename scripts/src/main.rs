use clap::Parser;
use eyre::Result;
use options_deploy::cli::CliArgs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    CliArgs::parse().command.run().await?;

    Ok(())
}
