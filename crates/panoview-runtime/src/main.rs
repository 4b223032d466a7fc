//! panoview: relay server and demo viewer binary.

use clap::Parser;

mod cli;
mod cmd_demo;
mod cmd_relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("PANOVIEW_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    match args.command {
        cli::Command::Relay(opts) => cmd_relay::cmd_relay(&opts).await?,
        cli::Command::Demo(opts) => cmd_demo::cmd_demo(opts).await?,
    }

    Ok(())
}
