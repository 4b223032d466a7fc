use anyhow::Context;
use panoview_core::RelayConfig;
use panoview_ws::RelayServer;
use tokio_util::sync::CancellationToken;

use crate::cli::RelayOpts;

pub async fn cmd_relay(opts: &RelayOpts) -> anyhow::Result<()> {
    let config = RelayConfig {
        addr: opts.addr.clone(),
        max_connections: opts.max_connections,
    };
    let cancel = CancellationToken::new();
    let server = RelayServer::from_config(&config, cancel.clone())
        .with_context(|| format!("invalid listen address: {}", config.addr))?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, stopping relay");
        }
        shutdown.cancel();
    });

    server.run().await.context("relay server failed")?;
    Ok(())
}
