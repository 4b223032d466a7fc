//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "panoview", about = "panoview relay and demo viewer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the fan-out relay that viewers and frontends connect to
    Relay(RelayOpts),
    /// Connect a demo viewer session and hold it open
    Demo(DemoOpts),
}

#[derive(clap::Args)]
pub struct RelayOpts {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,

    /// Maximum concurrent WebSocket connections
    #[arg(long, default_value = "64")]
    pub max_connections: usize,
}

#[derive(clap::Args)]
pub struct DemoOpts {
    /// Server URL (ws://, wss://, http(s):// or bare host:port)
    #[arg(long, env = "PANOVIEW_URL")]
    pub url: Option<String>,

    /// Viewer id; generated when absent
    #[arg(long, env = "PANOVIEW_VIEWER_ID")]
    pub viewer_id: Option<String>,

    /// Let the frontend execute Lua in this process
    #[arg(long)]
    pub interactive_console: bool,

    /// TOML session config; flags override its values
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}
