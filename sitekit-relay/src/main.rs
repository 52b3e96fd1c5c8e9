//! sitekit relay — fans collaboration frames out to everyone in a room.
//!
//! ```text
//! sitekit-relay [--bind ADDR] [--max-peers N] [--capacity N]
//! ```
//!
//! `SITEKIT_RELAY_ADDR` sets the bind address when `--bind` is absent.
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=info`).

use clap::Parser;
use log::{error, info};
use sitekit_collab::{RelayConfig, RelayServer};

#[derive(Parser, Debug)]
#[command(name = "sitekit-relay", about = "Room relay for sitekit collaborative editing")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SITEKIT_RELAY_ADDR", default_value = "127.0.0.1:9090")]
    bind: String,
    /// Joins beyond this many peers in one room are refused
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
    max_peers: u32,
    /// Frames a slow peer may fall behind before it starts losing them
    #[arg(long, default_value_t = 256, value_parser = clap::value_parser!(u32).range(1..))]
    capacity: u32,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        RelayConfig {
            bind_addr: self.bind,
            max_peers_per_room: self.max_peers as usize,
            broadcast_capacity: self.capacity as usize,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Args::parse().into_config();
    info!(
        "Starting sitekit relay on {} (max {} peers per room)",
        config.bind_addr, config.max_peers_per_room
    );
    let server = RelayServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Relay stopped: {e}");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await;
            info!(
                "Shutting down: {} connections served, {} messages relayed",
                stats.total_connections, stats.total_messages
            );
        }
    }
    Ok(())
}
