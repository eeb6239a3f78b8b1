//! Screen relay server
//!
//! # Usage
//!
//! ```bash
//! # Default (ws://0.0.0.0:8080/ws)
//! screen-relay
//!
//! # Custom port, also read from $PORT
//! PORT=9000 screen-relay
//! screen-relay --port 9000 --verbose
//! ```

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use screen_relay::{RegistryConfig, RelayConfig, RelayServer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "screen-relay")]
#[command(about = "Live screen-stream WebSocket relay")]
#[command(version)]
struct Cli {
    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Listen host
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// WebSocket path
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Maximum clients (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,

    /// Liveness probe interval in seconds
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    heartbeat_secs: u64,

    /// Reap empty rooms idle for this many seconds
    #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..))]
    idle_room_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug,screen_relay=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RelayConfig::with_addr(SocketAddr::new(cli.host, cli.port))
        .ws_path(cli.path)
        .max_connections(cli.max_connections)
        .heartbeat_interval(Duration::from_secs(cli.heartbeat_secs));
    let registry_config =
        RegistryConfig::default().idle_room_timeout(Duration::from_secs(cli.idle_room_secs));

    let server = RelayServer::with_registry_config(config, registry_config);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["screen-relay"]).unwrap();
        assert_eq!(cli.heartbeat_secs, 15);
        assert_eq!(cli.idle_room_secs, 600);
        assert_eq!(cli.path, "/ws");
    }

    #[test]
    fn test_cli_rejects_zero_intervals() {
        assert!(Cli::try_parse_from(["screen-relay", "--heartbeat-secs", "0"]).is_err());
        assert!(Cli::try_parse_from(["screen-relay", "--idle-room-secs", "0"]).is_err());
        assert!(Cli::try_parse_from(["screen-relay", "--heartbeat-secs", "1"]).is_ok());
    }
}
