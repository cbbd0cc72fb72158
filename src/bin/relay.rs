use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use weather_relay::config::{load_config, write_config};
use weather_relay::{Relay, RelayConfig};

/// Keeps the last few multicast weather messages and serves them over TCP
#[derive(Parser, Debug)]
#[command(name = "weather-relay")]
#[command(version)]
struct Args {
    /// Configuration file path (YAML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Multicast group to join (overrides config file)
    #[arg(short, long)]
    group: Option<Ipv4Addr>,

    /// Multicast UDP port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// TCP listen address (overrides config file)
    #[arg(short, long)]
    tcp_bind: Option<SocketAddr>,

    /// Number of messages kept (overrides config file)
    #[arg(long)]
    capacity: Option<usize>,

    /// Generate example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    weather_relay::init_tracing();
    let args = Args::parse();

    if args.generate_config {
        let path = Path::new("relay_example.yml");
        write_config(&RelayConfig::default(), path)?;
        info!("Generated example configuration: {}", path.display());
        return Ok(());
    }

    let mut config: RelayConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };
    if let Some(group) = args.group {
        config.group = group;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(tcp_bind) = args.tcp_bind {
        config.tcp_bind = tcp_bind;
    }
    if let Some(capacity) = args.capacity {
        config.history_capacity = capacity;
    }

    let relay = Relay::bind(&config).await?;
    info!(
        "Relay up: multicast {}:{}, TCP {}",
        config.group,
        config.port,
        relay.tcp_addr()?
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Could not listen for Ctrl-C: {e}");
                return;
            }
            info!("Shutting down");
            shutdown.cancel();
        }
    });

    relay.run(shutdown).await?;
    Ok(())
}
