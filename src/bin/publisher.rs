use clap::Parser;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use weather_relay::config::{load_config, write_config};
use weather_relay::{FileSource, Publisher, PublisherConfig};

/// Polls a weather file and multicasts its content whenever it changes
#[derive(Parser, Debug)]
#[command(name = "weather-publisher")]
#[command(version)]
struct Args {
    /// Configuration file path (YAML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Multicast group (overrides config file)
    #[arg(short, long)]
    group: Option<Ipv4Addr>,

    /// UDP port (overrides config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Text file to poll (overrides config file)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Seconds between polls (overrides config file)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Generate example configuration file and exit
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    weather_relay::init_tracing();
    let args = Args::parse();

    if args.generate_config {
        let path = Path::new("publisher_example.yml");
        write_config(&PublisherConfig::default(), path)?;
        info!("Generated example configuration: {}", path.display());
        return Ok(());
    }

    let mut config: PublisherConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => PublisherConfig::default(),
    };
    if let Some(group) = args.group {
        config.group = group;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(source) = args.source {
        config.source_path = source;
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }

    let source = FileSource::new(config.source_path.clone());
    let publisher = Publisher::new(&config, source).await?;
    info!(
        "Publishing {} to {} (local {})",
        config.source_path.display(),
        config.target(),
        publisher.local_addr()?
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

    publisher.run(config.interval(), shutdown).await?;
    Ok(())
}
