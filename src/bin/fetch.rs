use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;
use weather_relay::client::{connect, read_history};

/// Fetches the recent weather messages from a relay and prints them
#[derive(Parser, Debug)]
#[command(name = "weather-fetch")]
struct Args {
    /// Relay TCP address
    #[arg(short, long, default_value = "127.0.0.1:1503")]
    relay: SocketAddr,

    /// Seconds to wait for the full response
    #[arg(short, long, default_value = "5")]
    timeout: u64,
}

#[tokio::main]
async fn main() {
    weather_relay::init_tracing();
    let args = Args::parse();

    let timeout = Duration::from_secs(args.timeout);

    eprintln!("Connecting to {}...", args.relay);
    let stream = match connect(args.relay, timeout).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("Connection failed: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("Connected");

    match read_history(stream, timeout).await {
        Ok(text) => println!("{text}"),
        Err(e) => {
            eprintln!("Connection failed: {e}");
            std::process::exit(1);
        }
    }
}
