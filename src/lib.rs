pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod message;
pub mod publisher;
pub mod relay;
pub mod server;
pub mod subscriber;

pub use config::{PublisherConfig, RelayConfig};
pub use error::{RelayError, Result};
pub use history::{HistoryBuffer, LastValue, SharedHistory};
pub use message::Message;
pub use publisher::{FileSource, Publisher, TextSource};
pub use relay::{Relay, RelayState};
pub use server::HistoryServer;
pub use subscriber::Subscriber;

/// Installs the fmt subscriber used by all binaries, `info` unless `RUST_LOG`
/// says otherwise.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
