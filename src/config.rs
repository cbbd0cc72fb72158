use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::history::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(233, 0, 0, 1);
pub const DEFAULT_UDP_PORT: u16 = 1502;
pub const DEFAULT_TCP_PORT: u16 = 1503;
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Default message";
pub const DEFAULT_EMPTY_PLACEHOLDER: &str = "No messages";

/// Configuration for the multicast publisher
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PublisherConfig {
    /// Multicast group to send to
    pub group: Ipv4Addr,
    /// Destination UDP port
    pub port: u16,
    /// Text file polled for the current weather
    pub source_path: PathBuf,
    /// Seconds between polls
    pub interval_secs: u64,
    /// Sent in place of the file content when the file cannot be read
    pub fallback_message: String,
    /// Multicast TTL, 1 keeps datagrams on the local subnet
    pub multicast_ttl: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_UDP_PORT,
            source_path: PathBuf::from("weather.txt"),
            interval_secs: 10,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            multicast_ttl: 1,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<()> {
        validate_group(self.group)?;
        if self.interval_secs == 0 {
            return Err(RelayError::Config(
                "interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

/// Configuration for the relay (multicast subscriber + TCP history server)
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Multicast group to join
    pub group: Ipv4Addr,
    /// UDP port the group is published on
    pub port: u16,
    /// Local interface used for the group membership
    pub interface: Ipv4Addr,
    /// Address the TCP history server listens on
    pub tcp_bind: SocketAddr,
    /// Number of recent messages kept
    pub history_capacity: usize,
    /// Sent to clients while no message has been received yet
    pub empty_placeholder: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_UDP_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            tcp_bind: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_TCP_PORT)),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            empty_placeholder: DEFAULT_EMPTY_PLACEHOLDER.to_string(),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<()> {
        validate_group(self.group)?;
        if self.history_capacity == 0 {
            return Err(RelayError::Config(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_group(group: Ipv4Addr) -> Result<()> {
    if !group.is_multicast() {
        return Err(RelayError::Config(format!(
            "{group} is not a multicast address"
        )));
    }
    Ok(())
}

pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Writes `config` as YAML to `path`.
pub fn write_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(path, yaml)?;
    Ok(())
}
