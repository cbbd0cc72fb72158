//! The relay process: multicast subscriber and TCP history server sharing one
//! bounded history.
//!
//! ```text
//! Starting ──bind+join──▶ JoinedAndListening ──run──▶ Running ──shutdown──▶ Stopped
//!     │
//!     └── bind or join failure: error returned, process exits
//! ```

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::history::{HistoryBuffer, SharedHistory};
use crate::server::HistoryServer;
use crate::subscriber::Subscriber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Starting,
    JoinedAndListening,
    Running,
    Stopped,
}

impl Display for RelayState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelayState::Starting => "starting",
            RelayState::JoinedAndListening => "joined and listening",
            RelayState::Running => "running",
            RelayState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct Relay {
    subscriber: Subscriber,
    server: HistoryServer,
    history: SharedHistory,
    state: watch::Sender<RelayState>,
}

impl Relay {
    /// Joins the multicast group and binds the TCP listener from `config`.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        config.validate()?;
        let state = watch::Sender::new(RelayState::Starting);
        let history = HistoryBuffer::shared(config.history_capacity)?;
        let subscriber =
            Subscriber::join(config.group, config.port, config.interface, history.clone()).await?;
        let server = HistoryServer::bind(config.tcp_bind, history.clone(), &config.empty_placeholder)?;
        Ok(Self::assemble(subscriber, server, history, state))
    }

    /// Builds a relay from already bound parts. Both must share `history`.
    pub fn from_parts(subscriber: Subscriber, server: HistoryServer, history: SharedHistory) -> Self {
        Self::assemble(
            subscriber,
            server,
            history,
            watch::Sender::new(RelayState::Starting),
        )
    }

    fn assemble(
        subscriber: Subscriber,
        server: HistoryServer,
        history: SharedHistory,
        state: watch::Sender<RelayState>,
    ) -> Self {
        let relay = Self {
            subscriber,
            server,
            history,
            state,
        };
        relay.transition(RelayState::JoinedAndListening);
        relay
    }

    fn transition(&self, next: RelayState) {
        info!("Relay {next}");
        self.state.send_replace(next);
    }

    pub fn state(&self) -> watch::Receiver<RelayState> {
        self.state.subscribe()
    }

    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn tcp_addr(&self) -> Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn udp_addr(&self) -> Result<SocketAddr> {
        self.subscriber.local_addr()
    }

    /// Runs the receive loop and the accept loop concurrently until
    /// `shutdown` is cancelled or one of them fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Relay {
            subscriber,
            server,
            state,
            ..
        } = self;

        // Either loop ending takes the other one down with it
        let stop = shutdown.child_token();
        let receiving = tokio::spawn({
            let stop = stop.clone();
            async move {
                let result = subscriber.run(stop.clone()).await;
                stop.cancel();
                result
            }
            .instrument(info_span!("subscriber"))
        });
        let accepting = tokio::spawn({
            let stop = stop.clone();
            async move {
                let result = server.run(stop.clone()).await;
                stop.cancel();
                result
            }
            .instrument(info_span!("server"))
        });

        info!("Relay {}", RelayState::Running);
        state.send_replace(RelayState::Running);

        let (receiving, accepting) = tokio::join!(receiving, accepting);

        info!("Relay {}", RelayState::Stopped);
        state.send_replace(RelayState::Stopped);

        let mut outcome = Ok(());
        for (name, joined) in [("subscriber", receiving), ("server", accepting)] {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Relay {name} failed: {e}");
                    outcome = outcome.and(Err(e));
                }
                Err(e) => {
                    error!("Relay {name} task panicked: {e}");
                    outcome = outcome.and(Err(RelayError::Io(std::io::Error::other(e))));
                }
            }
        }
        outcome
    }
}
