//! Active store reachability checking.
//!
//! # Responsibilities
//! - Periodically probe the hosts named in the connection string
//! - Keep the shared [`ReadyState`] cell current
//! - Log connection transitions, never propagate them

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time;

use crate::config::StoreConfig;
use crate::lifecycle::ShutdownSignal;
use crate::store::{ConnectionString, ReadyState, StoreError, StoreHandle};

pub struct StoreMonitor {
    target: ConnectionString,
    handle: StoreHandle,
    interval: Duration,
    connect_timeout: Duration,
}

impl StoreMonitor {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            target: ConnectionString::parse(&config.uri)?,
            handle: StoreHandle::new(ReadyState::Connecting),
            interval: Duration::from_secs(config.check_interval_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    /// Shared view of the connection state for readers such as the health check.
    pub fn handle(&self) -> StoreHandle {
        self.handle.clone()
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            target_uri = %self.target,
            interval_secs = self.interval.as_secs(),
            "Store monitor starting"
        );

        let mut ticker = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.draining() => {
                    tracing::info!("Store monitor received shutdown signal, disconnecting");
                    self.handle.set(ReadyState::Disconnecting);
                    break;
                }
            }
        }

        self.handle.set(ReadyState::Disconnected);
    }

    /// Probe every host once and publish the result.
    pub async fn check(&self) -> ReadyState {
        let reachable = self.probe().await;
        let next = if reachable {
            ReadyState::Connected
        } else {
            ReadyState::Disconnected
        };

        let previous = self.handle.set(next);
        if previous != next {
            match next {
                ReadyState::Connected => tracing::info!(target_uri = %self.target, "Store connected"),
                _ => tracing::error!(
                    target_uri = %self.target,
                    previous = ?previous,
                    "Store unreachable, health check degraded"
                ),
            }
        }
        next
    }

    async fn probe(&self) -> bool {
        for (host, port) in self.target.hosts() {
            match time::timeout(self.connect_timeout, TcpStream::connect((host.as_str(), *port))).await {
                Ok(Ok(_)) => return true,
                Ok(Err(e)) => {
                    tracing::debug!(host = %host, port = *port, error = %e, "Store probe failed");
                }
                Err(_) => {
                    tracing::debug!(host = %host, port = *port, "Store probe timed out");
                }
            }
        }
        false
    }
}
