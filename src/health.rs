// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Broker Health Monitoring
//!
//! This module proactively checks that the configured broker host is still
//! reachable. Reactive reconnection alone cannot notice a broker endpoint
//! that was repointed behind a DNS name while the old connection stays
//! technically alive; the health monitor closes that gap by re-resolving
//! the hostname and switching to a reachable address.

use crate::{connection::RabbitMQConnection, errors::AmqpError};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::{lookup_host, TcpStream},
    time::{sleep, timeout},
};
use tracing::{error, info};

/// Upper bound on a single TCP reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Periodic reachability check over a shared [`RabbitMQConnection`].
///
/// Run it on its own task:
///
/// ```ignore
/// let monitor = HealthMonitor::new(connection.clone());
/// tokio::spawn(async move { monitor.run().await });
/// ```
pub struct HealthMonitor {
    connection: Arc<RabbitMQConnection>,
}

impl HealthMonitor {
    pub fn new(connection: Arc<RabbitMQConnection>) -> HealthMonitor {
        HealthMonitor { connection }
    }

    /// Loops on the configured interval, validating the active host and
    /// recreating the connection when the host changed.
    ///
    /// Ticks are skipped while a recreation is already in flight. Returns
    /// `RecreationFailure` when the host cannot be validated or the
    /// connection cannot be rebuilt; the caller decides whether that
    /// terminates the process.
    pub async fn run(&self) -> Result<(), AmqpError> {
        let interval = self.connection.tuning().health_check_interval;

        loop {
            sleep(interval).await;

            if self.connection.is_recreating() {
                continue;
            }

            let previous = self.connection.active_host().await;

            self.connection.validate_host().await.map_err(|err| {
                error!(error = err.to_string(), "failed to validate rmq host");
                AmqpError::RecreationFailure(err.to_string())
            })?;

            let current = self.connection.active_host().await;
            if current == previous {
                continue;
            }

            info!(host = current.as_str(), "broker host changed, recreating connection");

            if !self.connection.try_begin_recreate() {
                continue;
            }

            let result = self.connection.recreate().await;
            self.connection.finish_recreate();

            match result {
                Ok(generation) => {
                    info!(generation, host = current.as_str(), "rmq connected to new host")
                }
                Err(err) => {
                    error!(error = err.to_string(), "failed to recreate rmq connection");
                    return Err(AmqpError::RecreationFailure(err.to_string()));
                }
            }
        }
    }
}

/// Probes whether `host:port` accepts TCP connections within the probe
/// timeout.
pub(crate) async fn tcp_reachable(host: &str, port: u16) -> bool {
    matches!(
        timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Resolves every address currently assigned to `host`.
pub(crate) async fn resolve_host(host: &str, port: u16) -> Result<Vec<SocketAddr>, AmqpError> {
    match lookup_host((host, port)).await {
        Ok(addrs) => Ok(addrs.collect()),
        Err(err) => {
            error!(error = err.to_string(), host, "failed to resolve host");
            Err(AmqpError::DnsError(host.to_owned(), err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Credentials, TopologyConfig},
        exchange::ExchangeKind,
    };
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probe_detects_a_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(tcp_reachable("127.0.0.1", port).await);

        drop(listener);
        assert!(!tcp_reachable("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn resolves_known_host() {
        let addrs = resolve_host("localhost", 5672).await.unwrap();
        assert!(!addrs.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_host_is_a_dns_error() {
        let err = resolve_host("broker.invalid", 5672).await.unwrap_err();
        assert!(matches!(err, AmqpError::DnsError(host, _) if host == "broker.invalid"));
    }

    #[tokio::test]
    async fn reachable_host_is_kept() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let connection = RabbitMQConnection::new(
            Credentials::new("127.0.0.1", port, "guest", "guest"),
            TopologyConfig::new("orders", ExchangeKind::Direct, "orders.q", "orders.created"),
        );

        connection.validate_host().await.unwrap();
        assert_eq!(connection.active_host().await, "127.0.0.1");
    }
}
