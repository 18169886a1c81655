// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Reconnect Coordination
//!
//! This module owns the detect-wait-recreate-broadcast cycle. The
//! coordinator listens for broker-initiated close notifications, waits the
//! configured interval so a recovering broker is not hammered, revalidates
//! the host with the same logic the health monitor uses, rebuilds the
//! connection and topology, and broadcasts exactly one reset generation.
//!
//! Recreation failures are not handled internally: the coordinator returns
//! [`RecreationFailure`](crate::errors::AmqpError::RecreationFailure) and
//! the top-level caller decides whether to terminate the process so an
//! external supervisor restarts it.

use crate::{connection::RabbitMQConnection, errors::AmqpError};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

/// Conventional exit code for binaries that terminate on
/// [`RecreationFailure`](crate::errors::AmqpError::RecreationFailure),
/// distinct enough for a supervisor to tell it apart from a crash.
pub const SUPERVISOR_EXIT_CODE: i32 = 101;

/// Resumes one side of the workload after a successful reconnect.
///
/// Typical implementations re-invoke `consume` on the consumer side or
/// re-publish a buffered backlog on the publisher side. Hooks are supplied
/// explicitly; nothing runs on reset unless the caller registered it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RestartHook: Send + Sync {
    async fn on_reset(&self, generation: u64) -> Result<(), AmqpError>;
}

/// Serializes reconnect attempts over a shared [`RabbitMQConnection`].
pub struct ReconnectCoordinator {
    connection: Arc<RabbitMQConnection>,
}

impl ReconnectCoordinator {
    pub fn new(connection: Arc<RabbitMQConnection>) -> ReconnectCoordinator {
        ReconnectCoordinator { connection }
    }

    /// Runs `hook` once per reset generation, forever, on its own task.
    ///
    /// Each hook gets its own broadcast subscription, so every registered
    /// hook observes every reset.
    pub fn spawn_restart_hook(&self, hook: Arc<dyn RestartHook>) -> JoinHandle<()> {
        let mut reset = self.connection.subscribe_reset();

        tokio::spawn(async move {
            loop {
                match reset.recv().await {
                    Ok(generation) => {
                        debug!(generation, "reset signal received");

                        if let Err(err) = hook.on_reset(generation).await {
                            error!(error = err.to_string(), generation, "restart hook failed");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "restart hook lagged behind reset signals");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Blocks listening for broker-initiated close notifications and drives
    /// the reconnect cycle for each one.
    ///
    /// At most one recreation is in flight at any time: a close event that
    /// arrives while the guard is taken is logged and dropped. Close events
    /// observed after the connection was closed locally are ignored. Returns
    /// only on `RecreationFailure`, or once the connection is dropped.
    ///
    /// The close listener itself is re-registered on every new transport
    /// connection inside the dial path, so a successful recreation is
    /// already listening for the next close.
    pub async fn run(&self) -> Result<(), AmqpError> {
        loop {
            let Some(err) = self.connection.next_close_event().await else {
                return Ok(());
            };

            if !self.connection.is_open().await {
                debug!("connection closed locally, ignoring close event");
                continue;
            }

            warn!(error = err.to_string(), "rmq connection lost");

            if !self.connection.try_begin_recreate() {
                debug!("reconnect already in progress, ignoring close event");
                continue;
            }

            let wait = self.connection.tuning().reconnect_wait;
            info!("reconnecting to rmq in {:?}...", wait);
            sleep(wait).await;

            let result = self.recreate().await;
            self.connection.finish_recreate();

            match result {
                Ok(generation) => info!(generation, "rmq connection recreated"),
                Err(err) => {
                    error!(error = err.to_string(), "failed to recreate rmq connection");
                    return Err(AmqpError::RecreationFailure(err.to_string()));
                }
            }
        }
    }

    async fn recreate(&self) -> Result<u64, AmqpError> {
        self.connection.validate_host().await?;
        self.connection.recreate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{Credentials, TopologyConfig},
        exchange::ExchangeKind,
    };
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_connection() -> Arc<RabbitMQConnection> {
        Arc::new(RabbitMQConnection::new(
            Credentials::default(),
            TopologyConfig::new("orders", ExchangeKind::Direct, "orders.q", "orders.created"),
        ))
    }

    #[tokio::test]
    async fn restart_hook_runs_once_per_reset() {
        let connection = test_connection();
        let coordinator = ReconnectCoordinator::new(connection.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut hook = MockRestartHook::new();
        hook.expect_on_reset().returning(move |generation| {
            tx.send(generation).unwrap();
            Ok(())
        });

        let worker = coordinator.spawn_restart_hook(Arc::new(hook));

        let first = connection.broadcast_reset();
        assert_eq!(rx.recv().await, Some(first));

        let second = connection.broadcast_reset();
        assert_eq!(rx.recv().await, Some(second));
        assert_eq!(second, first + 1);

        worker.abort();
    }

    #[tokio::test]
    async fn every_registered_hook_observes_the_same_reset() {
        let connection = test_connection();
        let coordinator = ReconnectCoordinator::new(connection.clone());

        let (consumer_tx, mut consumer_rx) = mpsc::unbounded_channel();
        let mut consumer_hook = MockRestartHook::new();
        consumer_hook.expect_on_reset().returning(move |generation| {
            consumer_tx.send(generation).unwrap();
            Ok(())
        });

        let (publisher_tx, mut publisher_rx) = mpsc::unbounded_channel();
        let mut publisher_hook = MockRestartHook::new();
        publisher_hook.expect_on_reset().returning(move |generation| {
            publisher_tx.send(generation).unwrap();
            Ok(())
        });

        let consumer_worker = coordinator.spawn_restart_hook(Arc::new(consumer_hook));
        let publisher_worker = coordinator.spawn_restart_hook(Arc::new(publisher_hook));

        let generation = connection.broadcast_reset();
        assert_eq!(consumer_rx.recv().await, Some(generation));
        assert_eq!(publisher_rx.recv().await, Some(generation));

        consumer_worker.abort();
        publisher_worker.abort();
    }

    #[tokio::test]
    async fn close_events_after_local_close_are_ignored() {
        let connection = test_connection();
        let coordinator = ReconnectCoordinator::new(connection.clone());

        let worker = tokio::spawn(async move { coordinator.run().await });

        // the handle slot is empty, so this must not start a recreation
        connection.inject_close_event(lapin::Error::InvalidConnectionState(
            lapin::ConnectionState::Error,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!connection.is_recreating());
        assert!(!worker.is_finished());

        worker.abort();
    }
}
