// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Resilient Connection State
//!
//! This module owns the live connection/channel pair and the coordination
//! state the resilience loops operate on: the recreation guard, the reset
//! broadcast, the close-notification bridge, and the mutable active host.
//!
//! Ownership rules: the connection exclusively owns its transport connection
//! and channel. Replacing them is the recreation path's job and happens
//! under the handle write lock, so publishers and consumers reading the
//! channel block for the duration instead of racing against it.

use crate::{
    channel::new_amqp_connection,
    config::{ConnectionTuning, Credentials, TopologyConfig},
    errors::AmqpError,
    health::{resolve_host, tcp_reachable},
    topology,
};
use lapin::{types::FieldTable, Channel, Connection};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default content type stamped on outgoing publishes.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Capacity of the reset broadcast; a subscriber this far behind is lagging,
/// not waiting.
const RESET_CHANNEL_CAPACITY: usize = 16;

const CLOSE_REPLY_CODE: u16 = 200;

struct ConnectionHandles {
    connection: Connection,
    channel: Arc<Channel>,
}

/// A broker connection that survives broker-initiated closes.
///
/// Created empty, connected with [`connect`](Self::connect), then operated
/// on by [`RabbitMQPublisher`](crate::publisher::RabbitMQPublisher) and
/// [`RabbitMQConsumer`](crate::consumer::RabbitMQConsumer) while the
/// [`ReconnectCoordinator`](crate::reconnect::ReconnectCoordinator) and
/// [`HealthMonitor`](crate::health::HealthMonitor) watch it in the
/// background. Wrap it in an `Arc` and hand clones to each of them.
pub struct RabbitMQConnection {
    credentials: Credentials,
    config: TopologyConfig,
    tuning: ConnectionTuning,
    content_type: String,
    headers: FieldTable,
    active_host: RwLock<String>,
    handles: RwLock<Option<ConnectionHandles>>,
    recreating: AtomicBool,
    reset_generation: AtomicU64,
    reset_tx: broadcast::Sender<u64>,
    close_tx: mpsc::UnboundedSender<lapin::Error>,
    close_rx: Mutex<mpsc::UnboundedReceiver<lapin::Error>>,
}

impl RabbitMQConnection {
    /// Creates an unconnected connection with default tuning.
    pub fn new(credentials: Credentials, config: TopologyConfig) -> RabbitMQConnection {
        Self::with_tuning(credentials, config, ConnectionTuning::default())
    }

    /// Creates an unconnected connection with explicit tuning.
    pub fn with_tuning(
        credentials: Credentials,
        config: TopologyConfig,
        tuning: ConnectionTuning,
    ) -> RabbitMQConnection {
        let (reset_tx, _) = broadcast::channel(RESET_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = mpsc::unbounded_channel();

        RabbitMQConnection {
            active_host: RwLock::new(credentials.host.clone()),
            credentials,
            config,
            tuning,
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            headers: FieldTable::default(),
            handles: RwLock::new(None),
            recreating: AtomicBool::new(false),
            reset_generation: AtomicU64::new(0),
            reset_tx,
            close_tx,
            close_rx: Mutex::new(close_rx),
        }
    }

    /// Sets the headers stamped on outgoing publishes.
    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    /// Overrides the content type stamped on outgoing publishes.
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_owned();
        self
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn tuning(&self) -> &ConnectionTuning {
        &self.tuning
    }

    pub(crate) fn content_type(&self) -> &str {
        &self.content_type
    }

    pub(crate) fn headers(&self) -> &FieldTable {
        &self.headers
    }

    /// The host currently dialed. Starts as the configured hostname; the
    /// health monitor may replace it with a resolved IP address.
    pub async fn active_host(&self) -> String {
        self.active_host.read().await.clone()
    }

    /// Dials the broker and, when `declare_topology` is set, declares the
    /// configured topology over a fresh channel.
    ///
    /// The internal handles are replaced only after every step succeeds; a
    /// failed connect leaves a previously working connection untouched.
    pub async fn connect(&self, declare_topology: bool) -> Result<(), AmqpError> {
        let handles = self.dial(declare_topology).await?;
        *self.handles.write().await = Some(handles);

        Ok(())
    }

    async fn dial(&self, declare_topology: bool) -> Result<ConnectionHandles, AmqpError> {
        let host = self.active_host().await;
        let (connection, channel) = new_amqp_connection(&self.credentials, &host).await?;

        // every new transport connection gets its own close listener;
        // without this, a second close would go undetected
        let close_tx = self.close_tx.clone();
        connection.on_error(move |err| {
            let _ = close_tx.send(err);
        });

        if declare_topology {
            topology::apply_config(&channel, &self.config).await?;
        }

        Ok(ConnectionHandles {
            connection,
            channel: Arc::new(channel),
        })
    }

    /// The current channel. Blocks while a recreation holds the write lock,
    /// so callers observe either the old channel or the new one, never a
    /// half-built state.
    pub async fn channel(&self) -> Result<Arc<Channel>, AmqpError> {
        self.handles
            .read()
            .await
            .as_ref()
            .map(|handles| handles.channel.clone())
            .ok_or(AmqpError::NotConnected)
    }

    /// Whether the transport connection reports itself connected.
    pub async fn is_connected(&self) -> bool {
        match self.handles.read().await.as_ref() {
            Some(handles) => handles.connection.status().connected(),
            None => false,
        }
    }

    pub(crate) async fn is_open(&self) -> bool {
        self.handles.read().await.is_some()
    }

    /// Closes the channel and connection and empties the handle slot.
    pub async fn close(&self) -> Result<(), AmqpError> {
        let handles = self.handles.write().await.take();

        if let Some(handles) = handles {
            debug!("closing amqp channel and connection");

            if let Err(err) = handles.channel.close(CLOSE_REPLY_CODE, "closing").await {
                warn!(error = err.to_string(), "error to close the channel");
            }

            if let Err(err) = handles.connection.close(CLOSE_REPLY_CODE, "closing").await {
                warn!(error = err.to_string(), "error to close the connection");
            }
        }

        Ok(())
    }

    /// Claims the recreation guard. Exactly one caller wins when several
    /// observers race to rebuild the connection.
    pub(crate) fn try_begin_recreate(&self) -> bool {
        self.recreating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn finish_recreate(&self) {
        self.recreating.store(false, Ordering::SeqCst);
    }

    /// Whether a recreation is currently in flight.
    pub fn is_recreating(&self) -> bool {
        self.recreating.load(Ordering::SeqCst)
    }

    /// Subscribes to the reset broadcast. Every subscriber receives every
    /// generation emitted after it subscribed.
    pub fn subscribe_reset(&self) -> broadcast::Receiver<u64> {
        self.reset_tx.subscribe()
    }

    pub(crate) fn broadcast_reset(&self) -> u64 {
        let generation = self.reset_generation.fetch_add(1, Ordering::SeqCst) + 1;

        // a send error only means no subscriber is registered right now
        let _ = self.reset_tx.send(generation);

        generation
    }

    /// Rebuilds the connection and topology, then broadcasts one reset
    /// generation. The caller must hold the recreation guard.
    ///
    /// The handle write lock is held across the whole dial, so channel
    /// readers wait instead of observing the dead connection.
    pub(crate) async fn recreate(&self) -> Result<u64, AmqpError> {
        let host = self.active_host().await;
        info!(host = host.as_str(), "recreating rmq connection");

        let mut guard = self.handles.write().await;
        let handles = self.dial(true).await?;
        *guard = Some(handles);
        drop(guard);

        Ok(self.broadcast_reset())
    }

    pub(crate) async fn next_close_event(&self) -> Option<lapin::Error> {
        self.close_rx.lock().await.recv().await
    }

    #[cfg(test)]
    pub(crate) fn inject_close_event(&self, err: lapin::Error) {
        let _ = self.close_tx.send(err);
    }

    /// Checks that the active host is reachable; when it is not, resolves
    /// the hostname and switches to the first reachable resolved address.
    pub(crate) async fn validate_host(&self) -> Result<(), AmqpError> {
        let host = self.active_host().await;
        let port = self.credentials.port;

        if tcp_reachable(&host, port).await {
            return Ok(());
        }

        warn!(host = host.as_str(), "broker host unreachable, resolving dns");

        for addr in resolve_host(&host, port).await? {
            let candidate = addr.ip().to_string();

            if tcp_reachable(&candidate, port).await {
                info!(host = candidate.as_str(), "switching to resolved broker address");
                *self.active_host.write().await = candidate;
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeKind;

    fn test_connection(host: &str, port: u16) -> RabbitMQConnection {
        RabbitMQConnection::new(
            Credentials::new(host, port, "guest", "guest"),
            TopologyConfig::new("orders", ExchangeKind::Direct, "orders.q", "orders.created"),
        )
    }

    #[tokio::test]
    async fn connect_with_empty_host_fails_before_io() {
        let connection = test_connection("", 5672);
        let err = connection.connect(true).await.unwrap_err();
        assert!(matches!(err, AmqpError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn failed_dial_leaves_the_handle_slot_untouched() {
        let connection = test_connection("127.0.0.1", 1);

        let err = connection.connect(true).await.unwrap_err();
        assert!(matches!(err, AmqpError::DialError(_)));

        assert!(matches!(connection.channel().await, Err(AmqpError::NotConnected)));
        assert!(!connection.is_connected().await);
        assert!(!connection.is_open().await);
    }

    #[test]
    fn recreation_guard_admits_exactly_one() {
        let connection = test_connection("localhost", 5672);

        assert!(connection.try_begin_recreate());
        assert!(connection.is_recreating());
        assert!(!connection.try_begin_recreate());

        connection.finish_recreate();
        assert!(!connection.is_recreating());
        assert!(connection.try_begin_recreate());
    }

    #[tokio::test]
    async fn racing_observers_admit_a_single_recreation() {
        let connection = Arc::new(test_connection("localhost", 5672));

        let mut attempts = Vec::new();
        for _ in 0..8 {
            let connection = connection.clone();
            attempts.push(tokio::spawn(async move { connection.try_begin_recreate() }));
        }

        let mut admitted = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn reset_broadcast_reaches_every_subscriber() {
        let connection = test_connection("localhost", 5672);

        let mut consumer_side = connection.subscribe_reset();
        let mut publisher_side = connection.subscribe_reset();

        assert_eq!(connection.broadcast_reset(), 1);
        assert_eq!(consumer_side.recv().await.unwrap(), 1);
        assert_eq!(publisher_side.recv().await.unwrap(), 1);

        assert_eq!(connection.broadcast_reset(), 2);
        assert_eq!(consumer_side.recv().await.unwrap(), 2);
        assert_eq!(publisher_side.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn close_events_reach_the_listener_side() {
        let connection = test_connection("localhost", 5672);

        connection
            .close_tx
            .send(lapin::Error::InvalidConnectionState(
                lapin::ConnectionState::Error,
            ))
            .unwrap();

        let event = connection.next_close_event().await.unwrap();
        assert!(matches!(event, lapin::Error::InvalidConnectionState(_)));
    }

    #[tokio::test]
    async fn builders_override_publish_metadata() {
        let connection = test_connection("localhost", 5672)
            .with_content_type("application/octet-stream");

        assert_eq!(connection.content_type(), "application/octet-stream");
        assert_eq!(connection.active_host().await, "localhost");
    }
}
