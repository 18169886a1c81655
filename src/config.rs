// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection and Topology Configuration
//!
//! This module provides the immutable configuration the rest of the crate
//! operates on: broker credentials, the topology description (exchange,
//! queue, binding, and their option groups), and the tuning knobs for the
//! reconnect and health-check loops.
//!
//! Configuration is read once at startup, either explicitly or from the
//! environment (`.env` files are honored). Reconnection never re-reads the
//! environment; it reuses the in-memory config, except for the broker host,
//! which the health monitor may rewrite with a resolved IP address.

use crate::{
    consumer::ConsumeOpts,
    errors::AmqpError,
    exchange::{ExchangeKind, ExchangeOpts},
    publisher::PublishOpts,
    queue::{QoSOpts, QueueBindOpts, QueueOpts},
};
use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};

const ENV_HOST: &str = "RMQ_HOST";
const ENV_PORT: &str = "RMQ_PORT";
const ENV_USERNAME: &str = "RMQ_USERNAME";
const ENV_PASSWORD: &str = "RMQ_PASSWORD";
const ENV_EXCHANGE: &str = "RMQ_EXCHANGE";
const ENV_EXCHANGE_KIND: &str = "RMQ_EXCHANGE_KIND";
const ENV_QUEUE: &str = "RMQ_QUEUE";
const ENV_ROUTING_KEY: &str = "RMQ_ROUTING_KEY";
const ENV_CONSUMER_TAG: &str = "RMQ_CONSUMER_TAG";

/// Default wait before a reconnect attempt after the broker closes the
/// connection, giving a recovering broker room to come back.
pub const DEFAULT_RECONNECT_WAIT: Duration = Duration::from_secs(20);

/// Default interval between broker reachability checks.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

/// Broker credentials. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials {
            host: "localhost".to_owned(),
            port: 5672,
            username: "guest".to_owned(),
            password: "guest".to_owned(),
        }
    }
}

impl Credentials {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Credentials {
        Credentials {
            host: host.to_owned(),
            port,
            username: username.to_owned(),
            password: password.to_owned(),
        }
    }

    /// Reads credentials from the environment.
    ///
    /// Variables: `RMQ_HOST` (localhost), `RMQ_PORT` (5672), `RMQ_USERNAME`
    /// (guest), `RMQ_PASSWORD` (guest). Empty values fall back to the
    /// defaults.
    pub fn from_env() -> Result<Credentials, AmqpError> {
        dotenv::dotenv().ok();

        let port = env_or(ENV_PORT, "5672");
        let port = port.parse::<u16>().map_err(|_| {
            AmqpError::ConfigurationError(format!("invalid broker port `{port}`"))
        })?;

        Ok(Credentials {
            host: env_or(ENV_HOST, "localhost"),
            port,
            username: env_or(ENV_USERNAME, "guest"),
            password: env_or(ENV_PASSWORD, "guest"),
        })
    }

    pub(crate) fn validate(&self) -> Result<(), AmqpError> {
        if self.host.is_empty() {
            return Err(AmqpError::ConfigurationError(
                "broker host must not be empty".to_owned(),
            ));
        }

        if self.port == 0 {
            return Err(AmqpError::ConfigurationError(
                "broker port must not be zero".to_owned(),
            ));
        }

        Ok(())
    }
}

/// Immutable description of the exchange/queue/binding topology one
/// connection declares and operates on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub exchange: String,
    pub exchange_kind: ExchangeKind,
    pub queue: String,
    pub routing_key: String,
    #[serde(default)]
    pub consumer_tag: String,
    #[serde(default)]
    pub exchange_opts: ExchangeOpts,
    #[serde(default)]
    pub queue_opts: QueueOpts,
    #[serde(default)]
    pub qos: QoSOpts,
    #[serde(default)]
    pub bind_opts: QueueBindOpts,
    #[serde(default)]
    pub consume_opts: ConsumeOpts,
    #[serde(default)]
    pub publish_opts: PublishOpts,
}

impl TopologyConfig {
    /// Creates a topology description with default option groups.
    pub fn new(
        exchange: &str,
        exchange_kind: ExchangeKind,
        queue: &str,
        routing_key: &str,
    ) -> TopologyConfig {
        TopologyConfig {
            exchange: exchange.to_owned(),
            exchange_kind,
            queue: queue.to_owned(),
            routing_key: routing_key.to_owned(),
            ..TopologyConfig::default()
        }
    }

    /// Reads the topology description from the environment.
    ///
    /// Variables: `RMQ_EXCHANGE` (empty), `RMQ_EXCHANGE_KIND` (direct),
    /// `RMQ_QUEUE` (empty), `RMQ_ROUTING_KEY` (empty), `RMQ_CONSUMER_TAG`
    /// (empty). Option groups take their defaults.
    pub fn from_env() -> Result<TopologyConfig, AmqpError> {
        dotenv::dotenv().ok();

        Ok(TopologyConfig {
            exchange: env_or(ENV_EXCHANGE, ""),
            exchange_kind: ExchangeKind::from_str(&env_or(ENV_EXCHANGE_KIND, "direct"))?,
            queue: env_or(ENV_QUEUE, ""),
            routing_key: env_or(ENV_ROUTING_KEY, ""),
            consumer_tag: env_or(ENV_CONSUMER_TAG, ""),
            ..TopologyConfig::default()
        })
    }

    pub fn consumer_tag(mut self, tag: &str) -> Self {
        self.consumer_tag = tag.to_owned();
        self
    }

    pub fn exchange_opts(mut self, opts: ExchangeOpts) -> Self {
        self.exchange_opts = opts;
        self
    }

    pub fn queue_opts(mut self, opts: QueueOpts) -> Self {
        self.queue_opts = opts;
        self
    }

    pub fn qos(mut self, opts: QoSOpts) -> Self {
        self.qos = opts;
        self
    }

    pub fn bind_opts(mut self, opts: QueueBindOpts) -> Self {
        self.bind_opts = opts;
        self
    }

    pub fn consume_opts(mut self, opts: ConsumeOpts) -> Self {
        self.consume_opts = opts;
        self
    }

    pub fn publish_opts(mut self, opts: PublishOpts) -> Self {
        self.publish_opts = opts;
        self
    }
}

/// Timing configuration for the reconnect and health-check loops.
///
/// Passed at construction; there is no process-wide shared timer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTuning {
    pub reconnect_wait: Duration,
    pub health_check_interval: Duration,
}

impl Default for ConnectionTuning {
    fn default() -> Self {
        ConnectionTuning {
            reconnect_wait: DEFAULT_RECONNECT_WAIT,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
        }
    }
}

impl ConnectionTuning {
    pub fn reconnect_wait(mut self, wait: Duration) -> Self {
        self.reconnect_wait = wait;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }
}
