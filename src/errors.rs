// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Resilient RabbitMQ Client
//!
//! This module provides the error types for connection, topology, publishing,
//! consuming, and reconnection operations. The `AmqpError` enum covers every
//! failure scenario the crate can surface, with context about what failed.

use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
///
/// Configuration errors are detected before any I/O and are never retried.
/// Dial, subscribe, and publish errors surface synchronously to the caller
/// of the corresponding operation. `RecreationFailure` is the one fatal
/// variant: it means the reconnect path could not rebuild the connection and
/// the process should be handed back to its supervisor.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Missing or invalid credentials/topology configuration
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// An operation was attempted before a successful connect
    #[error("connection has not been established")]
    NotConnected,

    /// The transport handshake with the broker failed
    #[error("failure to connect to the broker: {0}")]
    DialError(String),

    /// Error creating a channel from an established connection
    #[error("failure to create a channel: {0}")]
    ChannelError(String),

    /// Error declaring an exchange with the given name
    #[error("failure to declare the exchange `{0}`: {1}")]
    DeclareExchangeError(String, String),

    /// Error declaring a queue with the given name
    #[error("failure to declare the queue `{0}`: {1}")]
    DeclareQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos: {0}")]
    QosError(String),

    /// Error binding a queue to an exchange
    #[error("failure to bind queue `{0}` to exchange `{1}`: {2}")]
    BindQueueError(String, String, String),

    /// A declare was issued over an existing exchange/queue with
    /// incompatible parameters; retrying cannot succeed
    #[error("conflicting redeclaration of `{0}`: {1}")]
    TopologyConflictError(String, String),

    /// Error subscribing a consumer to a queue
    #[error("failure to start consuming from `{0}`: {1}")]
    SubscribeError(String, String),

    /// Error publishing a message
    #[error("failure to publish: {0}")]
    PublishError(String),

    /// Error resolving the broker hostname
    #[error("failure to resolve broker host `{0}`: {1}")]
    DnsError(String, String),

    /// The reconnect path could not rebuild the connection after a close
    /// event; the caller decides whether to terminate the process
    #[error("failure to recreate the connection: {0}")]
    RecreationFailure(String),
}
