// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Topology Declaration
//!
//! This module declares the routing topology described by a
//! [`TopologyConfig`](crate::config::TopologyConfig) against an open
//! channel: exchange, QoS, queue, and the queue-to-exchange binding, in that
//! fixed order. QoS must be in place before consumption begins, and the
//! binding requires both the exchange and the queue to exist.
//!
//! Declarations are idempotent for identical parameters. Redeclaring with
//! conflicting parameters surfaces the broker's PRECONDITION_FAILED as a
//! [`TopologyConflictError`](crate::errors::AmqpError::TopologyConflictError),
//! which is never worth retrying.

use crate::{config::TopologyConfig, errors::AmqpError};
use lapin::{
    protocol::{AMQPErrorKind, AMQPSoftError},
    Channel,
};
use tracing::{debug, error};

/// Declares the full topology for one configuration.
///
/// Steps run in a fixed order: declare exchange, set QoS, declare queue,
/// bind queue to exchange with the routing key. The declarator holds no
/// state; re-invoking with identical parameters never errors.
pub async fn apply_config(channel: &Channel, config: &TopologyConfig) -> Result<(), AmqpError> {
    declare_exchange(channel, config).await?;
    apply_qos(channel, config).await?;
    declare_queue(channel, config).await?;
    bind_queue(channel, config).await
}

/// Declares several topologies against one already-open channel, used when
/// a single connection serves multiple logical queues.
pub async fn declare_additional(
    channel: &Channel,
    configs: &[TopologyConfig],
) -> Result<(), AmqpError> {
    for config in configs {
        apply_config(channel, config).await?;
    }

    Ok(())
}

async fn declare_exchange(channel: &Channel, config: &TopologyConfig) -> Result<(), AmqpError> {
    if config.exchange.is_empty() {
        // the default exchange pre-exists and cannot be redeclared
        debug!("default exchange in use, skipping declaration");
        return Ok(());
    }

    debug!("declaring exchange: {}", config.exchange);

    match channel
        .exchange_declare(
            &config.exchange,
            config.exchange_kind.clone().into(),
            config.exchange_opts.declare_options(),
            config.exchange_opts.arguments.clone(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = config.exchange.as_str(),
                "error to declare the exchange"
            );
            Err(conflict_or(&config.exchange, err, |reason| {
                AmqpError::DeclareExchangeError(config.exchange.clone(), reason)
            }))
        }
        _ => {
            debug!("exchange: {} was declared", config.exchange);
            Ok(())
        }
    }
}

async fn apply_qos(channel: &Channel, config: &TopologyConfig) -> Result<(), AmqpError> {
    debug!("applying qos, prefetch: {}", config.qos.prefetch_count);

    channel
        .basic_qos(config.qos.prefetch_count, config.qos.qos_options())
        .await
        .map_err(|err| {
            error!(error = err.to_string(), "error to configure qos");
            AmqpError::QosError(err.to_string())
        })
}

async fn declare_queue(channel: &Channel, config: &TopologyConfig) -> Result<(), AmqpError> {
    debug!("declaring queue: {}", config.queue);

    match channel
        .queue_declare(
            &config.queue,
            config.queue_opts.declare_options(),
            config.queue_opts.arguments.clone(),
        )
        .await
    {
        Err(err) => {
            error!(
                error = err.to_string(),
                name = config.queue.as_str(),
                "error to declare the queue"
            );
            Err(conflict_or(&config.queue, err, |reason| {
                AmqpError::DeclareQueueError(config.queue.clone(), reason)
            }))
        }
        _ => {
            debug!("queue: {} was declared", config.queue);
            Ok(())
        }
    }
}

async fn bind_queue(channel: &Channel, config: &TopologyConfig) -> Result<(), AmqpError> {
    if config.exchange.is_empty() {
        // every queue is implicitly bound to the default exchange by name
        debug!("default exchange in use, skipping binding");
        return Ok(());
    }

    debug!(
        "binding queue: {} to the exchange: {} with the key: {}",
        config.queue, config.exchange, config.routing_key
    );

    match channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.routing_key,
            config.bind_opts.bind_options(),
            config.bind_opts.arguments.clone(),
        )
        .await
    {
        Err(err) => {
            error!(error = err.to_string(), "error to bind queue to exchange");
            Err(AmqpError::BindQueueError(
                config.queue.clone(),
                config.exchange.clone(),
                err.to_string(),
            ))
        }
        _ => {
            debug!("queue was bound");
            Ok(())
        }
    }
}

pub(crate) fn is_precondition_failed(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(protocol_err) => matches!(
            protocol_err.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
        ),
        _ => false,
    }
}

fn conflict_or(
    entity: &str,
    err: lapin::Error,
    fallback: impl FnOnce(String) -> AmqpError,
) -> AmqpError {
    if is_precondition_failed(&err) {
        AmqpError::TopologyConflictError(entity.to_owned(), err.to_string())
    } else {
        fallback(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::{
        protocol::{AMQPError, AMQPHardError},
        types::ShortString,
    };

    fn precondition_failed() -> lapin::Error {
        lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED),
            ShortString::from("PRECONDITION_FAILED - inequivalent arg 'durable'"),
        ))
    }

    fn internal_error() -> lapin::Error {
        lapin::Error::ProtocolError(AMQPError::new(
            AMQPErrorKind::Hard(AMQPHardError::INTERNALERROR),
            ShortString::from("INTERNAL_ERROR"),
        ))
    }

    #[test]
    fn detects_precondition_failed() {
        assert!(is_precondition_failed(&precondition_failed()));
        assert!(!is_precondition_failed(&internal_error()));
    }

    #[test]
    fn conflicting_redeclaration_maps_to_topology_conflict() {
        let err = conflict_or("orders.q", precondition_failed(), |reason| {
            AmqpError::DeclareQueueError("orders.q".to_owned(), reason)
        });
        assert!(matches!(err, AmqpError::TopologyConflictError(name, _) if name == "orders.q"));
    }

    #[test]
    fn other_failures_keep_the_step_error() {
        let err = conflict_or("orders.q", internal_error(), |reason| {
            AmqpError::DeclareQueueError("orders.q".to_owned(), reason)
        });
        assert!(matches!(err, AmqpError::DeclareQueueError(name, _) if name == "orders.q"));
    }
}
