// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Publisher
//!
//! This module publishes messages against the connection's current channel.
//! Every publish uses persistent delivery mode, the connection's configured
//! content type and headers, and a fresh message id. Routing defaults to the
//! configured exchange/routing key and can be overridden per call without
//! mutating the configuration.
//!
//! There is no internal retry: callers needing delivery guarantees retry
//! themselves or re-publish from their own buffer after a reset signal.

use crate::{connection::RabbitMQConnection, errors::AmqpError};
use lapin::{
    options::BasicPublishOptions,
    types::{FieldTable, ShortString},
    BasicProperties,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Options applied to every publish frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOpts {
    pub mandatory: bool,
    pub immediate: bool,
}

impl PublishOpts {
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub(crate) fn publish_options(&self) -> BasicPublishOptions {
        BasicPublishOptions {
            mandatory: self.mandatory,
            immediate: self.immediate,
        }
    }
}

/// Stateless publisher over a shared [`RabbitMQConnection`].
///
/// The publisher reads the channel through the connection's accessor on
/// every call, so a publish issued after a reconnect transparently uses the
/// recreated channel.
pub struct RabbitMQPublisher {
    connection: Arc<RabbitMQConnection>,
}

impl RabbitMQPublisher {
    pub fn new(connection: Arc<RabbitMQConnection>) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher { connection })
    }

    /// Publishes to the configured exchange with the configured routing key.
    pub async fn publish(&self, payload: &[u8]) -> Result<(), AmqpError> {
        let config = self.connection.config();
        self.publish_with_exchange(&config.exchange, &config.routing_key, payload)
            .await
    }

    /// Publishes to the configured exchange with a caller-supplied routing
    /// key.
    pub async fn publish_with_key(
        &self,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), AmqpError> {
        self.publish_with_exchange(&self.connection.config().exchange, routing_key, payload)
            .await
    }

    /// Publishes with both exchange and routing key overridden for this call.
    pub async fn publish_with_exchange(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;
        let options = self.connection.config().publish_opts.publish_options();
        let properties =
            outgoing_properties(self.connection.content_type(), self.connection.headers());

        match channel
            .basic_publish(exchange, routing_key, options, payload, properties)
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishError(err.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn outgoing_properties(content_type: &str, headers: &FieldTable) -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_content_type(ShortString::from(content_type))
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(headers.clone())
}
