// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Message Consumer
//!
//! This module subscribes to a queue and dispatches inbound deliveries to a
//! caller-supplied [`DeliveryHandler`]. The delivery loop runs on its own
//! task; `consume` blocks its caller until the `done` signal fires, then
//! closes the channel and connection.
//!
//! A broker-initiated close is not an error here: the delivery stream simply
//! ends, `consume` keeps blocking, and the reconnect coordinator rebuilds
//! the connection and broadcasts a reset so the caller can consume again.

use crate::{
    config::TopologyConfig, connection::RabbitMQConnection, errors::AmqpError,
    handler::DeliveryHandler, topology,
};
use futures_util::StreamExt;
use lapin::{
    options::{BasicAckOptions, BasicConsumeOptions, BasicNackOptions},
    types::FieldTable,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Options applied when subscribing a consumer.
///
/// Defaults to automatic acknowledgment; switch to
/// [`manual_ack`](Self::manual_ack) to have the delivery loop ack/nack per
/// handler result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeOpts {
    pub auto_ack: bool,
    pub exclusive: bool,
    pub no_local: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for ConsumeOpts {
    fn default() -> Self {
        ConsumeOpts {
            auto_ack: true,
            exclusive: false,
            no_local: false,
            no_wait: false,
            arguments: FieldTable::default(),
        }
    }
}

impl ConsumeOpts {
    /// Disables automatic acknowledgment.
    pub fn manual_ack(mut self) -> Self {
        self.auto_ack = false;
        self
    }

    /// Makes the subscription exclusive to this consumer.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    pub fn no_local(mut self) -> Self {
        self.no_local = true;
        self
    }

    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    pub fn arguments(mut self, arguments: FieldTable) -> Self {
        self.arguments = arguments;
        self
    }

    pub(crate) fn consume_options(&self) -> BasicConsumeOptions {
        BasicConsumeOptions {
            no_local: self.no_local,
            no_ack: self.auto_ack,
            exclusive: self.exclusive,
            nowait: self.no_wait,
        }
    }
}

/// Blocking consumer over a shared [`RabbitMQConnection`].
pub struct RabbitMQConsumer {
    connection: Arc<RabbitMQConnection>,
}

impl RabbitMQConsumer {
    pub fn new(connection: Arc<RabbitMQConnection>) -> RabbitMQConsumer {
        RabbitMQConsumer { connection }
    }

    /// Consumes from the configured queue until `done` fires.
    ///
    /// A dropped `done` sender counts as a shutdown request. On shutdown the
    /// channel and connection are closed before returning.
    pub async fn consume(
        &self,
        done: oneshot::Receiver<()>,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<(), AmqpError> {
        let config = self.connection.config().clone();
        self.subscribe(&config, handler).await?;
        self.wait_for_shutdown(done).await
    }

    /// Consumes a differently-configured queue over the live channel,
    /// declaring its topology first. Lets one connection serve another
    /// logical queue without re-dialing.
    pub async fn consume_with_config(
        &self,
        done: oneshot::Receiver<()>,
        config: &TopologyConfig,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;
        topology::declare_additional(&channel, std::slice::from_ref(config)).await?;

        self.subscribe(config, handler).await?;
        self.wait_for_shutdown(done).await
    }

    async fn subscribe(
        &self,
        config: &TopologyConfig,
        handler: Arc<dyn DeliveryHandler>,
    ) -> Result<(), AmqpError> {
        let channel = self.connection.channel().await?;

        let consumer = match channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                config.consume_opts.consume_options(),
                config.consume_opts.arguments.clone(),
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = config.queue.as_str(),
                    "error to create the consumer"
                );
                return Err(AmqpError::SubscribeError(config.queue.clone(), err.to_string()));
            }
        };

        tokio::spawn(deliver_loop(
            consumer,
            handler,
            config.consume_opts.auto_ack,
        ));

        info!(queue = config.queue.as_str(), "waiting for messages...");

        Ok(())
    }

    async fn wait_for_shutdown(&self, done: oneshot::Receiver<()>) -> Result<(), AmqpError> {
        let _ = done.await;

        debug!("consumer shutdown requested");
        self.connection.close().await
    }
}

async fn deliver_loop(
    mut consumer: lapin::Consumer,
    handler: Arc<dyn DeliveryHandler>,
    auto_ack: bool,
) {
    while let Some(result) = consumer.next().await {
        match result {
            Ok(delivery) => match handler.handle(&delivery).await {
                Ok(()) => {
                    if !auto_ack {
                        if let Err(err) = delivery.ack(BasicAckOptions { multiple: false }).await {
                            error!(error = err.to_string(), "error whiling ack msg");
                        }
                    }
                }
                Err(err) => {
                    warn!(error = err.to_string(), "handler failed for delivery");

                    if !auto_ack {
                        if let Err(err) = delivery
                            .nack(BasicNackOptions {
                                multiple: false,
                                requeue: false,
                            })
                            .await
                        {
                            error!(error = err.to_string(), "error whiling nack msg");
                        }
                    }
                }
            },
            Err(err) => error!(error = err.to_string(), "errors consume msg"),
        }
    }

    debug!("delivery stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_consume_opts_auto_ack() {
        let opts = ConsumeOpts::default();
        assert!(opts.auto_ack);
        assert!(!opts.exclusive);
        assert!(!opts.no_local);
        assert!(!opts.no_wait);
    }

    #[test]
    fn consume_options_map_auto_ack_to_no_ack() {
        assert!(ConsumeOpts::default().consume_options().no_ack);
        assert!(!ConsumeOpts::default().manual_ack().consume_options().no_ack);
    }

    #[test]
    fn consume_options_map_every_flag() {
        let options = ConsumeOpts::default()
            .manual_ack()
            .exclusive()
            .no_local()
            .no_wait()
            .consume_options();

        assert!(!options.no_ack);
        assert!(options.exclusive);
        assert!(options.no_local);
        assert!(options.nowait);
    }
}
