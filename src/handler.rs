// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Delivery Handler
//!
//! The seam between the consumer loop and application code. Callers provide
//! an implementation at construction time; there is no hidden default
//! handler.

use crate::errors::AmqpError;
use async_trait::async_trait;
use lapin::message::Delivery;

/// Processes one inbound delivery.
///
/// The delivery is handed off by the consumer loop and is not owned by the
/// connection afterwards. When the consume options use manual
/// acknowledgment, the loop acks on `Ok` and nacks (without requeue) on
/// `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<(), AmqpError>;
}
