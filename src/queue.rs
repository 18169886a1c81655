// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue, Binding and QoS Configuration
//!
//! This module provides the option groups for queue declaration, queue
//! binding, and consumer QoS. The defaults describe a durable queue with a
//! prefetch of one unacknowledged message, which is what the topology
//! declarator installs when nothing is overridden.

use lapin::{
    options::{BasicQosOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use serde::{Deserialize, Serialize};

/// Options applied when declaring a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueOpts {
    pub durable: bool,
    pub delete_when_unused: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for QueueOpts {
    fn default() -> Self {
        QueueOpts {
            durable: true,
            delete_when_unused: false,
            exclusive: false,
            no_wait: false,
            arguments: FieldTable::default(),
        }
    }
}

impl QueueOpts {
    /// Makes the queue transient, removing it on broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Deletes the queue once its last consumer unsubscribes.
    pub fn delete_when_unused(mut self) -> Self {
        self.delete_when_unused = true;
        self
    }

    /// Makes the queue exclusive to the declaring connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Sets the no_wait flag, making the declaration non-blocking.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Sets additional declaration arguments.
    pub fn arguments(mut self, arguments: FieldTable) -> Self {
        self.arguments = arguments;
        self
    }

    pub(crate) fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.delete_when_unused,
            nowait: self.no_wait,
        }
    }
}

/// Options applied when binding a queue to an exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueBindOpts {
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl QueueBindOpts {
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    pub fn arguments(mut self, arguments: FieldTable) -> Self {
        self.arguments = arguments;
        self
    }

    pub(crate) fn bind_options(&self) -> QueueBindOptions {
        QueueBindOptions { nowait: self.no_wait }
    }
}

/// Consumer prefetch limits.
///
/// `prefetch_count` bounds how many unacknowledged deliveries a consumer may
/// hold at once; `global` applies the limit to the whole channel instead of
/// each consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QoSOpts {
    pub prefetch_count: u16,
    pub global: bool,
}

impl Default for QoSOpts {
    fn default() -> Self {
        QoSOpts {
            prefetch_count: 1,
            global: false,
        }
    }
}

impl QoSOpts {
    pub fn prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = count;
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub(crate) fn qos_options(&self) -> BasicQosOptions {
        BasicQosOptions { global: self.global }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_queue_opts_are_durable() {
        let opts = QueueOpts::default();
        assert!(opts.durable);
        assert!(!opts.delete_when_unused);
        assert!(!opts.exclusive);
        assert!(!opts.no_wait);
    }

    #[test]
    fn queue_declare_options_map_every_flag() {
        let opts = QueueOpts::default().transient().delete_when_unused().exclusive().no_wait();
        let declare = opts.declare_options();
        assert!(!declare.passive);
        assert!(!declare.durable);
        assert!(declare.auto_delete);
        assert!(declare.exclusive);
        assert!(declare.nowait);
    }

    #[test]
    fn default_qos_prefetches_one() {
        let qos = QoSOpts::default();
        assert_eq!(qos.prefetch_count, 1);
        assert!(!qos.global);
    }

    #[test]
    fn qos_builder_overrides() {
        let qos = QoSOpts::default().prefetch_count(32).global();
        assert_eq!(qos.prefetch_count, 32);
        assert!(qos.qos_options().global);
    }

    #[test]
    fn bind_options_map_no_wait() {
        assert!(!QueueBindOpts::default().bind_options().nowait);
        assert!(QueueBindOpts::default().no_wait().bind_options().nowait);
    }
}
