// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Configuration
//!
//! This module provides the exchange kind and exchange declaration options
//! used by the topology declarator. Only the four canonical AMQP 0-9-1
//! exchange kinds are supported; anything else is rejected when the
//! configuration is parsed.

use crate::errors::AmqpError;
use lapin::{options::ExchangeDeclareOptions, types::FieldTable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Represents the canonical AMQP exchange kinds.
///
/// Each kind has specific routing behavior:
/// - Direct: routes messages on an exact match of routing keys
/// - Fanout: broadcasts messages to all bound queues
/// - Topic: routes messages on wildcard pattern matching of routing keys
/// - Headers: routes based on message header values instead of routing keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl FromStr for ExchangeKind {
    type Err = AmqpError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.to_ascii_lowercase().as_str() {
            "direct" => Ok(ExchangeKind::Direct),
            "fanout" => Ok(ExchangeKind::Fanout),
            "topic" => Ok(ExchangeKind::Topic),
            "headers" => Ok(ExchangeKind::Headers),
            other => Err(AmqpError::ConfigurationError(format!(
                "unknown exchange kind `{other}`"
            ))),
        }
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        }
    }
}

/// Options applied when declaring an exchange.
///
/// Defaults to a durable exchange, matching the broker-restart-surviving
/// topology this crate declares out of the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOpts {
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable,
}

impl Default for ExchangeOpts {
    fn default() -> Self {
        ExchangeOpts {
            durable: true,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::default(),
        }
    }
}

impl ExchangeOpts {
    /// Makes the exchange transient, removing it on broker restart.
    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Sets the exchange to auto-delete when no longer used.
    pub fn auto_delete(mut self) -> Self {
        self.auto_delete = true;
        self
    }

    /// Makes the exchange internal, preventing direct publishing.
    pub fn internal(mut self) -> Self {
        self.internal = true;
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

    pub(crate) fn declare_options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            passive: false,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            nowait: self.no_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_kinds() {
        assert_eq!(ExchangeKind::from_str("direct").unwrap(), ExchangeKind::Direct);
        assert_eq!(ExchangeKind::from_str("fanout").unwrap(), ExchangeKind::Fanout);
        assert_eq!(ExchangeKind::from_str("topic").unwrap(), ExchangeKind::Topic);
        assert_eq!(ExchangeKind::from_str("headers").unwrap(), ExchangeKind::Headers);
        assert_eq!(ExchangeKind::from_str("TOPIC").unwrap(), ExchangeKind::Topic);
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = ExchangeKind::from_str("x-delayed-message").unwrap_err();
        assert!(matches!(err, AmqpError::ConfigurationError(_)));
    }

    #[test]
    fn converts_to_lapin_kind() {
        assert_eq!(
            lapin::ExchangeKind::from(ExchangeKind::Fanout),
            lapin::ExchangeKind::Fanout
        );
        assert_eq!(
            lapin::ExchangeKind::from(ExchangeKind::Headers),
            lapin::ExchangeKind::Headers
        );
    }

    #[test]
    fn default_exchange_opts_are_durable() {
        let opts = ExchangeOpts::default();
        assert!(opts.durable);
        assert!(!opts.auto_delete);
        assert!(!opts.internal);
        assert!(!opts.no_wait);
    }

    #[test]
    fn declare_options_map_every_flag() {
        let opts = ExchangeOpts::default().transient().auto_delete().internal().no_wait();
        let declare = opts.declare_options();
        assert!(!declare.passive);
        assert!(!declare.durable);
        assert!(declare.auto_delete);
        assert!(declare.internal);
        assert!(declare.nowait);
    }
}
