//! Broker seam
//!
//! The reader never talks to the wire directly. It drives these traits, which a
//! client-library adapter implements (see the `nats` module behind the `nats`
//! feature). All handles are shared behind `Arc`/`Box` trait objects so that the
//! reader can clone a subscription out of its lock and wait on it lock-free.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::DeliverPolicy;
use crate::context::{Context, ContextError};

/// Errors reported by a broker adapter
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker's own wait expired without a delivery
    #[error("broker wait timed out")]
    Timeout,

    /// The adapter observed a finished context
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Any other client or server failure
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BrokerError {
    /// Wrap an arbitrary client error
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        BrokerError::Other(err.into())
    }

    /// Whether this is a wait timeout, as opposed to a cancellation or a failure
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BrokerError::Timeout | BrokerError::Context(ContextError::DeadlineExceeded)
        )
    }
}

/// Supplies ready-to-use broker connections
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

/// A live broker connection
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    /// Open a JetStream session on this connection
    fn jetstream(&self) -> Result<Box<dyn JetStream>, BrokerError>;

    /// Close the connection, releasing everything it owns
    async fn close(&self);
}

/// JetStream session operations used while connecting
#[async_trait]
pub trait JetStream: Send + Sync {
    /// Look up an existing consumer on a stream
    async fn consumer_info(&self, stream: &str, durable: &str) -> Result<ConsumerInfo, BrokerError>;

    /// Open a pull subscription
    async fn pull_subscribe(
        &self,
        subject: &str,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError>;

    /// Open a push subscription, load-balanced over `queue` when one is given
    async fn subscribe(
        &self,
        subject: &str,
        queue: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError>;
}

/// An open subscription
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Wait for the next push delivery
    async fn next_msg(&self) -> Result<Arc<dyn BrokerMessage>, BrokerError>;

    /// Request up to `batch` messages, letting the broker wait at most `max_wait`
    async fn fetch(
        &self,
        batch: usize,
        max_wait: Duration,
    ) -> Result<Vec<Arc<dyn BrokerMessage>>, BrokerError>;

    /// Deliver pending messages, then stop accepting new ones
    async fn drain(&self) -> Result<(), BrokerError>;
}

/// A single delivered message
#[async_trait]
pub trait BrokerMessage: Send + Sync {
    fn subject(&self) -> &str;

    fn payload(&self) -> Bytes;

    /// Header values keyed by header name, in delivery order per key
    fn headers(&self) -> HashMap<String, Vec<String>>;

    /// JetStream delivery metadata, when the message carries it
    fn metadata(&self) -> Result<DeliveryMetadata, BrokerError>;

    async fn ack(&self) -> Result<(), BrokerError>;

    async fn nak(&self) -> Result<(), BrokerError>;
}

/// Delivery metadata attached by JetStream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMetadata {
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
    pub num_delivered: u64,
    pub num_pending: u64,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}

/// The parts of a consumer's configuration that drive mode resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerInfo {
    /// Push delivery subject; absent for pull consumers
    pub deliver_subject: Option<String>,

    pub filter_subject: Option<String>,
}

/// What a subscription attaches to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// An existing named consumer
    Consumer { stream: String, durable: String },

    /// A stream, with the consumer created from the remaining options
    Stream(String),
}

/// Subscription options handed to the adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub manual_ack: bool,
    pub durable: Option<String>,
    pub deliver: Option<DeliverPolicy>,
    pub ack_wait: Option<Duration>,
    pub max_ack_pending: Option<i64>,
    pub bind: Option<Binding>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            manual_ack: true,
            durable: None,
            deliver: None,
            ack_wait: None,
            max_ack_pending: None,
            bind: None,
        }
    }
}

impl SubscribeOptions {
    /// Set the durable name (builder pattern)
    pub fn with_durable(mut self, durable: impl Into<String>) -> Self {
        self.durable = Some(durable.into());
        self
    }

    /// Set the deliver policy (builder pattern)
    pub fn with_deliver(mut self, deliver: DeliverPolicy) -> Self {
        self.deliver = Some(deliver);
        self
    }

    /// Set the ack wait (builder pattern)
    pub fn with_ack_wait(mut self, ack_wait: Duration) -> Self {
        self.ack_wait = Some(ack_wait);
        self
    }

    /// Set the max ack pending limit (builder pattern)
    pub fn with_max_ack_pending(mut self, max_ack_pending: i64) -> Self {
        self.max_ack_pending = Some(max_ack_pending);
        self
    }

    /// Bind to an existing consumer (builder pattern)
    pub fn with_bind(mut self, stream: impl Into<String>, durable: impl Into<String>) -> Self {
        self.bind = Some(Binding::Consumer {
            stream: stream.into(),
            durable: durable.into(),
        });
        self
    }

    /// Bind to a stream (builder pattern)
    pub fn with_bind_stream(mut self, stream: impl Into<String>) -> Self {
        self.bind = Some(Binding::Stream(stream.into()));
        self
    }
}
