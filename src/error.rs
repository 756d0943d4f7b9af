use thiserror::Error;

use crate::broker::BrokerError;
use crate::context::ContextError;

/// Result type for reader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the JetStream input
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The connection provider or session setup failed
    #[error("Connection error: {0}")]
    Connection(#[source] BrokerError),

    /// Looking up the bound consumer failed
    #[error("Failed to resolve consumer '{durable}' on stream '{stream}': {source}")]
    Resolution {
        stream: String,
        durable: String,
        #[source]
        source: BrokerError,
    },

    /// The broker rejected the subscription
    #[error("Subscribe error: {0}")]
    Subscribe(#[source] BrokerError),

    /// No subscription is held; connect before reading again
    #[error("Not connected")]
    NotConnected,

    /// Reading from the subscription failed
    #[error("Read error: {0}")]
    Read(#[source] BrokerError),

    /// The caller's context finished
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Acknowledging a message failed
    #[error("Ack error: {0}")]
    Ack(#[source] BrokerError),

    /// Negatively acknowledging a message failed
    #[error("Nak error: {0}")]
    Nak(#[source] BrokerError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether the caller has to reconnect before reading again
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Error::NotConnected)
    }

    /// Whether the caller's context ended the operation
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Context(_))
    }
}
