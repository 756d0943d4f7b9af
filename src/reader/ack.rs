use std::fmt;
use std::sync::Arc;

use crate::broker::BrokerMessage;
use crate::error::{Error, Result};

/// Settles one batch of messages
///
/// The handle owns the broker messages captured when the batch was built, in
/// batch order. Every settle method consumes the handle, so a batch is settled
/// at most once.
pub struct AckHandle {
    messages: Vec<Arc<dyn BrokerMessage>>,
}

impl AckHandle {
    pub(crate) fn new(messages: Vec<Arc<dyn BrokerMessage>>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Acknowledge or negatively acknowledge the batch
    ///
    /// `Ok(())` means the pipeline processed the batch and every message is
    /// acked. An error means processing failed and every message is nacked so
    /// the broker redelivers it.
    pub async fn settle<E>(self, outcome: std::result::Result<(), E>) -> Result<()> {
        match outcome {
            Ok(()) => self.ack().await,
            Err(_) => self.nak().await,
        }
    }

    /// Acknowledge every message in order, stopping at the first failure
    pub async fn ack(self) -> Result<()> {
        for message in &self.messages {
            message.ack().await.map_err(Error::Ack)?;
        }
        Ok(())
    }

    /// Negatively acknowledge every message in order, stopping at the first failure
    pub async fn nak(self) -> Result<()> {
        for message in &self.messages {
            message.nak().await.map_err(Error::Nak)?;
        }
        Ok(())
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("messages", &self.messages.len())
            .finish()
    }
}
