use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::push, AckKind};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerError, BrokerMessage, DeliveryMetadata, Subscription};

/// Pull subscription bound to an existing consumer
pub struct NatsPullSubscription {
    consumer: jetstream::consumer::PullConsumer,
}

impl NatsPullSubscription {
    pub fn new(consumer: jetstream::consumer::PullConsumer) -> Self {
        Self { consumer }
    }
}

#[async_trait]
impl Subscription for NatsPullSubscription {
    async fn next_msg(&self) -> Result<Arc<dyn BrokerMessage>, BrokerError> {
        Err(BrokerError::other("pull subscriptions only support fetch"))
    }

    async fn fetch(
        &self,
        batch: usize,
        max_wait: Duration,
    ) -> Result<Vec<Arc<dyn BrokerMessage>>, BrokerError> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(batch)
            .expires(max_wait)
            .messages()
            .await
            .map_err(BrokerError::other)?;

        // An expired request ends the batch early, possibly with nothing in it
        let mut fetched: Vec<Arc<dyn BrokerMessage>> = Vec::with_capacity(batch);
        while let Some(message) = messages.next().await {
            let message = message.map_err(BrokerError::other)?;
            fetched.push(Arc::new(NatsMessage::new(message)));
        }
        Ok(fetched)
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Push subscription over a consumer's delivery subject
///
/// Draining first releases any pending `next_msg`, which then fails, and drops
/// the message stream, which unsubscribes from the delivery subject.
pub struct NatsPushSubscription {
    messages: Mutex<Option<push::Messages>>,
    drained: CancellationToken,
}

impl NatsPushSubscription {
    pub fn new(messages: push::Messages) -> Self {
        Self {
            messages: Mutex::new(Some(messages)),
            drained: CancellationToken::new(),
        }
    }

    async fn next_delivery(&self) -> Result<Arc<dyn BrokerMessage>, BrokerError> {
        let mut guard = self.messages.lock().await;
        let messages = guard
            .as_mut()
            .ok_or_else(|| BrokerError::other("subscription has been drained"))?;

        match messages.next().await {
            Some(Ok(message)) => Ok(Arc::new(NatsMessage::new(message))),
            Some(Err(err)) => Err(BrokerError::other(err)),
            None => Err(BrokerError::other("subscription closed")),
        }
    }
}

#[async_trait]
impl Subscription for NatsPushSubscription {
    async fn next_msg(&self) -> Result<Arc<dyn BrokerMessage>, BrokerError> {
        // Dropping the losing branch releases the stream lock for `drain`
        tokio::select! {
            biased;
            _ = self.drained.cancelled() => Err(BrokerError::other("subscription has been drained")),
            next = self.next_delivery() => next,
        }
    }

    async fn fetch(
        &self,
        _batch: usize,
        _max_wait: Duration,
    ) -> Result<Vec<Arc<dyn BrokerMessage>>, BrokerError> {
        Err(BrokerError::other("push subscriptions do not support fetch"))
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        self.drained.cancel();
        self.messages.lock().await.take();
        Ok(())
    }
}

/// A delivered JetStream message
pub struct NatsMessage(jetstream::Message);

impl NatsMessage {
    pub fn new(message: jetstream::Message) -> Self {
        Self(message)
    }
}

#[async_trait]
impl BrokerMessage for NatsMessage {
    fn subject(&self) -> &str {
        &self.0.message.subject
    }

    fn payload(&self) -> Bytes {
        self.0.message.payload.clone()
    }

    fn headers(&self) -> HashMap<String, Vec<String>> {
        let mut headers = HashMap::new();
        if let Some(map) = &self.0.message.headers {
            for (name, values) in map.iter() {
                headers.insert(
                    name.to_string(),
                    values.iter().map(|v| v.to_string()).collect(),
                );
            }
        }
        headers
    }

    fn metadata(&self) -> Result<DeliveryMetadata, BrokerError> {
        let info = self.0.info().map_err(BrokerError::other)?;
        Ok(DeliveryMetadata {
            stream_sequence: info.stream_sequence,
            consumer_sequence: info.consumer_sequence,
            num_delivered: info.delivered.max(0) as u64,
            num_pending: info.pending,
            domain: info.domain.unwrap_or_default().to_string(),
            timestamp: Utc.timestamp_nanos(info.published.unix_timestamp_nanos() as i64),
        })
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.0.ack().await.map_err(BrokerError::other)
    }

    async fn nak(&self) -> Result<(), BrokerError> {
        self.0
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(BrokerError::other)
    }
}
