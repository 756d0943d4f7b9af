use std::collections::HashMap;

use bytes::Bytes;

use crate::broker::BrokerMessage;

pub const META_SUBJECT: &str = "nats_subject";
pub const META_SEQUENCE_STREAM: &str = "nats_sequence_stream";
pub const META_SEQUENCE_CONSUMER: &str = "nats_sequence_consumer";
pub const META_NUM_DELIVERED: &str = "nats_num_delivered";
pub const META_NUM_PENDING: &str = "nats_num_pending";
pub const META_DOMAIN: &str = "nats_domain";
pub const META_TIMESTAMP_UNIX_NANO: &str = "nats_timestamp_unix_nano";

/// A batch of messages settled by a single ack handle
pub type MessageBatch = Vec<Message>;

/// Message envelope handed to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
    metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            metadata: HashMap::new(),
        }
    }

    /// Build an envelope from a delivered broker message
    ///
    /// The subject is always recorded. The six delivery metadata fields are only
    /// present when the broker message carries JetStream metadata. Non-empty
    /// headers are copied last, so a header named like a reserved field replaces it.
    pub fn from_broker(msg: &dyn BrokerMessage) -> Self {
        let mut message = Message::new(msg.payload());
        message.meta_set(META_SUBJECT, msg.subject());

        if let Ok(metadata) = msg.metadata() {
            message.meta_set(META_SEQUENCE_STREAM, metadata.stream_sequence.to_string());
            message.meta_set(META_SEQUENCE_CONSUMER, metadata.consumer_sequence.to_string());
            message.meta_set(META_NUM_DELIVERED, metadata.num_delivered.to_string());
            message.meta_set(META_NUM_PENDING, metadata.num_pending.to_string());
            message.meta_set(META_DOMAIN, metadata.domain);
            // Nanosecond timestamps overflow i64 after 2262; fall back to zero
            let nanos = metadata.timestamp.timestamp_nanos_opt().unwrap_or_default();
            message.meta_set(META_TIMESTAMP_UNIX_NANO, nanos.to_string());
        }

        for (key, values) in msg.headers() {
            if let Some(value) = values.into_iter().next().filter(|v| !v.is_empty()) {
                message.meta_set(key, value);
            }
        }

        message
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn meta_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta_get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}
