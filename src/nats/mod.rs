//! NATS JetStream adapter for the broker seam, built on `async-nats`
//!
//! Only server URLs and a connection name are configurable here; credentials and
//! TLS belong to whoever wires up the client in production.

pub mod connection;
pub mod subscription;

pub use connection::{NatsConnection, NatsConnectionConfig, NatsConnectionProvider, NatsJetStream};
pub use subscription::{NatsMessage, NatsPullSubscription, NatsPushSubscription};

use crate::config::DeliverPolicy;

impl From<DeliverPolicy> for async_nats::jetstream::consumer::DeliverPolicy {
    fn from(policy: DeliverPolicy) -> Self {
        use async_nats::jetstream::consumer::DeliverPolicy as Nats;
        match policy {
            DeliverPolicy::All => Nats::All,
            DeliverPolicy::Last => Nats::Last,
            DeliverPolicy::LastPerSubject => Nats::LastPerSubject,
            DeliverPolicy::New => Nats::New,
        }
    }
}
