//! JetStream batch input
//!
//! Reads message batches from a NATS JetStream consumer with at-least-once
//! delivery and hands each batch to the caller together with an [`AckHandle`]
//! that acks or nacks the whole batch.
//!
//! The broker itself sits behind the traits in [`broker`]; enable the `nats`
//! feature for an adapter built on `async-nats`.
//!
//! # Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "nats")]
//! # async fn example() -> jetstream_input::Result<()> {
//! use std::sync::Arc;
//! use jetstream_input::nats::NatsConnectionProvider;
//! use jetstream_input::{Context, JetStreamInputConfig, JetStreamReader};
//!
//! let config = JetStreamInputConfig::new()
//!     .with_urls(["nats://localhost:4222"])
//!     .with_subject("orders.>")
//!     .with_durable("order-worker");
//! let provider = Arc::new(NatsConnectionProvider::from_config(&config));
//! let reader = JetStreamReader::new(config.build()?, provider);
//!
//! let ctx = Context::background();
//! reader.connect(&ctx).await?;
//! let (batch, ack) = reader.read_batch(&ctx).await?;
//! for msg in &batch {
//!     println!("{:?}", msg.meta_get("nats_subject"));
//! }
//! ack.ack().await?;
//! reader.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod reader;
pub mod resolver;

#[cfg(feature = "nats")]
pub mod nats;

// Re-export main types for convenience
pub use config::{ConsumerSpec, DeliverPolicy, JetStreamInputConfig};
pub use context::{Context, ContextError};
pub use error::{Error, Result};
pub use message::{Message, MessageBatch};
pub use reader::{AckHandle, JetStreamReader};
pub use resolver::ResolvedMode;
