//! Batch reading over a JetStream subscription
//!
//! This module provides:
//! - `JetStreamReader`: connect/disconnect lifecycle, batch reads and shutdown
//! - `AckHandle`: settles one batch by acking or nacking every message in it
//! - `ShutdownSignal`: completion flag for background teardown
//!
//! # Reading Pattern
//!
//! 1. **Connect**: resolve push or pull mode and open the subscription
//! 2. **Read**: block for the next batch, honouring the caller's `Context`
//! 3. **Settle**: call the batch's `AckHandle` exactly once
//! 4. **Repeat**: on `Error::NotConnected`, connect again before reading
//! 5. **Close**: tear down in the background, bounded by a `Context`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use jetstream_input::{Context, JetStreamInputConfig, JetStreamReader};
//! # use jetstream_input::broker::ConnectionProvider;
//!
//! # async fn example(provider: Arc<dyn ConnectionProvider>) -> jetstream_input::Result<()> {
//! let spec = JetStreamInputConfig::new()
//!     .with_bind(true)
//!     .with_stream("ORDERS")
//!     .with_durable("order-worker")
//!     .build()?;
//! let reader = JetStreamReader::new(spec, provider);
//!
//! let ctx = Context::background();
//! reader.connect(&ctx).await?;
//!
//! loop {
//!     let read_ctx = ctx.with_timeout(Duration::from_secs(5));
//!     match reader.read_batch(&read_ctx).await {
//!         Ok((batch, ack)) => {
//!             let outcome: Result<(), String> = if batch.is_empty() {
//!                 Err("empty batch".to_string())
//!             } else {
//!                 Ok(())
//!             };
//!             ack.settle(outcome).await?;
//!         }
//!         Err(err) if err.is_context() => continue,
//!         Err(err) if err.is_not_connected() => reader.connect(&ctx).await?,
//!         Err(err) => return Err(err),
//!     }
//! }
//! # }
//! ```

pub mod ack;
#[allow(clippy::module_inception)]
pub mod reader;
pub mod shutdown;

pub use ack::AckHandle;
pub use reader::{subscribe_options, JetStreamReader, PULL_BATCH_CAPACITY, PULL_BATCH_SIZE, PULL_MAX_WAIT};
pub use shutdown::ShutdownSignal;
