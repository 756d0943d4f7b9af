use std::sync::Arc;
use std::time::Duration;

use jetstream_input::nats::NatsConnectionProvider;
use jetstream_input::{Context, Error, JetStreamInputConfig, JetStreamReader};
use tracing_subscriber::EnvFilter;

/// Example: consuming a JetStream subject
///
/// Reads batches from a durable push consumer on `orders.>` and acks each one
/// after printing it. Payloads that are not UTF-8 are nacked so the server
/// redelivers them. Stop with Ctrl-C.
///
/// To run this example:
/// 1. Start NATS with JetStream: docker run -p 4222:4222 nats:2.10 -js
/// 2. Create a stream: nats stream add ORDERS --subjects "orders.>" --defaults
/// 3. Run: cargo run --features nats --example consume
///
/// Set NATS_URL to use another server, RUST_LOG=jetstream_input=debug for logs.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== JetStream Consumer Example ===\n");

    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string());
    let config = JetStreamInputConfig::new()
        .with_urls([url])
        .with_name("consume-example")
        .with_subject("orders.>")
        .with_stream("ORDERS")
        .with_durable("consume-example")
        .with_ack_wait("10s");

    let provider = Arc::new(NatsConnectionProvider::from_config(&config));
    let reader = JetStreamReader::new(config.build()?, provider);

    let ctx = Context::background().with_cancel();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nShutting down...");
                ctx.cancel();
            }
        });
    }

    reader.connect(&ctx).await?;
    println!("Connected: {:?}\n", reader.mode().await);

    let mut processed = 0usize;
    loop {
        let (batch, ack) = match reader.read_batch(&ctx).await {
            Ok(read) => read,
            Err(err) if err.is_context() => break,
            Err(Error::NotConnected) => {
                reader.connect(&ctx).await?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let outcome = batch.iter().try_for_each(|msg| {
            let body = std::str::from_utf8(msg.payload())?;
            println!(
                "[{}] seq={} delivered={} body={}",
                msg.meta_get("nats_subject").unwrap_or_default(),
                msg.meta_get("nats_sequence_stream").unwrap_or_default(),
                msg.meta_get("nats_num_delivered").unwrap_or_default(),
                body
            );
            Ok::<(), std::str::Utf8Error>(())
        });
        if outcome.is_ok() {
            processed += batch.len();
        }
        ack.settle(outcome).await?;
    }

    // Give the drain a few seconds, then leave it to finish in the background
    let shutdown = Context::background().with_timeout(Duration::from_secs(5));
    reader.close(&shutdown).await?;

    println!("\n=== Example Complete ===");
    println!("Processed {} messages.", processed);

    Ok(())
}
