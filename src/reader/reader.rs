use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::broker::{BrokerConnection, BrokerMessage, ConnectionProvider, SubscribeOptions, Subscription};
use crate::config::ConsumerSpec;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::message::{Message, MessageBatch};
use crate::reader::{AckHandle, ShutdownSignal};
use crate::resolver::{self, ResolvedMode};

/// How long a single pull request may wait on the broker
pub const PULL_MAX_WAIT: Duration = Duration::from_millis(500);

/// Messages requested per pull
pub const PULL_BATCH_SIZE: usize = 1;

/// Capacity reserved for a pulled batch
pub const PULL_BATCH_CAPACITY: usize = 10;

enum ConnectionState {
    Disconnected,
    Connected {
        connection: Box<dyn BrokerConnection>,
        subscription: Arc<dyn Subscription>,
        mode: ResolvedMode,
    },
}

struct Inner {
    spec: ConsumerSpec,
    provider: Arc<dyn ConnectionProvider>,
    state: Mutex<ConnectionState>,
}

/// Batch reader over a JetStream consumer
///
/// Connects lazily through a [`ConnectionProvider`], reads batches with an
/// [`AckHandle`] each, and tears down through [`JetStreamReader::close`].
/// Cloning shares the same connection state.
///
/// A read clones the subscription handle and releases the state lock before it
/// waits. A `disconnect` running at the same time can therefore drain the
/// subscription underneath a blocked read, which then fails with a read error.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use jetstream_input::{Context, JetStreamInputConfig, JetStreamReader};
/// # use jetstream_input::broker::ConnectionProvider;
///
/// # async fn example(provider: Arc<dyn ConnectionProvider>) -> jetstream_input::Result<()> {
/// let spec = JetStreamInputConfig::new()
///     .with_subject("orders.>")
///     .with_durable("order-worker")
///     .build()?;
///
/// let reader = JetStreamReader::new(spec, provider);
/// let ctx = Context::background();
/// reader.connect(&ctx).await?;
///
/// let (batch, ack) = reader.read_batch(&ctx).await?;
/// println!("received {} messages", batch.len());
/// ack.ack().await?;
///
/// reader.close(&ctx).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct JetStreamReader {
    inner: Arc<Inner>,
}

impl JetStreamReader {
    pub fn new(spec: ConsumerSpec, provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                spec,
                provider,
                state: Mutex::new(ConnectionState::Disconnected),
            }),
        }
    }

    pub fn spec(&self) -> &ConsumerSpec {
        &self.inner.spec
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.inner.state.lock().await, ConnectionState::Connected { .. })
    }

    /// The delivery mode of the current subscription, if connected
    pub async fn mode(&self) -> Option<ResolvedMode> {
        match &*self.inner.state.lock().await {
            ConnectionState::Connected { mode, .. } => Some(mode.clone()),
            ConnectionState::Disconnected => None,
        }
    }

    /// Connect and subscribe
    ///
    /// Returns immediately when already connected. If any step fails, whatever
    /// was opened so far is released and the reader stays disconnected.
    pub async fn connect(&self, ctx: &Context) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        if matches!(*state, ConnectionState::Connected { .. }) {
            return Ok(());
        }

        let connection = self
            .inner
            .provider
            .connect(ctx)
            .await
            .map_err(Error::Connection)?;

        match self.inner.open_subscription(connection.as_ref()).await {
            Ok((subscription, mode)) => {
                info!(
                    subject = %mode.subject,
                    pull = mode.pull,
                    stream = self.inner.spec.stream(),
                    durable = self.inner.spec.durable(),
                    "connected to jetstream consumer"
                );
                *state = ConnectionState::Connected {
                    connection,
                    subscription,
                    mode,
                };
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to subscribe, closing connection");
                connection.close().await;
                Err(err)
            }
        }
    }

    /// Drain the subscription and close the connection
    ///
    /// Safe to call at any time; does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        let previous = std::mem::replace(&mut *state, ConnectionState::Disconnected);
        if let ConnectionState::Connected {
            connection,
            subscription,
            ..
        } = previous
        {
            if let Err(err) = subscription.drain().await {
                warn!(error = %err, "failed to drain subscription");
            }
            drop(subscription);
            connection.close().await;
            drop(connection);
            info!("disconnected from jetstream consumer");
        }
    }

    /// Read the next batch together with the handle that settles it
    ///
    /// Fails with [`Error::NotConnected`] when there is no subscription; call
    /// [`JetStreamReader::connect`] before reading again.
    pub async fn read_batch(&self, ctx: &Context) -> Result<(MessageBatch, AckHandle)> {
        let (subscription, pull) = match &*self.inner.state.lock().await {
            ConnectionState::Connected {
                subscription, mode, ..
            } => (Arc::clone(subscription), mode.pull),
            ConnectionState::Disconnected => return Err(Error::NotConnected),
        };

        if pull {
            read_pull(ctx, subscription.as_ref()).await
        } else {
            read_push(ctx, subscription.as_ref()).await
        }
    }

    /// Disconnect in the background and wait for it to finish
    ///
    /// If `ctx` finishes first its error is returned, while the disconnect keeps
    /// running to completion.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        let signal = ShutdownSignal::new();
        {
            let reader = self.clone();
            let signal = signal.clone();
            tokio::spawn(async move {
                reader.disconnect().await;
                signal.trigger_has_stopped();
            });
        }

        tokio::select! {
            biased;
            _ = signal.has_stopped() => Ok(()),
            err = ctx.done() => Err(err.into()),
        }
    }
}

impl Inner {
    async fn open_subscription(
        &self,
        connection: &dyn BrokerConnection,
    ) -> Result<(Arc<dyn Subscription>, ResolvedMode)> {
        let js = connection.jetstream().map_err(Error::Connection)?;
        let mode = resolver::resolve(&self.spec, js.as_ref()).await?;
        let options = subscribe_options(&self.spec, &mode);

        let subscription = if mode.pull {
            js.pull_subscribe(&mode.subject, &options).await
        } else {
            js.subscribe(&mode.subject, self.spec.queue(), &options).await
        }
        .map_err(Error::Subscribe)?;

        Ok((subscription, mode))
    }
}

/// Build the subscription options for a resolved mode
///
/// Manual ack is always requested. Pull subscriptions only bind to the named
/// consumer; push subscriptions carry the consumer settings from `spec`.
pub fn subscribe_options(spec: &ConsumerSpec, mode: &ResolvedMode) -> SubscribeOptions {
    let mut options = SubscribeOptions::default();

    if mode.pull {
        if let Some((stream, durable)) = spec.bound_consumer() {
            options = options.with_bind(stream, durable);
        }
        return options;
    }

    if let Some(durable) = spec.durable() {
        options = options.with_durable(durable);
    }
    options = options.with_deliver(spec.deliver());
    if spec.ack_wait() > Duration::ZERO {
        options = options.with_ack_wait(spec.ack_wait());
    }
    if spec.max_ack_pending() != 0 {
        options = options.with_max_ack_pending(spec.max_ack_pending());
    }

    if let Some((stream, durable)) = spec.bound_consumer() {
        options = options.with_bind(stream, durable);
    } else if let Some(stream) = spec.stream() {
        options = options.with_bind_stream(stream);
    }

    options
}

async fn read_push(ctx: &Context, subscription: &dyn Subscription) -> Result<(MessageBatch, AckHandle)> {
    let message = ctx.run(subscription.next_msg()).await?.map_err(Error::Read)?;
    Ok(build_batch(vec![message]))
}

/// Pull one message at a time until something arrives
///
/// Each attempt runs under its own short deadline. When an attempt ends without
/// messages, only the caller's context decides whether to give up; an expired
/// attempt on its own is never reported.
async fn read_pull(ctx: &Context, subscription: &dyn Subscription) -> Result<(MessageBatch, AckHandle)> {
    let mut attempts: u64 = 0;
    loop {
        attempts += 1;
        let attempt = ctx.with_timeout(PULL_MAX_WAIT);
        match attempt
            .run(subscription.fetch(PULL_BATCH_SIZE, PULL_MAX_WAIT))
            .await
        {
            Ok(Ok(messages)) if !messages.is_empty() => {
                debug!(count = messages.len(), attempts, "pulled batch");
                return Ok(build_batch(messages));
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) if err.is_timeout() => {}
            Ok(Err(err)) => return Err(Error::Read(err)),
            Err(_) => {}
        }

        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        trace!(attempts, "pull wait expired, retrying");
    }
}

fn build_batch(messages: Vec<Arc<dyn BrokerMessage>>) -> (MessageBatch, AckHandle) {
    let mut batch = Vec::with_capacity(PULL_BATCH_CAPACITY.max(messages.len()));
    batch.extend(messages.iter().map(|m| Message::from_broker(m.as_ref())));
    (batch, AckHandle::new(messages))
}
