use std::sync::Arc;

use async_nats::jetstream::{
    self,
    consumer::{self, push, AckPolicy},
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::broker::{
    Binding, BrokerConnection, BrokerError, ConnectionProvider, ConsumerInfo, JetStream,
    SubscribeOptions, Subscription,
};
use crate::config::JetStreamInputConfig;
use crate::context::Context;
use crate::nats::subscription::{NatsPullSubscription, NatsPushSubscription};

/// Connection settings for the NATS adapter
#[derive(Debug, Clone)]
pub struct NatsConnectionConfig {
    pub urls: Vec<String>,
    pub name: Option<String>,
}

impl Default for NatsConnectionConfig {
    fn default() -> Self {
        Self {
            urls: vec!["nats://127.0.0.1:4222".to_string()],
            name: None,
        }
    }
}

/// Opens a fresh `async-nats` client for every connect
#[derive(Debug, Clone, Default)]
pub struct NatsConnectionProvider {
    config: NatsConnectionConfig,
}

impl NatsConnectionProvider {
    pub fn new(config: NatsConnectionConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &JetStreamInputConfig) -> Self {
        Self::new(NatsConnectionConfig {
            urls: config.urls.clone(),
            name: config.name.clone(),
        })
    }
}

#[async_trait]
impl ConnectionProvider for NatsConnectionProvider {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let mut options = async_nats::ConnectOptions::new();
        if let Some(name) = &self.config.name {
            options = options.name(name);
        }

        let urls = self.config.urls.join(",");
        let client = ctx
            .run(options.connect(urls.as_str()))
            .await?
            .map_err(BrokerError::other)?;

        debug!(urls = %urls, "connected to nats");
        Ok(Box::new(NatsConnection { client }))
    }
}

/// A connected `async-nats` client
pub struct NatsConnection {
    client: async_nats::Client,
}

#[async_trait]
impl BrokerConnection for NatsConnection {
    fn jetstream(&self) -> Result<Box<dyn JetStream>, BrokerError> {
        Ok(Box::new(NatsJetStream {
            client: self.client.clone(),
            context: jetstream::new(self.client.clone()),
        }))
    }

    async fn close(&self) {
        // Only flushes. The reader drops this connection, and with it the last
        // client handle, right after `close`; that drop is what closes the socket.
        if let Err(err) = self.client.flush().await {
            warn!(error = %err, "failed to flush nats connection");
        }
    }
}

/// JetStream session on a NATS client
pub struct NatsJetStream {
    client: async_nats::Client,
    context: jetstream::Context,
}

impl NatsJetStream {
    async fn get_stream(&self, name: &str) -> Result<jetstream::stream::Stream, BrokerError> {
        self.context.get_stream(name).await.map_err(BrokerError::other)
    }
}

#[async_trait]
impl JetStream for NatsJetStream {
    async fn consumer_info(&self, stream: &str, durable: &str) -> Result<ConsumerInfo, BrokerError> {
        let stream = self.get_stream(stream).await?;
        let consumer: consumer::Consumer<consumer::Config> = stream
            .get_consumer(durable)
            .await
            .map_err(BrokerError::other)?;

        let config = &consumer.cached_info().config;
        Ok(ConsumerInfo {
            deliver_subject: config.deliver_subject.clone(),
            filter_subject: Some(config.filter_subject.clone()),
        })
    }

    async fn pull_subscribe(
        &self,
        _subject: &str,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        let Some(Binding::Consumer { stream, durable }) = &options.bind else {
            return Err(BrokerError::other(
                "pull subscriptions must bind to an existing consumer",
            ));
        };

        let consumer: consumer::PullConsumer = self
            .get_stream(stream)
            .await?
            .get_consumer(durable)
            .await
            .map_err(BrokerError::other)?;

        Ok(Arc::new(NatsPullSubscription::new(consumer)))
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        let stream_name = match &options.bind {
            Some(Binding::Consumer { stream, .. }) | Some(Binding::Stream(stream)) => stream.clone(),
            None => self
                .context
                .stream_by_subject(subject)
                .await
                .map_err(BrokerError::other)?,
        };
        let stream = self.get_stream(&stream_name).await?;

        let consumer: consumer::PushConsumer = match &options.bind {
            Some(Binding::Consumer { durable, .. }) => {
                stream.get_consumer(durable).await.map_err(BrokerError::other)?
            }
            _ => {
                let config = push::Config {
                    deliver_subject: self.client.new_inbox(),
                    deliver_group: queue.map(str::to_string),
                    durable_name: options.durable.clone(),
                    deliver_policy: options.deliver.unwrap_or_default().into(),
                    ack_policy: if options.manual_ack {
                        AckPolicy::Explicit
                    } else {
                        AckPolicy::None
                    },
                    ack_wait: options.ack_wait.unwrap_or_default(),
                    max_ack_pending: options.max_ack_pending.unwrap_or_default(),
                    filter_subject: subject.to_string(),
                    ..Default::default()
                };
                match &options.durable {
                    Some(durable) => stream
                        .get_or_create_consumer(durable, config)
                        .await
                        .map_err(BrokerError::other)?,
                    None => stream
                        .create_consumer(config)
                        .await
                        .map_err(BrokerError::other)?,
                }
            }
        };

        let messages = consumer.messages().await.map_err(BrokerError::other)?;
        debug!(stream = %stream_name, subject, "opened push subscription");
        Ok(Arc::new(NatsPushSubscription::new(messages)))
    }
}
