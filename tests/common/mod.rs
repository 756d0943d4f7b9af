#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use jetstream_input::broker::{
    BrokerConnection, BrokerError, BrokerMessage, ConnectionProvider, ConsumerInfo,
    DeliveryMetadata, JetStream, SubscribeOptions, Subscription,
};
use jetstream_input::{Context, ContextError, JetStreamInputConfig, JetStreamReader};
use testcontainers::{core::WaitFor, GenericImage, RunnableImage};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A broker message that counts how often it was acked and nacked
pub struct MockMessage {
    subject: String,
    payload: Bytes,
    headers: HashMap<String, Vec<String>>,
    metadata: Option<DeliveryMetadata>,
    fail_ack: bool,
    fail_nak: bool,
    acks: AtomicUsize,
    naks: AtomicUsize,
}

impl MockMessage {
    pub fn new(subject: &str, payload: &str) -> Self {
        Self {
            subject: subject.to_string(),
            payload: Bytes::from(payload.to_string()),
            headers: HashMap::new(),
            metadata: Some(DeliveryMetadata {
                stream_sequence: 1,
                consumer_sequence: 1,
                num_delivered: 1,
                num_pending: 0,
                domain: String::new(),
                timestamp: Utc.timestamp_nanos(1_700_000_000_000_000_000),
            }),
            fail_ack: false,
            fail_nak: false,
            acks: AtomicUsize::new(0),
            naks: AtomicUsize::new(0),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.metadata = None;
        self
    }

    pub fn failing_ack(mut self) -> Self {
        self.fail_ack = true;
        self
    }

    pub fn failing_nak(mut self) -> Self {
        self.fail_nak = true;
        self
    }

    pub fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn naks(&self) -> usize {
        self.naks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerMessage for MockMessage {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> Bytes {
        self.payload.clone()
    }

    fn headers(&self) -> HashMap<String, Vec<String>> {
        self.headers.clone()
    }

    fn metadata(&self) -> Result<DeliveryMetadata, BrokerError> {
        self.metadata
            .clone()
            .ok_or_else(|| BrokerError::other("no jetstream metadata"))
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        if self.fail_ack {
            return Err(BrokerError::other("ack rejected"));
        }
        Ok(())
    }

    async fn nak(&self) -> Result<(), BrokerError> {
        self.naks.fetch_add(1, Ordering::SeqCst);
        if self.fail_nak {
            return Err(BrokerError::other("nak rejected"));
        }
        Ok(())
    }
}

/// One scripted outcome of a pull fetch
pub enum FetchStep {
    Messages(Vec<Arc<MockMessage>>),
    /// The broker reports its own wait timeout
    Timeout,
    /// The broker reports the request deadline expiring
    Deadline,
    /// The request expires with no messages
    Empty,
    Fail(&'static str),
    /// Never answer; only a context can end the attempt
    Hang,
}

type FetchHook = Box<dyn Fn(usize) + Send + Sync>;

/// A subscription fed by the test
#[derive(Default)]
pub struct MockSubscription {
    pushed: Mutex<VecDeque<Arc<MockMessage>>>,
    push_ready: Notify,
    fetch_script: Mutex<VecDeque<FetchStep>>,
    fetch_hook: Mutex<Option<FetchHook>>,
    fetch_calls: AtomicUsize,
    drain_delay: Mutex<Duration>,
    drained: Mutex<CancellationToken>,
    drains: AtomicUsize,
    fail_drain: AtomicBool,
}

impl MockSubscription {
    pub fn push(&self, message: Arc<MockMessage>) {
        self.pushed.lock().unwrap().push_back(message);
        self.push_ready.notify_one();
    }

    pub fn script_fetch(&self, step: FetchStep) {
        self.fetch_script.lock().unwrap().push_back(step);
    }

    /// Run `hook` with the 1-based call number at the start of every fetch
    pub fn on_fetch(&self, hook: impl Fn(usize) + Send + Sync + 'static) {
        *self.fetch_hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn set_drain_delay(&self, delay: Duration) {
        *self.drain_delay.lock().unwrap() = delay;
    }

    pub fn fail_drain(&self) {
        self.fail_drain.store(true, Ordering::SeqCst);
    }

    /// Start over as a fresh subscription after an earlier drain
    fn reopen(&self) {
        *self.drained.lock().unwrap() = CancellationToken::new();
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn drains(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscription for MockSubscription {
    async fn next_msg(&self) -> Result<Arc<dyn BrokerMessage>, BrokerError> {
        let drained = self.drained.lock().unwrap().clone();
        loop {
            if drained.is_cancelled() {
                return Err(BrokerError::other("subscription has been drained"));
            }
            if let Some(message) = self.pushed.lock().unwrap().pop_front() {
                return Ok(message);
            }
            tokio::select! {
                _ = self.push_ready.notified() => {}
                _ = drained.cancelled() => {}
            }
        }
    }

    async fn fetch(
        &self,
        batch: usize,
        _max_wait: Duration,
    ) -> Result<Vec<Arc<dyn BrokerMessage>>, BrokerError> {
        assert_eq!(batch, 1, "pull reads request exactly one message");
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = self.fetch_hook.lock().unwrap().as_ref() {
            hook(call);
        }

        let step = self.fetch_script.lock().unwrap().pop_front();
        match step {
            Some(FetchStep::Messages(messages)) => Ok(messages
                .into_iter()
                .map(|m| m as Arc<dyn BrokerMessage>)
                .collect()),
            Some(FetchStep::Timeout) => Err(BrokerError::Timeout),
            Some(FetchStep::Deadline) => Err(BrokerError::Context(ContextError::DeadlineExceeded)),
            Some(FetchStep::Empty) => Ok(Vec::new()),
            Some(FetchStep::Fail(reason)) => Err(BrokerError::other(reason)),
            Some(FetchStep::Hang) | None => std::future::pending().await,
        }
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        self.drained.lock().unwrap().cancel();
        let delay = *self.drain_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.drains.fetch_add(1, Ordering::SeqCst);
        if self.fail_drain.load(Ordering::SeqCst) {
            return Err(BrokerError::other("drain failed"));
        }
        Ok(())
    }
}

/// A recorded subscribe call
#[derive(Debug, Clone)]
pub struct SubscribeCall {
    pub pull: bool,
    pub subject: String,
    pub queue: Option<String>,
    pub options: SubscribeOptions,
}

#[derive(Default)]
struct BrokerState {
    subscription: Arc<MockSubscription>,
    consumer: Mutex<Option<ConsumerInfo>>,
    fail_connect: AtomicBool,
    fail_session: AtomicBool,
    fail_subscribe: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    consumer_lookups: AtomicUsize,
    subscribe_calls: Mutex<Vec<SubscribeCall>>,
}

/// In-memory broker: connection provider, session and subscription in one
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<BrokerState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `consumer_info` succeed with `info`
    pub fn with_consumer(self, info: ConsumerInfo) -> Self {
        *self.state.consumer.lock().unwrap() = Some(info);
        self
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_session(&self, fail: bool) {
        self.state.fail_session.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn subscription(&self) -> Arc<MockSubscription> {
        Arc::clone(&self.state.subscription)
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    pub fn consumer_lookups(&self) -> usize {
        self.state.consumer_lookups.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> Vec<SubscribeCall> {
        self.state.subscribe_calls.lock().unwrap().clone()
    }

    /// A reader over this broker for the given configuration
    pub fn reader(&self, config: JetStreamInputConfig) -> JetStreamReader {
        let spec = config.build().expect("valid test config");
        JetStreamReader::new(spec, Arc::new(self.clone()))
    }
}

#[async_trait]
impl ConnectionProvider for MockBroker {
    async fn connect(&self, _ctx: &Context) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(BrokerError::other("connection refused"));
        }
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    state: Arc<BrokerState>,
}

#[async_trait]
impl BrokerConnection for MockConnection {
    fn jetstream(&self) -> Result<Box<dyn JetStream>, BrokerError> {
        if self.state.fail_session.load(Ordering::SeqCst) {
            return Err(BrokerError::other("jetstream not enabled"));
        }
        Ok(Box::new(MockJetStream {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockJetStream {
    state: Arc<BrokerState>,
}

impl MockJetStream {
    fn record(
        &self,
        pull: bool,
        subject: &str,
        queue: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        self.state.subscribe_calls.lock().unwrap().push(SubscribeCall {
            pull,
            subject: subject.to_string(),
            queue: queue.map(str::to_string),
            options: options.clone(),
        });
        if self.state.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BrokerError::other("invalid subscription options"));
        }
        self.state.subscription.reopen();
        Ok(Arc::clone(&self.state.subscription) as Arc<dyn Subscription>)
    }
}

#[async_trait]
impl JetStream for MockJetStream {
    async fn consumer_info(&self, _stream: &str, _durable: &str) -> Result<ConsumerInfo, BrokerError> {
        self.state.consumer_lookups.fetch_add(1, Ordering::SeqCst);
        self.state
            .consumer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BrokerError::other("consumer not found"))
    }

    async fn pull_subscribe(
        &self,
        subject: &str,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        self.record(true, subject, None, options)
    }

    async fn subscribe(
        &self,
        subject: &str,
        queue: Option<&str>,
        options: &SubscribeOptions,
    ) -> Result<Arc<dyn Subscription>, BrokerError> {
        self.record(false, subject, queue, options)
    }
}

/// A consumer bound by stream "S" and durable "D"
pub fn bound_config() -> JetStreamInputConfig {
    JetStreamInputConfig::new()
        .with_bind(true)
        .with_stream("S")
        .with_durable("D")
}

pub fn pull_consumer(filter_subject: &str) -> ConsumerInfo {
    ConsumerInfo {
        deliver_subject: None,
        filter_subject: Some(filter_subject.to_string()),
    }
}

pub fn push_consumer(deliver_subject: &str) -> ConsumerInfo {
    ConsumerInfo {
        deliver_subject: Some(deliver_subject.to_string()),
        filter_subject: None,
    }
}

/// The NATS Docker image used by the broker integration tests
pub const NATS_IMAGE: &str = "nats";
pub const NATS_TAG: &str = "2.10";

/// Default NATS client port
pub const NATS_PORT: u16 = 4222;

/// Create a runnable NATS container with JetStream enabled
pub fn create_nats_container() -> RunnableImage<GenericImage> {
    let image = GenericImage::new(NATS_IMAGE, NATS_TAG)
        .with_exposed_port(NATS_PORT)
        .with_wait_for(WaitFor::message_on_stderr("Server is ready"));

    RunnableImage::from((image, vec!["-js".to_string()])).with_tag(NATS_TAG)
}

/// Build a client URL for the running NATS container
pub fn build_nats_url(host: &str, port: u16) -> String {
    format!("nats://{}:{}", host, port)
}
