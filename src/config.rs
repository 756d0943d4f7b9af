use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Starting point in the stream for a consumer without stored progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverPolicy {
    /// Deliver all available messages
    #[default]
    All,
    /// Deliver starting with the last published message
    Last,
    /// Deliver starting with the last published message per subject
    LastPerSubject,
    /// Deliver only messages published from now on
    New,
}

/// Raw input configuration, as read from a config file
///
/// Call [`JetStreamInputConfig::build`] to validate it into a [`ConsumerSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JetStreamInputConfig {
    /// Server URLs; only used by the NATS adapter
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,

    /// Connection name; only used by the NATS adapter
    #[serde(default)]
    pub name: Option<String>,

    /// Subject to consume from, wildcards allowed
    #[serde(default)]
    pub subject: Option<String>,

    /// Queue group to consume as (push mode only)
    #[serde(default)]
    pub queue: Option<String>,

    /// Durable consumer name
    #[serde(default)]
    pub durable: Option<String>,

    /// Stream to consume from
    #[serde(default)]
    pub stream: Option<String>,

    /// Attach to an existing consumer instead of creating one
    #[serde(default)]
    pub bind: bool,

    #[serde(default)]
    pub deliver: DeliverPolicy,

    /// How long the server waits for an ack, e.g. "100ms", "30s", "5m"
    #[serde(default = "default_ack_wait")]
    pub ack_wait: String,

    /// Outstanding acks allowed before the server halts delivery
    #[serde(default = "default_max_ack_pending")]
    pub max_ack_pending: i64,
}

fn default_urls() -> Vec<String> {
    vec!["nats://127.0.0.1:4222".to_string()]
}

fn default_ack_wait() -> String {
    "30s".to_string()
}

fn default_max_ack_pending() -> i64 {
    1024
}

impl Default for JetStreamInputConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            name: None,
            subject: None,
            queue: None,
            durable: None,
            stream: None,
            bind: false,
            deliver: DeliverPolicy::All,
            ack_wait: default_ack_wait(),
            max_ack_pending: default_max_ack_pending(),
        }
    }
}

impl JetStreamInputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a JSON document
    ///
    /// # Example
    ///
    /// ```
    /// use jetstream_input::JetStreamInputConfig;
    ///
    /// let spec = JetStreamInputConfig::from_json(
    ///     r#"{ "subject": "orders.>", "durable": "worker", "deliver": "new" }"#
    /// ).unwrap();
    /// assert_eq!(spec.subject(), Some("orders.>"));
    /// ```
    pub fn from_json(json: &str) -> Result<ConsumerSpec> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid input config: {}", e)))?;
        config.build()
    }

    /// Set the server URLs (builder pattern)
    pub fn with_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the connection name (builder pattern)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the subject (builder pattern)
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set the queue group (builder pattern)
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the durable name (builder pattern)
    pub fn with_durable(mut self, durable: impl Into<String>) -> Self {
        self.durable = Some(durable.into());
        self
    }

    /// Set the stream (builder pattern)
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Set the bind flag (builder pattern)
    pub fn with_bind(mut self, bind: bool) -> Self {
        self.bind = bind;
        self
    }

    /// Set the deliver policy (builder pattern)
    pub fn with_deliver(mut self, deliver: DeliverPolicy) -> Self {
        self.deliver = deliver;
        self
    }

    /// Set the ack wait as a duration string (builder pattern)
    pub fn with_ack_wait(mut self, ack_wait: impl Into<String>) -> Self {
        self.ack_wait = ack_wait.into();
        self
    }

    /// Set the max ack pending limit (builder pattern)
    pub fn with_max_ack_pending(mut self, max_ack_pending: i64) -> Self {
        self.max_ack_pending = max_ack_pending;
        self
    }

    /// Validate the configuration and freeze it into a [`ConsumerSpec`]
    pub fn build(self) -> Result<ConsumerSpec> {
        let subject = non_empty(self.subject);
        let queue = non_empty(self.queue);
        let durable = non_empty(self.durable);
        let stream = non_empty(self.stream);

        if self.bind {
            if stream.is_none() && durable.is_none() {
                return Err(Error::config("stream or durable is required, when bind is true"));
            }
        } else if subject.is_none() && stream.is_none() {
            return Err(Error::config("subject and stream is empty"));
        }

        let ack_wait = if self.ack_wait.is_empty() {
            Duration::ZERO
        } else {
            parse_duration(&self.ack_wait).map_err(|e| {
                Error::config(format!("failed to parse ack wait duration: {}", e))
            })?
        };

        Ok(ConsumerSpec {
            subject,
            queue,
            durable,
            stream,
            bind: self.bind,
            deliver: self.deliver,
            ack_wait,
            max_ack_pending: self.max_ack_pending,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Validated, immutable consumer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    subject: Option<String>,
    queue: Option<String>,
    durable: Option<String>,
    stream: Option<String>,
    bind: bool,
    deliver: DeliverPolicy,
    ack_wait: Duration,
    max_ack_pending: i64,
}

impl ConsumerSpec {
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    pub fn durable(&self) -> Option<&str> {
        self.durable.as_deref()
    }

    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    pub fn bind(&self) -> bool {
        self.bind
    }

    pub fn deliver(&self) -> DeliverPolicy {
        self.deliver
    }

    pub fn ack_wait(&self) -> Duration {
        self.ack_wait
    }

    pub fn max_ack_pending(&self) -> i64 {
        self.max_ack_pending
    }

    /// The (stream, durable) pair of an existing consumer to attach to, if binding
    pub fn bound_consumer(&self) -> Option<(&str, &str)> {
        match (self.bind, self.stream(), self.durable()) {
            (true, Some(stream), Some(durable)) => Some((stream, durable)),
            _ => None,
        }
    }
}

/// Parse a duration string such as "300ms", "30s", "5m" or "1h30m"
///
/// A leading `-` is accepted and yields zero, so a negative ack wait ends up unset.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, humantime::DurationError> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    match s.strip_prefix('-') {
        Some(magnitude) => humantime::parse_duration(magnitude).map(|_| Duration::ZERO),
        None => humantime::parse_duration(s.strip_prefix('+').unwrap_or(s)),
    }
}
