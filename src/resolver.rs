use tracing::debug;

use crate::broker::JetStream;
use crate::config::ConsumerSpec;
use crate::error::{Error, Result};

/// Delivery mode and effective subject, derived during connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMode {
    pub pull: bool,
    pub subject: String,
}

/// Work out push vs pull delivery for `spec`
///
/// Only a bound consumer (bind with both stream and durable set) is looked up.
/// It is a pull consumer exactly when it has no push delivery subject. Anything
/// else subscribes in push mode on the configured subject.
pub async fn resolve(spec: &ConsumerSpec, js: &dyn JetStream) -> Result<ResolvedMode> {
    let subject = spec.subject().unwrap_or_default().to_string();

    let Some((stream, durable)) = spec.bound_consumer() else {
        return Ok(ResolvedMode { pull: false, subject });
    };

    let info = js
        .consumer_info(stream, durable)
        .await
        .map_err(|source| Error::Resolution {
            stream: stream.to_string(),
            durable: durable.to_string(),
            source,
        })?;

    let deliver_subject = info.deliver_subject.filter(|s| !s.is_empty());
    let filter_subject = info.filter_subject.filter(|s| !s.is_empty());
    let pull = deliver_subject.is_none();

    let subject = if subject.is_empty() {
        deliver_subject.or(filter_subject).unwrap_or_default()
    } else {
        subject
    };

    debug!(stream, durable, pull, subject = %subject, "resolved bound consumer");
    Ok(ResolvedMode { pull, subject })
}
