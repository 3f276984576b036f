//! Best-effort publication of persisted users to a broker topic.
//!
//! # Delivery contract
//!
//! [`QueuePublisher::publish`] serializes the user, stamps it with the next
//! delivery key and a producer-identity header, and hands it to the
//! [`MessageProducer`] until the producer accepts it. With the default
//! [`RetryPolicy`] there is no upper bound on attempts and no error is ever
//! returned: the call only completes once the message has been accepted, so
//! callers must treat it as potentially unbounded. Acceptance is local; the
//! publisher does not wait for the broker to persist the record.
//!
//! # Shared state
//!
//! Exactly one publisher should exist per process. It owns the producer and
//! the delivery-key counter behind a single lock, so one send completes before
//! the next begins and keys are never reused. Construct it once in the
//! composition root and share it through `Arc`; it is torn down when the last
//! reference is dropped.
//!
//! Dropping a `publish` future cancels it. A key taken by a cancelled publish
//! is skipped, never reissued.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod rest_proxy;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use shardstore_core::{User, codec};

pub use rest_proxy::RestProxyProducer;

/// Header name carrying the producer identity.
pub const PRODUCER_HEADER: &str = "producer_type";

/// Default producer identity.
pub const DEFAULT_PRODUCER_ID: &str = "user writer";

/// Errors a producer can report for one send attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProduceError {
    /// The broker could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The broker refused the message.
    #[error("rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
}

/// Errors that can occur when publishing.
#[derive(Debug, Error)]
pub enum PublishError {
    /// A bounded retry policy ran out of attempts.
    #[error("message {key} not accepted after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Delivery key of the abandoned message.
        key: u64,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: ProduceError,
    },
}

/// A message ready to hand to a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination topic.
    pub topic: String,
    /// Delivery key (decimal counter value).
    pub key: String,
    /// Message headers in order.
    pub headers: Vec<(String, String)>,
    /// Serialized JSON record.
    pub payload: String,
}

/// Sends one message to the broker.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Attempt to hand `message` to the broker. `Ok` means accepted for delivery.
    async fn produce(&self, message: &OutboundMessage) -> Result<(), ProduceError>;
}

/// How often and how patiently a rejected message is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Maximum attempts including the first; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Pause between attempts; zero only yields to the scheduler.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retry forever without pausing.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }

    /// Give up after `max_attempts` attempts.
    #[must_use]
    pub const fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Duration::ZERO,
        }
    }

    /// Pause for `backoff` between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    async fn pause(&self) {
        if self.backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.backoff).await;
        }
    }
}

/// Outcome of an accepted publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Delivery key the message was sent with.
    pub key: u64,
    /// Attempts it took to be accepted.
    pub attempts: u32,
}

struct PublisherState {
    producer: Box<dyn MessageProducer>,
    last_key: u64,
}

/// Process-wide publisher: one producer, one delivery-key counter, one lock.
pub struct QueuePublisher {
    topic: String,
    producer_id: String,
    retry: RetryPolicy,
    state: Mutex<PublisherState>,
}

impl QueuePublisher {
    /// Create a publisher for `topic` with the default producer identity and
    /// the unbounded retry policy.
    pub fn new(producer: impl MessageProducer + 'static, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            producer_id: DEFAULT_PRODUCER_ID.to_owned(),
            retry: RetryPolicy::unbounded(),
            state: Mutex::new(PublisherState {
                producer: Box::new(producer),
                last_key: 0,
            }),
        }
    }

    /// Use a different producer identity header value.
    #[must_use]
    pub fn with_producer_id(mut self, producer_id: impl Into<String>) -> Self {
        self.producer_id = producer_id.into();
        self
    }

    /// Use a different retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Destination topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish a user.
    ///
    /// Blocks (asynchronously) until the producer accepts the message. Calls
    /// are serialized: concurrent callers wait for the in-flight send.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Exhausted` only when a bounded retry policy runs
    /// out of attempts. The default policy never returns an error.
    #[instrument(skip_all, fields(topic = %self.topic, user_id = ?user.id))]
    pub async fn publish(&self, user: &User) -> Result<Delivery, PublishError> {
        let payload = codec::to_json(user);

        let mut state = self.state.lock().await;
        state.last_key += 1;
        let key = state.last_key;

        let message = OutboundMessage {
            topic: self.topic.clone(),
            key: key.to_string(),
            headers: vec![(PRODUCER_HEADER.to_owned(), self.producer_id.clone())],
            payload,
        };

        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match state.producer.produce(&message).await {
                Ok(()) => {
                    debug!(key, attempts, "Message accepted");
                    return Ok(Delivery { key, attempts });
                }
                Err(e) if self.retry.is_exhausted(attempts) => {
                    warn!(key, attempts, error = %e, "Giving up on message");
                    return Err(PublishError::Exhausted {
                        key,
                        attempts,
                        last_error: e,
                    });
                }
                Err(e) => {
                    if attempts == 1 {
                        warn!(key, error = %e, "Producer rejected message, retrying");
                    } else {
                        debug!(key, attempts, error = %e, "Retrying message");
                    }
                    self.retry.pause().await;
                }
            }
        }
    }
}
