//! In-memory producer for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{MessageProducer, OutboundMessage, ProduceError};

#[derive(Debug, Default)]
struct Inner {
    accepted: Mutex<Vec<OutboundMessage>>,
    rejections_left: AtomicUsize,
    attempts: AtomicUsize,
}

/// Records accepted messages; can be told to reject the next N attempts.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryProducer {
    inner: Arc<Inner>,
}

impl MemoryProducer {
    /// Producer that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` attempts with a transport error.
    pub fn reject_next(&self, count: usize) {
        self.inner.rejections_left.store(count, Ordering::SeqCst);
    }

    /// Accepted messages in acceptance order.
    #[must_use]
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total produce attempts, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageProducer for MemoryProducer {
    async fn produce(&self, message: &OutboundMessage) -> Result<(), ProduceError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let rejected = self
            .inner
            .rejections_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(ProduceError::Transport("broker unavailable".to_owned()));
        }

        self.inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}
