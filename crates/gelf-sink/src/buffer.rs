// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded, lossy message buffer.
//!
//! Producers never wait: a full buffer drops the incoming message and counts
//! the drop. The queue is lock-free, so `push` is safe to call from any
//! logging call site while the flush service drains concurrently.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam::queue::ArrayQueue;
use tracing::warn;

use crate::codec::EncodedMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Dropped,
}

#[derive(Debug)]
pub struct MessageBuffer {
    queue: ArrayQueue<EncodedMessage>,
    dropped: AtomicU64,
}

impl MessageBuffer {
    /// A zero capacity is raised to one; the queue cannot be empty-sized.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn push(&self, message: EncodedMessage) -> PushOutcome {
        match self.queue.push(message) {
            Ok(()) => PushOutcome::Queued,
            Err(_message) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "GELF message buffer full ({} items), entry dropped from sending. Total dropped: {}",
                    self.queue.capacity(),
                    dropped
                );
                PushOutcome::Dropped
            }
        }
    }

    pub fn pop(&self) -> Option<EncodedMessage> {
        self.queue.pop()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Messages discarded because the buffer was full, since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
