// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-flight flush scheduling.
//!
//! Every push tries to claim the flush flag. The one caller that flips it
//! from idle to flushing wakes the [`FlushService`], everyone else returns
//! immediately. The service debounces the cycle against the last flush, drains
//! the buffer, then drops the flag. If messages arrived after the drain it
//! claims the flag again so nothing is stranded until the next push.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer::MessageBuffer;
use crate::sender::{FlushReport, PacketSender};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlushState {
    Idle = 0,
    Flushing = 1,
}

#[derive(Debug)]
pub struct FlushScheduler {
    state: AtomicU8,
    wake: Notify,
    epoch: Instant,
    /// Nanoseconds from `epoch` to the end of the last flush
    last_flush: AtomicU64,
    interval: Duration,
    high_water_mark: usize,
}

impl FlushScheduler {
    /// The last flush time starts at construction, so the first cycle is
    /// debounced like any other.
    #[must_use]
    pub fn new(interval: Duration, high_water_mark: usize) -> Self {
        Self {
            state: AtomicU8::new(FlushState::Idle as u8),
            wake: Notify::new(),
            epoch: Instant::now(),
            last_flush: AtomicU64::new(0),
            interval,
            high_water_mark,
        }
    }

    /// Claims the flush flag. Returns `true` if this call started a cycle.
    pub fn try_claim(&self) -> bool {
        let claimed = self
            .state
            .compare_exchange(
                FlushState::Idle as u8,
                FlushState::Flushing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if claimed {
            self.wake.notify_one();
        }
        claimed
    }

    #[must_use]
    pub fn state(&self) -> FlushState {
        if self.state.load(Ordering::Acquire) == FlushState::Flushing as u8 {
            FlushState::Flushing
        } else {
            FlushState::Idle
        }
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.state() == FlushState::Flushing
    }

    fn release(&self) {
        self.state.store(FlushState::Idle as u8, Ordering::Release);
    }

    fn record_flush(&self) {
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.last_flush.store(nanos, Ordering::Release);
    }

    #[must_use]
    pub fn since_last_flush(&self) -> Duration {
        let last = Duration::from_nanos(self.last_flush.load(Ordering::Acquire));
        self.epoch.elapsed().saturating_sub(last)
    }

    /// How long a cycle should wait before draining `buffered` messages.
    #[must_use]
    pub fn delay_for(&self, buffered: usize) -> Option<Duration> {
        if buffered > self.high_water_mark {
            debug!(
                "{buffered} messages buffered, above the high-water mark of {}; flushing now",
                self.high_water_mark
            );
            return None;
        }
        debounce_delay(self.interval, self.since_last_flush())
    }
}

/// Remaining debounce window, if the last flush was less than `interval` ago.
///
/// An elapsed time of exactly zero does not wait either.
fn debounce_delay(interval: Duration, since_last_flush: Duration) -> Option<Duration> {
    let remaining = interval.checked_sub(since_last_flush)?;
    if remaining.is_zero() || remaining >= interval {
        None
    } else {
        Some(remaining)
    }
}

/// Long-lived task that runs the flush cycles claimed through a [`FlushScheduler`].
pub struct FlushService {
    buffer: Arc<MessageBuffer>,
    scheduler: Arc<FlushScheduler>,
    sender: PacketSender,
    stats: Arc<Stats>,
    cancel: CancellationToken,
}

impl FlushService {
    pub(crate) fn new(
        buffer: Arc<MessageBuffer>,
        scheduler: Arc<FlushScheduler>,
        sender: PacketSender,
        stats: Arc<Stats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            scheduler,
            sender,
            stats,
            cancel,
        }
    }

    /// Runs until cancelled, then drains the buffer one last time.
    pub async fn run(self) {
        debug!("GELF flush service started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = self.scheduler.wake.notified() => {
                    self.run_cycle().await;
                }
            }
        }

        let report = self.sender.drain_and_send(&self.buffer).await;
        self.stats.record_report(&report);
        debug!(
            "GELF flush service stopped, final drain sent {} messages",
            report.messages
        );
    }

    async fn run_cycle(&self) -> FlushReport {
        if let Some(delay) = self.scheduler.delay_for(self.buffer.len()) {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    debug!("Shutdown requested, flushing without waiting");
                }
            }
        }

        let report = self.sender.drain_and_send(&self.buffer).await;
        self.stats.record_flush(&report);
        self.scheduler.record_flush();
        self.scheduler.release();

        // A push that lost the claim while we were draining would otherwise
        // wait for the next push.
        if !self.buffer.is_empty() && !self.cancel.is_cancelled() {
            self.scheduler.try_claim();
        }
        report
    }
}
