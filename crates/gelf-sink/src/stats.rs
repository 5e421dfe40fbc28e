// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sender::FlushReport;

/// Counters shared by every clone of a sink and its flush service.
#[derive(Debug, Default)]
pub(crate) struct Stats {
    pushed: AtomicU64,
    encoding_errors: AtomicU64,
    flush_cycles: AtomicU64,
    packets_sent: AtomicU64,
    packets_failed: AtomicU64,
    messages_sent: AtomicU64,
    messages_lost: AtomicU64,
    bytes_sent: AtomicU64,
}

impl Stats {
    pub(crate) fn record_push(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encoding_error(&self) {
        self.encoding_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, report: &FlushReport) {
        self.flush_cycles.fetch_add(1, Ordering::Relaxed);
        self.record_report(report);
    }

    /// Same as `record_flush` for drains that are not a scheduled cycle.
    pub(crate) fn record_report(&self, report: &FlushReport) {
        self.packets_sent
            .fetch_add(report.packets as u64, Ordering::Relaxed);
        self.packets_failed
            .fetch_add(report.failed_packets as u64, Ordering::Relaxed);
        self.messages_sent
            .fetch_add(report.messages as u64, Ordering::Relaxed);
        self.messages_lost
            .fetch_add((report.lost_messages + report.oversized) as u64, Ordering::Relaxed);
        self.bytes_sent
            .fetch_add(report.bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, dropped: u64) -> StatsSnapshot {
        StatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped,
            encoding_errors: self.encoding_errors.load(Ordering::Relaxed),
            flush_cycles: self.flush_cycles.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_failed: self.packets_failed.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_lost: self.messages_lost.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a sink's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Encoded messages handed to the buffer, including dropped ones
    pub pushed: u64,
    /// Messages discarded because the buffer was full
    pub dropped: u64,
    pub encoding_errors: u64,
    pub flush_cycles: u64,
    pub packets_sent: u64,
    pub packets_failed: u64,
    /// Messages that reached the server inside a successful packet
    pub messages_sent: u64,
    /// Messages drained from the buffer but never delivered
    pub messages_lost: u64,
    pub bytes_sent: u64,
}
