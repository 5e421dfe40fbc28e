// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory connection pool for flush path tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::codec::EncodedMessage;
use crate::errors::ConnectionError;
use crate::pool::{Connection, ConnectionPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Accept,
    /// Every acquire waits out its deadline and fails
    TimeOut,
    /// Each write call accepts at most this many bytes
    Chunked(usize),
    /// The connection breaks once this many bytes went through
    FailAfter(usize),
}

#[derive(Debug, Clone)]
pub(crate) struct SentPacket {
    pub at: Instant,
    pub bytes: Vec<u8>,
}

impl SentPacket {
    pub fn message_count(&self) -> usize {
        self.bytes.iter().filter(|b| **b == 0).count()
    }
}

#[derive(Debug)]
struct Recorder {
    behavior: Mutex<Behavior>,
    write_delay: Duration,
    packets: Mutex<Vec<SentPacket>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    acquires: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordingPool {
    recorder: Arc<Recorder>,
}

impl RecordingPool {
    pub fn new(behavior: Behavior) -> Self {
        Self::with_write_delay(behavior, Duration::ZERO)
    }

    pub fn with_write_delay(behavior: Behavior, write_delay: Duration) -> Self {
        Self {
            recorder: Arc::new(Recorder {
                behavior: Mutex::new(behavior),
                write_delay,
                packets: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                acquires: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }),
        }
    }

    #[allow(clippy::unwrap_used)]
    pub fn set_behavior(&self, behavior: Behavior) {
        *self.recorder.behavior.lock().unwrap() = behavior;
    }

    #[allow(clippy::unwrap_used)]
    fn behavior(&self) -> Behavior {
        *self.recorder.behavior.lock().unwrap()
    }

    #[allow(clippy::unwrap_used)]
    pub fn packets(&self) -> Vec<SentPacket> {
        self.recorder.packets.lock().unwrap().clone()
    }

    pub fn messages_received(&self) -> usize {
        self.packets().iter().map(SentPacket::message_count).sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.recorder.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn acquires(&self) -> usize {
        self.recorder.acquires.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.recorder.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionPool for RecordingPool {
    async fn acquire(&self, deadline: Duration) -> Result<Box<dyn Connection>, ConnectionError> {
        self.recorder.acquires.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior();
        if behavior == Behavior::TimeOut {
            tokio::time::sleep(deadline).await;
            return Err(ConnectionError::Timeout(deadline));
        }

        let in_flight = self.recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder
            .max_in_flight
            .fetch_max(in_flight, Ordering::SeqCst);
        Ok(Box::new(RecordingConnection {
            recorder: Arc::clone(&self.recorder),
            behavior,
            bytes: Vec::new(),
            broken: false,
            closed: false,
        }))
    }
}

struct RecordingConnection {
    recorder: Arc<Recorder>,
    behavior: Behavior,
    bytes: Vec<u8>,
    broken: bool,
    closed: bool,
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.recorder.write_delay.is_zero() {
            tokio::time::sleep(self.recorder.write_delay).await;
        }
        let accepted = match self.behavior {
            Behavior::Accept | Behavior::TimeOut => buf.len(),
            Behavior::Chunked(chunk) => buf.len().min(chunk),
            Behavior::FailAfter(limit) => {
                let room = limit.saturating_sub(self.bytes.len());
                if room == 0 {
                    self.broken = true;
                    return Err(std::io::ErrorKind::BrokenPipe.into());
                }
                buf.len().min(room)
            }
        };
        self.bytes.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    #[allow(clippy::unwrap_used)]
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        if !self.broken {
            self.recorder.packets.lock().unwrap().push(SentPacket {
                at: Instant::now(),
                bytes: std::mem::take(&mut self.bytes),
            });
        }
    }
}

/// A framed message of exactly `size` bytes.
pub(crate) fn message_of_size(size: usize) -> EncodedMessage {
    let mut bytes = vec![b'x'; size.saturating_sub(2)];
    bytes.extend_from_slice(b"\n\0");
    EncodedMessage::from(bytes)
}
