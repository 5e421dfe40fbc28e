// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Packs buffered messages into size-bounded packets and ships them.
//!
//! Each packet goes out on its own pooled connection, which is closed after
//! the write whatever the outcome. A packet that fails anywhere between
//! acquire and the last byte is lost as a whole; there is no retry.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::buffer::MessageBuffer;
use crate::errors::{SendError, WriteError};
use crate::pool::{Connection, ConnectionPool};

/// Outcome of one drain of the buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages delivered in successful packets
    pub messages: usize,
    pub packets: usize,
    pub failed_packets: usize,
    /// Messages that were inside failed packets
    pub lost_messages: usize,
    pub bytes: usize,
    /// Single messages too large for any packet, discarded unsent
    pub oversized: usize,
}

impl FlushReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets == 0 && self.failed_packets == 0 && self.oversized == 0
    }
}

pub struct PacketSender {
    pool: Arc<dyn ConnectionPool>,
    acquire_timeout: Duration,
    max_packet_size: usize,
}

impl PacketSender {
    #[must_use]
    pub fn new(pool: Arc<dyn ConnectionPool>, acquire_timeout: Duration, max_packet_size: usize) -> Self {
        Self {
            pool,
            acquire_timeout,
            max_packet_size: max_packet_size.max(1),
        }
    }

    /// Empties the buffer, sending messages in FIFO order.
    ///
    /// A packet is sent as soon as the next message would push it past
    /// `max_packet_size`, so no packet ever exceeds the limit. Messages pushed
    /// while the drain is running are picked up by the same drain.
    pub async fn drain_and_send(&self, buffer: &MessageBuffer) -> FlushReport {
        let mut report = FlushReport::default();
        let mut packet: Vec<u8> = Vec::new();
        let mut in_packet = 0;

        while let Some(message) = buffer.pop() {
            if message.len() > self.max_packet_size {
                warn!(
                    "Dropping {} byte GELF message, larger than the {} byte packet limit",
                    message.len(),
                    self.max_packet_size
                );
                report.oversized += 1;
                continue;
            }
            if !packet.is_empty() && packet.len() + message.len() > self.max_packet_size {
                self.ship(&packet, in_packet, &mut report).await;
                packet.clear();
                in_packet = 0;
            }
            packet.extend_from_slice(message.as_bytes());
            in_packet += 1;
        }

        if !packet.is_empty() {
            self.ship(&packet, in_packet, &mut report).await;
        }
        report
    }

    async fn ship(&self, packet: &[u8], messages: usize, report: &mut FlushReport) {
        match self.send_packet(packet).await {
            Ok(bytes) => {
                debug!("Sent {messages} GELF messages ({bytes} bytes)");
                report.packets += 1;
                report.messages += messages;
                report.bytes += bytes;
            }
            Err(e) => {
                error!("Error sending to log server, {messages} messages lost: {e}");
                report.failed_packets += 1;
                report.lost_messages += messages;
            }
        }
    }

    /// Writes one packet on a freshly acquired connection and closes it.
    pub async fn send_packet(&self, packet: &[u8]) -> Result<usize, SendError> {
        let mut conn = self.pool.acquire(self.acquire_timeout).await?;
        let result = write_all(&mut *conn, packet, self.acquire_timeout).await;
        conn.close().await;
        Ok(result?)
    }
}

async fn write_all(
    conn: &mut dyn Connection,
    packet: &[u8],
    deadline: Duration,
) -> Result<usize, WriteError> {
    let mut written = 0;
    let outcome = tokio::time::timeout(deadline, async {
        while written < packet.len() {
            match conn.write(&packet[written..]).await {
                Ok(0) => return Err(std::io::Error::from(std::io::ErrorKind::WriteZero)),
                Ok(n) => written += n,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    })
    .await;

    let source = match outcome {
        Ok(Ok(())) => return Ok(written),
        Ok(Err(e)) => e,
        Err(_) => std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("write did not finish within {deadline:?}"),
        ),
    };
    Err(WriteError {
        written,
        len: packet.len(),
        source,
    })
}
