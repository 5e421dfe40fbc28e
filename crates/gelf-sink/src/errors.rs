// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::pool::Transport;
use std::time::Duration;

/// Errors raised while setting up the sink.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to resolve log server address {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No address found for log server {0}")]
    NoAddress(String),

    #[error("Transport {0} is not supported")]
    UnsupportedTransport(Transport),
}

/// Errors raised while turning a record into a GELF envelope.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Invalid additional field name '{0}'")]
    InvalidFieldName(String),

    #[error("Additional field name '{0}' is reserved")]
    ReservedFieldName(String),

    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Encoded message is {size} bytes, larger than the {max} byte packet limit")]
    TooLarge { size: usize, max: usize },
}

/// Errors raised while acquiring a pooled connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Timed out after {0:?} waiting for a connection")]
    Timeout(Duration),

    #[error("Failed to connect to log server: {0}")]
    Connect(#[from] std::io::Error),

    #[error("Connection pool is closed")]
    Closed,
}

/// A packet write that did not complete. The whole packet is considered lost.
#[derive(Debug, thiserror::Error)]
#[error("Wrote {written} of {len} bytes before failing: {source}")]
pub struct WriteError {
    pub written: usize,
    pub len: usize,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Errors returned to callers of [`crate::sink::Sink::write`].
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink is disabled: it failed to initialize")]
    Disabled,

    #[error("Sink has been shut down")]
    ShutDown,

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
