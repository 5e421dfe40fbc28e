// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # GELF sink
//!
//! Ships structured log records to a Graylog server as GELF 1.1 envelopes
//! over pooled TCP connections.
//!
//! Writes never block the caller: records are encoded on the calling thread,
//! pushed into a bounded lock-free buffer and picked up by a single flush
//! service task, which batches them into size-bounded packets. A full buffer
//! drops messages rather than applying backpressure.
//!
//! ```no_run
//! use gelf_sink::{Config, Field, GelfSink, Level, LogRecord, Sink};
//!
//! # async fn run() {
//! let sink = GelfSink::start(Config {
//!     hostname: "graylog.internal".to_string(),
//!     ..Config::default()
//! })
//! .await;
//!
//! let request = sink.with_fields(vec![Field::new("request_id", "r-42")]);
//! let _ = request.write(&LogRecord::new(Level::Info, "order placed"), &[]);
//!
//! sink.shutdown().await;
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod codec;
pub mod config;
pub mod constants;
pub mod errors;
pub mod hostname;
pub mod level;
pub mod pool;
pub mod record;
pub mod scheduler;
pub mod sender;
pub mod sink;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use buffer::{MessageBuffer, PushOutcome};
pub use codec::{decode, EncodedMessage, Encoder, Envelope};
pub use config::Config;
pub use errors::{ConfigError, ConnectionError, EncodingError, SendError, SinkError, WriteError};
pub use level::Level;
pub use pool::{Connection, ConnectionPool, TcpPool, Transport};
pub use record::{Caller, Field, LogRecord};
pub use sink::{GelfSink, Sink};
pub use stats::StatsSnapshot;
