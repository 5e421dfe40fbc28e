// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults and limits shared across the sink.

use std::time::Duration;

/// GELF protocol version written in every envelope.
pub const GELF_VERSION: &str = "1.1";

/// Sequence Graylog expects after each envelope on a TCP stream.
pub const MESSAGE_TERMINATOR: [u8; 2] = [b'\n', 0];

/// Maximum number of bytes handed to one connection in a single send.
pub const MAX_PACKET_SIZE: usize = 2 * 1_024 * 1_024;

/// Buffer depth above which a flush skips the debounce delay.
pub const HIGH_WATER_MARK: usize = 1_000;

pub const DEFAULT_BUFFER_CAPACITY: usize = 1_024;

pub const DEFAULT_PORT: u16 = 12201;

pub const DEFAULT_HOSTNAME: &str = "localhost";

pub const DEFAULT_APP_NAME: &str = "Sample-App";

pub const DEFAULT_APP_VERSION: &str = "0.0.1";

pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 500;

pub const MIN_FLUSH_INTERVAL_MS: u64 = 50;

pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(2_000);

pub const MIN_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(10);

pub const MAX_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(16);

pub const DEFAULT_POOL_INITIAL: usize = 1;

pub const MAX_POOL_INITIAL: usize = 100;

pub const DEFAULT_POOL_MAX: usize = 2;

pub const MAX_POOL_MAX: usize = 400;

/// Idle pooled connections older than this are closed rather than reused.
pub const MAX_IDLE_AGE: Duration = Duration::from_secs(30);
