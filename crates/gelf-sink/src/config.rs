// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_APP_NAME, DEFAULT_APP_VERSION, DEFAULT_BUFFER_CAPACITY,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_HOSTNAME, DEFAULT_POOL_INITIAL, DEFAULT_POOL_MAX,
    DEFAULT_PORT, HIGH_WATER_MARK, MAX_ACQUIRE_TIMEOUT, MAX_PACKET_SIZE, MAX_POOL_INITIAL,
    MAX_POOL_MAX, MIN_ACQUIRE_TIMEOUT, MIN_FLUSH_INTERVAL_MS,
};
use crate::level::Level;
use crate::pool::Transport;

/// Configuration for the GELF sink.
///
/// Every field has a default, so partial configs deserialize. Out-of-range
/// values are not rejected: [`Config::normalize`] replaces them with defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Embedded in every message as `_app_name`
    pub app_name: String,
    /// Embedded in every message as `_app_version`
    pub app_version: String,
    /// Panic when the sink cannot be set up instead of running disabled
    pub fail_on_init_error: bool,
    /// Records below this level are not shipped
    pub min_level: Level,
    /// Log server host name or IP
    pub hostname: String,
    pub port: u16,
    pub transport: Transport,
    pub pool_initial: usize,
    pub pool_max: usize,
    /// How long a send may wait for a connection, in milliseconds
    pub acquire_timeout_ms: u64,
    pub buffer_capacity: usize,
    /// Debounce window between flushes, in milliseconds
    pub flush_interval_ms: u64,
    /// Buffer depth that forces an immediate flush
    pub high_water_mark: usize,
    pub max_packet_size: usize,
    /// Overrides the detected host name written to the `host` key
    pub source_host: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            app_version: DEFAULT_APP_VERSION.to_string(),
            fail_on_init_error: false,
            min_level: Level::Info,
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            transport: Transport::Tcp,
            pool_initial: DEFAULT_POOL_INITIAL,
            pool_max: DEFAULT_POOL_MAX,
            acquire_timeout_ms: millis(DEFAULT_ACQUIRE_TIMEOUT),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            high_water_mark: HIGH_WATER_MARK,
            max_packet_size: MAX_PACKET_SIZE,
            source_host: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Fills empty values with defaults and replaces out-of-range values.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.app_name.trim().is_empty() {
            self.app_name = DEFAULT_APP_NAME.to_string();
        }
        if self.app_version.trim().is_empty() {
            self.app_version = DEFAULT_APP_VERSION.to_string();
        }
        if self.hostname.trim().is_empty() {
            self.hostname = DEFAULT_HOSTNAME.to_string();
        }
        if self.port == 0 {
            self.port = DEFAULT_PORT;
        }
        if self.pool_initial == 0 || self.pool_initial > MAX_POOL_INITIAL {
            debug!(
                "Pool initial size {} out of range, using {}",
                self.pool_initial, DEFAULT_POOL_INITIAL
            );
            self.pool_initial = DEFAULT_POOL_INITIAL;
        }
        if self.pool_max == 0 || self.pool_max > MAX_POOL_MAX {
            debug!(
                "Pool max size {} out of range, using {}",
                self.pool_max, DEFAULT_POOL_MAX
            );
            self.pool_max = DEFAULT_POOL_MAX;
        }
        self.pool_max = self.pool_max.max(self.pool_initial);

        let timeout = Duration::from_millis(self.acquire_timeout_ms);
        if timeout < MIN_ACQUIRE_TIMEOUT || timeout > MAX_ACQUIRE_TIMEOUT {
            debug!(
                "Acquire timeout {}ms out of range, using {:?}",
                self.acquire_timeout_ms, DEFAULT_ACQUIRE_TIMEOUT
            );
            self.acquire_timeout_ms = millis(DEFAULT_ACQUIRE_TIMEOUT);
        }
        if self.flush_interval_ms < MIN_FLUSH_INTERVAL_MS {
            self.flush_interval_ms = DEFAULT_FLUSH_INTERVAL_MS;
        }
        if self.buffer_capacity == 0 {
            self.buffer_capacity = DEFAULT_BUFFER_CAPACITY;
        }
        if self.high_water_mark == 0 {
            self.high_water_mark = HIGH_WATER_MARK;
        }
        if self.max_packet_size == 0 {
            self.max_packet_size = MAX_PACKET_SIZE;
        }
        self.source_host = self
            .source_host
            .filter(|host| !host.trim().is_empty());
        self
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}
