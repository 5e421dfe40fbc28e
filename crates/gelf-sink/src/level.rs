// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Severity levels accepted by the sink and their syslog mapping.
//!
//! Levels are ordered from least to most severe, so `level >= min_level`
//! decides whether a record is shipped. GELF carries severity as a syslog
//! number, which loses some precision: `DPanic` and `Panic` share a value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Panics in development builds, logged as an error otherwise.
    DPanic,
    Panic,
    Fatal,
}

impl Level {
    /// Syslog severity written to the `level` key of an envelope.
    #[must_use]
    pub const fn syslog_severity(self) -> u8 {
        match self {
            Level::Debug => 7,
            Level::Info => 6,
            Level::Warn => 4,
            Level::Error => 3,
            Level::DPanic | Level::Panic => 2,
            Level::Fatal => 1,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::DPanic => "dpanic",
            Level::Panic => "panic",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "dpanic" => Ok(Level::DPanic),
            "panic" => Ok(Level::Panic),
            "fatal" => Ok(Level::Fatal),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: debug, info, warn, error, dpanic, panic, fatal",
            )),
        }
    }
}

/// Lenient: an unknown or non-string level falls back to `Info` with an error log,
/// so a bad config value never prevents the sink from starting.
impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match Level::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(Level::default())
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(Level::default())
        }
    }
}
