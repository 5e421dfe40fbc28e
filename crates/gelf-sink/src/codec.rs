// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! GELF envelope encoding.
//!
//! A record becomes one JSON object with the GELF required keys plus every
//! additional field as a sibling key prefixed with `_`, followed by `\n\0`:
//!
//! ```text
//! {"version":"1.1","host":"web-1","short_message":"hello","timestamp":1656581409,"level":6,"_a":"1"}\n\0
//! ```
//!
//! Additional fields are merged in order of increasing precedence: built-in
//! fields (logger, app, caller), ambient context, then call-site fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{GELF_VERSION, MAX_PACKET_SIZE, MESSAGE_TERMINATOR};
use crate::errors::EncodingError;
use crate::record::{Field, LogRecord};

/// One framed envelope, terminator included.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Into)]
pub struct EncodedMessage(Vec<u8>);

impl EncodedMessage {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for EncodedMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub host: String,
    pub short_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_message: Option<String>,
    pub timestamp: i64,
    pub level: u8,
    /// Keys carry their `_` prefix.
    #[serde(flatten)]
    pub additional: BTreeMap<String, String>,
}

impl Envelope {
    /// Looks up an additional field by its unprefixed name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.additional.get(&format!("_{key}")).map(String::as_str)
    }
}

/// Parses a single framed envelope, with or without its terminator.
pub fn decode(bytes: &[u8]) -> Result<Envelope, serde_json::Error> {
    let body = bytes.strip_suffix(&MESSAGE_TERMINATOR).unwrap_or(bytes);
    serde_json::from_slice(body)
}

#[derive(Debug, Clone)]
pub struct Encoder {
    host: String,
    app_name: String,
    app_version: String,
    max_message_size: usize,
}

impl Encoder {
    pub fn new(host: impl Into<String>, app_name: impl Into<String>, app_version: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
            max_message_size: MAX_PACKET_SIZE,
        }
    }

    /// Messages larger than this are rejected, since they could never fit a packet.
    #[must_use]
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn encode(
        &self,
        record: &LogRecord,
        context: &[Field],
        fields: &[Field],
    ) -> Result<EncodedMessage, EncodingError> {
        let mut additional = BTreeMap::new();
        for (key, value) in self.builtin_fields(record) {
            additional.insert(format!("_{key}"), value);
        }
        for field in context.iter().chain(fields) {
            validate_field_name(&field.key)?;
            additional.insert(format!("_{}", field.key), field.value.clone());
        }

        let envelope = Envelope {
            version: GELF_VERSION.to_string(),
            host: self.host.clone(),
            short_message: record.message.clone(),
            full_message: record.stack.clone().filter(|stack| !stack.is_empty()),
            timestamp: record.unix_timestamp(),
            level: record.level.syslog_severity(),
            additional,
        };

        let mut bytes = serde_json::to_vec(&envelope)?;
        bytes.extend_from_slice(&MESSAGE_TERMINATOR);

        if bytes.len() > self.max_message_size {
            return Err(EncodingError::TooLarge {
                size: bytes.len(),
                max: self.max_message_size,
            });
        }
        Ok(EncodedMessage(bytes))
    }

    fn builtin_fields(&self, record: &LogRecord) -> Vec<(&'static str, String)> {
        let mut builtin = vec![
            ("logger_name", record.logger_name.clone()),
            ("app_name", self.app_name.clone()),
            ("app_version", self.app_version.clone()),
        ];
        if let Some(caller) = &record.caller {
            builtin.push(("file", caller.file.clone()));
            builtin.push(("line", caller.line.to_string()));
            builtin.push(("package", caller.trimmed_path()));
        }
        builtin
    }
}

/// GELF additional field names match `[\w.-]+`, and `_id` is reserved by the server.
fn validate_field_name(key: &str) -> Result<(), EncodingError> {
    if key.is_empty()
        || !key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-')
    {
        return Err(EncodingError::InvalidFieldName(key.to_string()));
    }
    if key == "id" {
        return Err(EncodingError::ReservedFieldName(key.to_string()));
    }
    Ok(())
}
