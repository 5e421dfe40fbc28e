// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host name written to the `host` key of every envelope.

use std::env;
use tracing::warn;

/// Resolves the source host name.
///
/// Order: explicit override, `HOSTNAME` environment variable, the system
/// host name (unix only), then `"unknown"`.
#[must_use]
pub fn source_host(configured: Option<&str>) -> String {
    if let Some(host) = configured.filter(|host| !host.is_empty()) {
        return host.to_string();
    }

    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    if let Some(hostname) = system_hostname() {
        return hostname;
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(hostname) => hostname
            .to_str()
            .filter(|hostname| !hostname.is_empty())
            .map(ToString::to_string),
        Err(e) => {
            warn!("Failed to get system hostname: {}", e);
            None
        }
    }
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    env::var("COMPUTERNAME").ok().filter(|name| !name.is_empty())
}
