// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use gelf_sink::{Config, Field, GelfSink, Level, LogRecord, Sink};

fn config_from_env() -> Config {
    let mut config = Config::default();
    if let Ok(host) = env::var("GELF_HOST") {
        config.hostname = host;
    }
    if let Ok(port) = env::var("GELF_PORT") {
        match port.parse() {
            Ok(port) => config.port = port,
            Err(e) => warn!("Ignoring invalid GELF_PORT '{port}': {e}"),
        }
    }
    if let Ok(app_name) = env::var("GELF_APP_NAME") {
        config.app_name = app_name;
    }
    config.fail_on_init_error = env::var("GELF_FAIL_ON_INIT_ERROR")
        .map(|val| val.to_lowercase() == "true")
        .unwrap_or(false);
    config
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("GELF_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = match EnvFilter::try_new(&log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid GELF_LOG_LEVEL '{log_level}' ({e}), using info");
            EnvFilter::new("info")
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");

    let sink = GelfSink::start(config_from_env()).await;
    if !sink.is_enabled() {
        error!("GELF sink is disabled, nothing will be forwarded");
        return;
    }
    let forwarder = sink.with_fields(vec![Field::new("source", "stdin")]);

    let mut lines = BufReader::new(io::stdin()).lines();
    let mut forwarded: u64 = 0;
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let record = LogRecord::new(Level::Info, line).with_logger_name("gelf-forward");
                    match forwarder.write(&record, &[Field::new("line_number", forwarded + 1)]) {
                        Ok(()) => forwarded += 1,
                        Err(e) => warn!("Line not forwarded: {e}"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error reading stdin: {e}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, flushing buffered lines");
                break;
            }
        }
    }

    sink.shutdown().await;
    let stats = sink.stats();
    info!(
        "Forwarded {forwarded} lines: {} sent, {} lost, {} dropped",
        stats.messages_sent, stats.messages_lost, stats.dropped
    );
}
