// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Logging façade integration.
//!
//! [`GelfSink`] is a cheap, cloneable handle. Clones and children created with
//! [`Sink::with_fields`] share one buffer, one scheduler and one flush service;
//! only the ambient context fields differ.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::{MessageBuffer, PushOutcome};
use crate::codec::{EncodedMessage, Encoder};
use crate::config::Config;
use crate::errors::{ConfigError, SinkError};
use crate::hostname::source_host;
use crate::level::Level;
use crate::pool::{build_pool, ConnectionPool};
use crate::record::{Field, LogRecord};
use crate::scheduler::{FlushScheduler, FlushService};
use crate::sender::PacketSender;
use crate::stats::{Stats, StatsSnapshot};

/// What a structured logging façade needs from a sink.
pub trait Sink: Send + Sync {
    fn enabled(&self, level: Level) -> bool;

    /// A sink that adds `fields` to every record it writes.
    fn with_fields(&self, fields: Vec<Field>) -> Box<dyn Sink>;

    fn write(&self, record: &LogRecord, fields: &[Field]) -> Result<(), SinkError>;

    fn sync(&self) -> Result<(), SinkError>;
}

struct Pipeline {
    encoder: Encoder,
    buffer: Arc<MessageBuffer>,
    scheduler: Arc<FlushScheduler>,
    stats: Arc<Stats>,
    cancel: CancellationToken,
    service: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct GelfSink {
    min_level: Level,
    context: Arc<Vec<Field>>,
    pipeline: Option<Arc<Pipeline>>,
}

impl std::fmt::Debug for GelfSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GelfSink")
            .field("min_level", &self.min_level)
            .field("context", &self.context)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl GelfSink {
    /// Builds the sink and spawns its flush service on the current runtime.
    ///
    /// When setup fails the sink comes back disabled, unless
    /// `fail_on_init_error` is set, in which case this panics.
    #[allow(clippy::panic)]
    pub async fn start(config: Config) -> Self {
        let fail_hard = config.fail_on_init_error;
        let min_level = config.min_level;

        match Self::build(config).await {
            Ok((sink, service)) => {
                sink.spawn(service);
                sink
            }
            Err(e) if fail_hard => {
                panic!("Connection attempt to log server failed: {e}");
            }
            Err(e) => {
                error!("Unable to set up GELF sink, log shipping disabled: {e}");
                Self::disabled(min_level)
            }
        }
    }

    /// Resolves the log server and prepares the sink without spawning anything.
    ///
    /// The returned [`FlushService`] must be run for messages to leave the buffer.
    pub async fn build(config: Config) -> Result<(Self, FlushService), ConfigError> {
        let config = config.normalize();
        let pool = build_pool(&config).await?;

        match tokio::time::timeout(config.acquire_timeout(), pool.warm_up()).await {
            Ok(Ok(opened)) => debug!("Opened {opened} connections to {}", pool.addr()),
            Ok(Err(e)) => warn!("Log server {} not reachable yet: {e}", pool.addr()),
            Err(_) => warn!(
                "Log server {} did not accept a connection within {:?}",
                pool.addr(),
                config.acquire_timeout()
            ),
        }

        Ok(Self::with_pool(config, Arc::new(pool)))
    }

    /// Wires the sink to an existing connection pool.
    #[must_use]
    pub fn with_pool(config: Config, pool: Arc<dyn ConnectionPool>) -> (Self, FlushService) {
        let config = config.normalize();
        let encoder = Encoder::new(
            source_host(config.source_host.as_deref()),
            config.app_name.clone(),
            config.app_version.clone(),
        )
        .with_max_message_size(config.max_packet_size);

        let buffer = Arc::new(MessageBuffer::new(config.buffer_capacity));
        let scheduler = Arc::new(FlushScheduler::new(
            config.flush_interval(),
            config.high_water_mark,
        ));
        let stats = Arc::new(Stats::default());
        let cancel = CancellationToken::new();

        let sender = PacketSender::new(pool, config.acquire_timeout(), config.max_packet_size);
        let service = FlushService::new(
            Arc::clone(&buffer),
            Arc::clone(&scheduler),
            sender,
            Arc::clone(&stats),
            cancel.clone(),
        );

        let sink = Self {
            min_level: config.min_level,
            context: Arc::new(Vec::new()),
            pipeline: Some(Arc::new(Pipeline {
                encoder,
                buffer,
                scheduler,
                stats,
                cancel,
                service: Mutex::new(None),
            })),
        };
        (sink, service)
    }

    /// A sink that accepts nothing. Every write returns [`SinkError::Disabled`].
    #[must_use]
    pub fn disabled(min_level: Level) -> Self {
        Self {
            min_level,
            context: Arc::new(Vec::new()),
            pipeline: None,
        }
    }

    fn spawn(&self, service: FlushService) {
        if let Some(pipeline) = &self.pipeline {
            let handle = tokio::spawn(service.run());
            *pipeline
                .service
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
    }

    /// Whether setup succeeded and the sink ships messages.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Same sink with extra ambient fields. Later fields override earlier ones.
    #[must_use]
    pub fn with_context(&self, fields: Vec<Field>) -> Self {
        let mut context = Vec::with_capacity(self.context.len() + fields.len());
        context.extend(self.context.iter().cloned());
        context.extend(fields);
        Self {
            min_level: self.min_level,
            context: Arc::new(context),
            pipeline: self.pipeline.clone(),
        }
    }

    /// Queues an already encoded message and triggers a flush.
    pub fn push(&self, message: EncodedMessage) -> Result<PushOutcome, SinkError> {
        let pipeline = self.active()?;
        Ok(pipeline.enqueue(message))
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.pipeline
            .as_ref()
            .map(|pipeline| pipeline.stats.snapshot(pipeline.buffer.dropped()))
            .unwrap_or_default()
    }

    /// Stops the flush service after it drains the buffer one last time.
    ///
    /// Writes made after this return [`SinkError::ShutDown`]. Safe to call
    /// more than once, from any clone.
    pub async fn shutdown(&self) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        pipeline.cancel.cancel();

        let handle = pipeline
            .service
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("GELF flush service ended abnormally: {e}");
            }
        }
    }

    fn active(&self) -> Result<&Pipeline, SinkError> {
        let pipeline = self.pipeline.as_deref().ok_or(SinkError::Disabled)?;
        if pipeline.cancel.is_cancelled() {
            return Err(SinkError::ShutDown);
        }
        Ok(pipeline)
    }
}

impl Pipeline {
    fn enqueue(&self, message: EncodedMessage) -> PushOutcome {
        self.stats.record_push();
        let outcome = self.buffer.push(message);
        self.scheduler.try_claim();
        outcome
    }
}

impl Sink for GelfSink {
    fn enabled(&self, level: Level) -> bool {
        self.is_enabled() && level >= self.min_level
    }

    fn with_fields(&self, fields: Vec<Field>) -> Box<dyn Sink> {
        Box::new(self.with_context(fields))
    }

    fn write(&self, record: &LogRecord, fields: &[Field]) -> Result<(), SinkError> {
        let pipeline = self.active()?;
        if record.level < self.min_level {
            return Ok(());
        }

        match pipeline.encoder.encode(record, &self.context, fields) {
            Ok(message) => {
                pipeline.enqueue(message);
                Ok(())
            }
            Err(e) => {
                pipeline.stats.record_encoding_error();
                error!("Unable to encode log record: {e}");
                Err(e.into())
            }
        }
    }

    fn sync(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
