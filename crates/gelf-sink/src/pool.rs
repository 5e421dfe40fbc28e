// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection pool to the log server.
//!
//! The flush path only depends on [`ConnectionPool::acquire`] and the
//! [`Connection`] write/close pair, so tests can swap in pools that record or
//! fail. [`TcpPool`] is the production implementation: at most `max`
//! connections are checked out at once, idle connections are reused before
//! dialing, and dialing happens lazily on acquire. An idle connection older
//! than `max_idle` is closed instead of reused: the server may have dropped
//! it, and the first write to a half-closed socket still succeeds locally.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::MAX_IDLE_AGE;
use crate::errors::{ConfigError, ConnectionError};

/// Network transport used to reach the log server. Only TCP is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, derive_more::Display)]
pub enum Transport {
    #[default]
    #[display("tcp")]
    Tcp,
    #[display("udp")]
    Udp,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(format!("Invalid transport: '{s}'. Valid transports are: tcp, udp")),
        }
    }
}

impl<'de> Deserialize<'de> for Transport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Transport::from_str(&value).map_err(serde::de::Error::custom)
    }
}

#[async_trait]
pub trait Connection: Send {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Shuts the connection down and gives its slot back to the pool.
    async fn close(&mut self);
}

#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Waits at most `deadline` for a usable connection.
    async fn acquire(&self, deadline: Duration) -> Result<Box<dyn Connection>, ConnectionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSize {
    pub initial: usize,
    pub max: usize,
}

#[derive(Debug)]
struct IdleConnection {
    stream: TcpStream,
    since: Instant,
}

#[derive(Debug)]
struct PoolInner {
    addr: SocketAddr,
    size: PoolSize,
    max_idle: Duration,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<IdleConnection>>,
}

impl PoolInner {
    /// Most recently parked connection still within `max_idle`. Stale ones are dropped.
    fn take_idle(&self) -> Option<TcpStream> {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(conn) = idle.pop() {
            if conn.since.elapsed() < self.max_idle {
                return Some(conn.stream);
            }
            debug!(
                "Closing connection to {} idle for {:?}",
                self.addr,
                conn.since.elapsed()
            );
        }
        None
    }

    fn put_idle(&self, stream: TcpStream) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.size.max {
            idle.push(IdleConnection {
                stream,
                since: Instant::now(),
            });
        }
    }

    fn idle_len(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[derive(Debug, Clone)]
pub struct TcpPool {
    inner: Arc<PoolInner>,
}

impl TcpPool {
    #[must_use]
    pub fn new(addr: SocketAddr, size: PoolSize) -> Self {
        Self::with_max_idle(addr, size, MAX_IDLE_AGE)
    }

    /// Like [`TcpPool::new`], with a custom bound on how long a parked
    /// connection may be reused.
    #[must_use]
    pub fn with_max_idle(addr: SocketAddr, size: PoolSize, max_idle: Duration) -> Self {
        let max = size.max.max(1);
        Self {
            inner: Arc::new(PoolInner {
                addr,
                size: PoolSize {
                    initial: size.initial.min(max),
                    max,
                },
                max_idle,
                permits: Arc::new(Semaphore::new(max)),
                idle: Mutex::new(Vec::with_capacity(max)),
            }),
        }
    }

    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.inner.idle_len()
    }

    /// Connections that could be checked out right now without waiting.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Opens idle connections until `initial` are ready. Returns how many were opened.
    pub async fn warm_up(&self) -> Result<usize, ConnectionError> {
        let missing = self.inner.size.initial.saturating_sub(self.inner.idle_len());
        for opened in 0..missing {
            match TcpStream::connect(self.inner.addr).await {
                Ok(stream) => self.inner.put_idle(stream),
                Err(e) if opened == 0 => return Err(ConnectionError::Connect(e)),
                Err(e) => {
                    warn!("Opened {opened} of {missing} initial connections: {e}");
                    return Ok(opened);
                }
            }
        }
        Ok(missing)
    }

    /// Checks out a connection, reusing an idle one before dialing.
    pub async fn checkout(&self, deadline: Duration) -> Result<PooledConnection, ConnectionError> {
        let inner = Arc::clone(&self.inner);
        let checkout = async move {
            let permit = Arc::clone(&inner.permits)
                .acquire_owned()
                .await
                .map_err(|_| ConnectionError::Closed)?;
            let stream = match inner.take_idle() {
                Some(stream) => stream,
                None => {
                    debug!("Dialing log server at {}", inner.addr);
                    TcpStream::connect(inner.addr).await?
                }
            };
            Ok(PooledConnection {
                stream: Some(stream),
                permit: Some(permit),
                pool: inner,
            })
        };

        tokio::time::timeout(deadline, checkout)
            .await
            .map_err(|_| ConnectionError::Timeout(deadline))?
    }

    /// Refuses further checkouts and drops every idle connection.
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl ConnectionPool for TcpPool {
    async fn acquire(&self, deadline: Duration) -> Result<Box<dyn Connection>, ConnectionError> {
        Ok(Box::new(self.checkout(deadline).await?))
    }
}

/// A checked-out connection. Dropping it closes the socket and frees its slot.
#[derive(Debug)]
pub struct PooledConnection {
    stream: Option<TcpStream>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Hands the still-open connection back to the pool for reuse.
    pub fn release(mut self) {
        if let Some(stream) = self.stream.take() {
            self.pool.put_idle(stream);
        }
        self.permit.take();
    }
}

#[async_trait]
impl Connection for PooledConnection {
    async fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.write(buf).await,
            None => Err(std::io::ErrorKind::NotConnected.into()),
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error shutting down log server connection: {e}");
            }
        }
        self.permit.take();
    }
}

/// Resolves the configured server once and builds a pool for it.
pub async fn build_pool(config: &Config) -> Result<TcpPool, ConfigError> {
    match config.transport {
        Transport::Tcp => {}
        transport @ Transport::Udp => return Err(ConfigError::UnsupportedTransport(transport)),
    }

    let addr = format!("{}:{}", config.hostname, config.port);
    let resolved = tokio::net::lookup_host(&addr)
        .await
        .map_err(|source| ConfigError::Resolve {
            addr: addr.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| ConfigError::NoAddress(addr.clone()))?;

    debug!("Resolved log server {addr} to {resolved}");
    Ok(TcpPool::new(
        resolved,
        PoolSize {
            initial: config.pool_initial,
            max: config.pool_max,
        },
    ))
}
