//! Live TCP feed
//!
//! Connects to one upstream endpoint and streams newline-delimited JSON
//! records. When the stream fails the reader retries the connection a fixed
//! number of times with a fixed delay, then gives up and closes its output.

use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::{FeedHandle, Liveness, SourceConnection};
use crate::error::FeedError;

/// Max reconnect attempts after a stream failure
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Fixed delay before each reconnect attempt
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on a single connect attempt
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a TCP feed
#[derive(Debug, Clone)]
pub struct TcpFeedConfig {
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the raw-line channel
    pub channel_capacity: usize,
}

impl Default for TcpFeedConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: RECONNECT_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
            channel_capacity: 64,
        }
    }
}

/// A named upstream address, written `Source1=127.0.0.1:40101`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEndpoint {
    pub source: String,
    pub address: String,
}

impl FeedEndpoint {
    pub fn new(source: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            address: address.into(),
        }
    }

    /// Parse a comma-separated endpoint list
    pub fn parse_list(list: &str) -> Result<Vec<Self>, FeedError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for FeedEndpoint {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((source, address)) if !source.trim().is_empty() && !address.trim().is_empty() => {
                Ok(FeedEndpoint::new(source.trim(), address.trim()))
            }
            _ => Err(FeedError::InvalidEndpoint(s.to_string())),
        }
    }
}

/// Connect to `address`, failing with `TimedOut` after `limit`
async fn connect(address: &str, limit: Duration) -> io::Result<TcpStream> {
    tokio::time::timeout(limit, TcpStream::connect(address))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))?
}

/// Live feed over a TCP socket
pub struct TcpFeed {
    endpoint: FeedEndpoint,
    config: TcpFeedConfig,
    liveness: Arc<Liveness>,
    reconnect_attempts: Arc<AtomicU32>,
    shutdown: CancellationToken,
    started: AtomicBool,
    closed: AtomicBool,
}

impl TcpFeed {
    pub fn new(endpoint: FeedEndpoint, config: TcpFeedConfig) -> Self {
        Self {
            endpoint,
            config,
            liveness: Arc::new(Liveness::new()),
            reconnect_attempts: Arc::new(AtomicU32::new(0)),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn address(&self) -> &str {
        &self.endpoint.address
    }

    pub fn liveness(&self) -> Arc<Liveness> {
        Arc::clone(&self.liveness)
    }

    /// Total reconnect attempts made over the feed's lifetime
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceConnection for TcpFeed {
    fn source_name(&self) -> &str {
        &self.endpoint.source
    }

    async fn start(&self) -> Result<FeedHandle, FeedError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FeedError::Closed(self.endpoint.source.clone()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FeedError::AlreadyStarted(self.endpoint.source.clone()));
        }

        info!(
            "[Feed {}] Connecting to {}",
            self.endpoint.source, self.endpoint.address
        );
        let stream = connect(&self.endpoint.address, self.config.connect_timeout)
            .await
            .map_err(|error| FeedError::Connect {
                source_name: self.endpoint.source.clone(),
                address: self.endpoint.address.clone(),
                error,
            })?;
        info!("[Feed {}] Connected", self.endpoint.source);
        self.liveness.mark_alive();

        let (line_tx, line_rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let reader = FeedReader {
            endpoint: self.endpoint.clone(),
            config: self.config.clone(),
            liveness: Arc::clone(&self.liveness),
            reconnect_attempts: Arc::clone(&self.reconnect_attempts),
            shutdown: self.shutdown.clone(),
        };
        let task = tokio::spawn(reader.run(stream, line_tx));

        Ok(FeedHandle {
            source: self.endpoint.source.clone(),
            lines: line_rx,
            task,
        })
    }

    fn check_health(&self) -> Result<(), FeedError> {
        if self.liveness.is_alive() {
            Ok(())
        } else {
            Err(FeedError::Unavailable(self.endpoint.source.clone()))
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[Feed {}] Closing connection", self.endpoint.source);
        self.shutdown.cancel();
        self.liveness.mark_dead();
    }
}

/// How a connected stream stopped
enum StreamEnd {
    Cancelled,
    ReceiverGone,
    Failed,
}

/// State moved into the background reader task
struct FeedReader {
    endpoint: FeedEndpoint,
    config: TcpFeedConfig,
    liveness: Arc<Liveness>,
    reconnect_attempts: Arc<AtomicU32>,
    shutdown: CancellationToken,
}

impl FeedReader {
    async fn run(self, mut stream: TcpStream, lines: mpsc::Sender<String>) {
        loop {
            match self.pump(stream, &lines).await {
                StreamEnd::Cancelled | StreamEnd::ReceiverGone => break,
                StreamEnd::Failed => {}
            }

            match self.reconnect().await {
                Some(next) => stream = next,
                None => break,
            }
        }

        self.liveness.mark_dead();
        info!("[Feed {}] Reader stopped", self.endpoint.source);
        // `lines` drops here, closing the output channel
    }

    async fn pump(&self, stream: TcpStream, out: &mpsc::Sender<String>) -> StreamEnd {
        let mut reader = BufReader::new(stream).lines();

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return StreamEnd::Cancelled,
                next = reader.next_line() => next,
            };

            match next {
                Ok(Some(line)) => {
                    self.liveness.record_read();
                    if line.trim().is_empty() {
                        continue;
                    }
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return StreamEnd::Cancelled,
                        sent = out.send(line) => {
                            if sent.is_err() {
                                return StreamEnd::ReceiverGone;
                            }
                        }
                    }
                }
                Ok(None) => {
                    warn!("[Feed {}] Stream closed by peer", self.endpoint.source);
                    return StreamEnd::Failed;
                }
                Err(e) => {
                    warn!("[Feed {}] Read error: {}", self.endpoint.source, e);
                    return StreamEnd::Failed;
                }
            }
        }
    }

    async fn reconnect(&self) -> Option<TcpStream> {
        let max_attempts = self.config.max_reconnect_attempts;

        for attempt in 1..=max_attempts {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            info!(
                "[Feed {}] Reconnect attempt {}/{}",
                self.endpoint.source, attempt, max_attempts
            );

            let connected = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                connected = connect(&self.endpoint.address, self.config.connect_timeout) => connected,
            };

            match connected {
                Ok(stream) => {
                    info!("[Feed {}] Reconnected", self.endpoint.source);
                    return Some(stream);
                }
                Err(e) => warn!("[Feed {}] Reconnect failed: {}", self.endpoint.source, e),
            }
        }

        error!(
            "[Feed {}] Max reconnect attempts reached, giving up",
            self.endpoint.source
        );
        None
    }
}
