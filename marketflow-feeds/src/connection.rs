//! The capability shared by live and synthetic feeds

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::FeedError;

/// A running feed: its raw-line output and the reader task producing it.
///
/// The reader task owns the only sender, so `lines` closes exactly once,
/// when the task finishes.
#[derive(Debug)]
pub struct FeedHandle {
    pub source: String,
    pub lines: mpsc::Receiver<String>,
    pub task: JoinHandle<()>,
}

/// One upstream feed
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// Identity attached to every tick decoded from this feed
    fn source_name(&self) -> &str;

    /// Begin reading in the background
    async fn start(&self) -> Result<FeedHandle, FeedError>;

    /// Observe the liveness flag. Never reads from the feed.
    fn check_health(&self) -> Result<(), FeedError>;

    /// Stop reading. Safe to call more than once.
    fn close(&self);
}

/// Liveness flag and read counters for a feed (atomic for thread-safe access)
#[derive(Debug, Default)]
pub struct Liveness {
    alive: AtomicBool,
    last_read_epoch_ms: AtomicU64,
    lines_read: AtomicU64,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_alive(&self) {
        self.alive.store(true, Ordering::SeqCst);
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Record a successful read
    pub fn record_read(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_read_epoch_ms.store(now, Ordering::SeqCst);
        self.lines_read.fetch_add(1, Ordering::SeqCst);
        self.alive.store(true, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read.load(Ordering::SeqCst)
    }

    pub fn last_read(&self) -> Option<DateTime<Utc>> {
        match self.last_read_epoch_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms as i64),
        }
    }
}
