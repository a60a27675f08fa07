//! Upstream price feeds for Marketflow
//!
//! Each feed is a [`SourceConnection`]: either a live TCP feed streaming
//! newline-delimited JSON records, or a synthetic generator producing the
//! same records locally. Raw lines from a feed are turned into typed ticks
//! by a [`DecoderPool`].

pub mod connection;
pub mod decoder;
pub mod error;
pub mod source_set;
pub mod synthetic;
pub mod tcp;

pub use connection::{FeedHandle, Liveness, SourceConnection};
pub use decoder::{decode_line, DecodeStats, DecoderPool, RawRecord, DEFAULT_DECODE_WORKERS};
pub use error::FeedError;
pub use source_set::SourceSet;
pub use synthetic::{SyntheticConfig, SyntheticFeed};
pub use tcp::{FeedEndpoint, TcpFeed, TcpFeedConfig};
