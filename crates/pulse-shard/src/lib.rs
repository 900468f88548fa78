//! # pulse-shard
//!
//! Persistent gateway connection manager. One [`Shard`] owns one
//! authenticated, resumable streaming connection to the event feed: it
//! decodes the continuously-compressed byte stream, keeps the heartbeat
//! cycle alive against inbound traffic, and recovers from every class of
//! connection failure without operator intervention.

pub mod close;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod ratelimit;
pub mod shard;
pub mod status;
pub mod telemetry;

pub use close::{classify_close, CloseIntent};
pub use config::ShardConfig;
pub use decoder::FrameDecoder;
pub use dispatch::{DispatchSink, EventParser, NullSink, ParseResult, ParserRegistry};
pub use error::{ShardError, ShardResult};
pub use ratelimit::GatewayRatelimiter;
pub use shard::{Shard, ShardState};
pub use status::ConnectionStatus;
