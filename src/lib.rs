//! Rate-limited, batching consumers for a pub/sub message bus.
//!
//! A [Persister] pulls messages through a [RateLimitedPuller], collects them per
//! worker into batches deduplicated by event id, and hands every flushed batch to a
//! [BatchSink]. The per-event result of the sink decides whether a message is acked or
//! nacked back to the bus.

mod batch;
mod batcher;
mod client;
mod config;
mod dispatch;
mod error;
mod event;
mod group;
mod health;
mod message;
mod metrics;
mod outcome;
mod persister;
mod publisher;
mod puller;
mod rate_limit;

pub mod impls;
pub mod sinks;

#[cfg(test)]
mod test_utils;

pub use batch::*;
pub use batcher::*;
pub use client::*;
pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use event::*;
pub use group::*;
pub use health::*;
pub use message::*;
pub use metrics::*;
pub use outcome::*;
pub use persister::*;
pub use publisher::*;
pub use puller::*;
