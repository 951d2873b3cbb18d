//! Streaming playback: window management, statistics and the public player.
//!
//! - [`Player`] - public API, owns the prefetch worker
//! - [`BufferWindow`] - sliding window of resident frames
//! - [`StatsCollector`] - rotating throughput counters
//! - [`PlayerOptions`] - serde-backed configuration

mod options;
mod player;
mod stats;
mod window;

pub use options::*;
pub use player::*;
pub use stats::*;
pub use window::*;
