//! # Bakestream
//!
//! Streaming playback of baked animation caches.
//!
//! A bake container holds a table of contents followed by one contiguous data
//! block per frame. Frames may omit streams that did not change since an
//! earlier frame; the player resolves those back-references, decodes frames on
//! a background thread and serves them from a sliding look-ahead window.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math types
//! - [`container`] - File format, table of contents, dependency resolution
//! - [`frame`] - Frame materialization and typed stream views
//! - [`stream`] - Buffer window, prefetch worker and the [`Player`] API
//!
//! ## Example
//!
//! ```ignore
//! use bakestream::prelude::*;
//! use std::time::Duration;
//!
//! let player = Player::open("shot.bake", PlayerOptions::default().look_ahead(30))?;
//! player.wait_until_ready(Duration::from_secs(5));
//!
//! for i in 0..player.frame_count() {
//!     if let Some(frame) = player.get_frame_at(i, Wait::Blocking) {
//!         println!("frame {}: {} vertices", i, frame.vertex_count(0));
//!     }
//! }
//! ```

pub mod util;
pub mod container;
pub mod frame;
pub mod stream;

#[cfg(test)]
#[allow(dead_code)]
mod testkit;

// Re-export commonly used types
pub use util::{Error, Result};
pub use container::{engine_version, PlaybackInfo, TableOfContents, Version};
pub use frame::MaterializedFrame;
pub use stream::{PlaybackStats, Player, PlayerOptions, PlayerStatus, Wait};

/// Build date stamped by `build.rs`.
pub const BUILD_DATE: &str = env!("BAKESTREAM_BUILD_DATE");
/// Build time stamped by `build.rs`.
pub const BUILD_TIME: &str = env!("BAKESTREAM_BUILD_TIME");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Bounds, Vec2, Vec3, Vec4};
    pub use crate::container::{PlaybackInfo, TableOfContents, Version};
    pub use crate::frame::{FrameImage, FrameMesh, MaterializedFrame, StreamView};
    pub use crate::stream::{PlaybackStats, Player, PlayerOptions, PlayerStatus, Wait};
}
