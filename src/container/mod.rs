//! Baked animation container: format, byte sources and the table of contents.
//!
//! ## File Structure
//!
//! ```text
//! +--------------------------+
//! | Version                  |  4 bytes (major, minor, patch, reserved)
//! +--------------------------+
//! | Header strings + timing  |  source file, creation date, f32 x2, u32
//! +--------------------------+
//! | Mesh descriptors         |  u32 count + records
//! +--------------------------+
//! | Image sequence descs     |  u32 count + records
//! +--------------------------+
//! | Frame descriptors        |  u32 count + per frame/mesh/image layout
//! +--------------------------+  <- frame data offset
//! | Frame data blocks        |  addressed relative to the offset above
//! +--------------------------+
//! ```
//!
//! All integers are little-endian. Strings carry an `i32` length prefix.

mod deps;
mod format;
mod info;
mod source;
mod toc;

pub use deps::*;
pub use format::*;
pub use info::*;
pub use source::*;
pub use toc::*;
