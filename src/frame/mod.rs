//! Frame materialization: shared buffers, typed views and decoders.
//!
//! - [`Materializer`] - reads a frame block and builds a [`MaterializedFrame`]
//! - [`StreamView`] / [`FrameBuffer`] - reference-counted stream views
//! - [`decode`] - per-layout decoders into glam vectors

pub mod decode;
#[allow(clippy::module_inception)]
mod frame;
mod materializer;
mod view;

pub use decode::{
    decode_colors, decode_normals, decode_positions, decode_tangents, decode_texcoords,
    decode_velocities, indices_u32,
};
pub use frame::*;
pub use materializer::*;
pub use view::*;
