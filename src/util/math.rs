//! Math type re-exports and bounds used by frame data.
//!
//! Vectors come from `glam`; the container stores them as tightly packed
//! little-endian `f32` tuples, which matches glam's `Vec2`/`Vec3`/`Vec4`
//! layout (all three are `Pod`).

pub use glam::{Vec2, Vec3, Vec4};

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Axis-aligned bounds stored as center + full size, the way frames carry them.
#[derive(Clone, Copy, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Bounds {
    pub center: Vec3,
    pub size: Vec3,
}

impl Bounds {
    /// Zero-sized bounds at the origin.
    pub const ZERO: Self = Self {
        center: Vec3::ZERO,
        size: Vec3::ZERO,
    };

    #[inline]
    pub const fn new(center: Vec3, size: Vec3) -> Self {
        Self { center, size }
    }

    /// Minimum corner.
    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.size * 0.5
    }

    /// Maximum corner.
    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.size * 0.5
    }

    /// Check if a point lies inside (inclusive).
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min()).all() && p.cmple(self.max()).all()
    }
}

impl fmt::Debug for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bounds(center: [{}, {}, {}], size: [{}, {}, {}])",
            self.center.x, self.center.y, self.center.z, self.size.x, self.size.y, self.size.z
        )
    }
}
