//! Container format constants, version and per-channel encodings.

use std::fmt;

/// Maximum texture coordinate channels per mesh.
pub const MAX_TEXCOORDS: usize = 4;

/// Maximum vertex color channels per mesh.
pub const MAX_COLORS: usize = 2;

/// Maximum mip levels per image frame.
pub const MAX_MIPMAPS: usize = 8;

/// Seek value marking a stream as "not stored this frame, reuse an earlier one".
pub const OMITTED_SEEK: i32 = -1;

/// Largest vertex count that still gets 16-bit indices.
pub const MAX_16BIT_VERTEX_COUNT: u32 = 0xfffe;

/// Longest string accepted in the table of contents.
pub const MAX_STRING_LEN: usize = 4096;

/// Version this engine reads. Files must match major.minor.
pub const ENGINE_VERSION: Version = Version::new(0, 5, 0);

/// Container version, stored as four bytes (major, minor, patch, reserved).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    #[inline]
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }

    /// Same major and minor.
    #[inline]
    pub const fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }

    /// Same major, minor and patch.
    #[inline]
    pub const fn is_same_as(&self, other: &Version) -> bool {
        self.is_compatible_with(other) && self.patch == other.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Engine version as "major.minor.patch".
pub fn engine_version() -> String {
    ENGINE_VERSION.to_string()
}

/// Attribute channel of a mesh.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Position,
    Normal,
    Tangent,
    Velocity,
    TexCoord,
    Color,
}

impl Channel {
    pub const ALL: [Channel; 6] = [
        Self::Position,
        Self::Normal,
        Self::Tangent,
        Self::Velocity,
        Self::TexCoord,
        Self::Color,
    ];

    /// Encodings this channel supports, indexed by their on-disk discriminant.
    pub const fn wire_table(self) -> &'static [Encoding] {
        use Encoding::*;
        match self {
            Self::Position => &[Full, Half],
            Self::Normal | Self::Tangent | Self::Velocity => &[Full, Half, Byte, None],
            Self::TexCoord => &[Full, Half, None],
            Self::Color => &[Full, Half, ByteHdr, Byte, None],
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Normal => "normal",
            Self::Tangent => "tangent",
            Self::Velocity => "velocity",
            Self::TexCoord => "texcoord",
            Self::Color => "color",
        }
    }
}

/// Precision a channel is stored with. Fixed per mesh for the whole sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// 32-bit floats
    #[default]
    Full,
    /// 16-bit normalized integers (quantized)
    Half,
    /// 8-bit normalized integers
    Byte,
    /// 8-bit normalized integers scaled by per-frame extents (colors only)
    ByteHdr,
    /// Channel not stored
    None,
}

impl Encoding {
    /// Decode an on-disk discriminant for the given channel.
    pub fn from_wire(channel: Channel, raw: i32) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| channel.wire_table().get(i).copied())
    }

    /// On-disk discriminant for the given channel, if the channel supports it.
    pub fn to_wire(self, channel: Channel) -> Option<i32> {
        channel
            .wire_table()
            .iter()
            .position(|e| *e == self)
            .map(|i| i as i32)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Half => "half",
            Self::Byte => "byte",
            Self::ByteHdr => "byte-hdr",
            Self::None => "none",
        }
    }

    /// Element layout a stream of this channel has in a frame block.
    pub const fn element_format(self, channel: Channel) -> Option<ElementFormat> {
        use ElementFormat::*;
        let format = match (channel, self) {
            (_, Self::None) => return Option::None,
            (Channel::Position | Channel::Normal | Channel::Velocity, Self::Full) => Vec3F32,
            (Channel::Position | Channel::Normal | Channel::Velocity, Self::Half) => Vec3Snorm16,
            (Channel::Normal | Channel::Velocity, Self::Byte) => Vec3Snorm8,
            (Channel::Tangent, Self::Full) => Vec4F32,
            (Channel::Tangent, Self::Half) => Vec4Snorm16,
            (Channel::Tangent, Self::Byte) => Vec4Snorm8,
            (Channel::TexCoord, Self::Full) => Vec2F32,
            (Channel::TexCoord, Self::Half) => Vec2Unorm16,
            (Channel::Color, Self::Full) => Vec4F32,
            (Channel::Color, Self::Half) => Vec4Unorm16,
            (Channel::Color, Self::Byte | Self::ByteHdr) => Vec4Unorm8,
            _ => return Option::None,
        };
        Some(format)
    }
}

/// Element layout of a stream inside a frame's data block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementFormat {
    IndexU16,
    IndexU32,
    Vec2F32,
    Vec2Unorm16,
    Vec3F32,
    Vec3Snorm16,
    Vec3Snorm8,
    Vec4F32,
    Vec4Snorm16,
    Vec4Snorm8,
    Vec4Unorm16,
    Vec4Unorm8,
    /// Opaque bytes (image mip data)
    Raw,
}

impl ElementFormat {
    /// Size of one element in bytes.
    pub const fn stride(self) -> usize {
        match self {
            Self::IndexU16 => 2,
            Self::IndexU32 => 4,
            Self::Vec2F32 => 8,
            Self::Vec2Unorm16 => 4,
            Self::Vec3F32 => 12,
            Self::Vec3Snorm16 => 6,
            Self::Vec3Snorm8 => 3,
            Self::Vec4F32 => 16,
            Self::Vec4Snorm16 => 8,
            Self::Vec4Snorm8 => 4,
            Self::Vec4Unorm16 => 8,
            Self::Vec4Unorm8 => 4,
            Self::Raw => 1,
        }
    }

    /// Number of scalar components per element.
    pub const fn components(self) -> usize {
        match self {
            Self::IndexU16 | Self::IndexU32 | Self::Raw => 1,
            Self::Vec2F32 | Self::Vec2Unorm16 => 2,
            Self::Vec3F32 | Self::Vec3Snorm16 | Self::Vec3Snorm8 => 3,
            Self::Vec4F32
            | Self::Vec4Snorm16
            | Self::Vec4Snorm8
            | Self::Vec4Unorm16
            | Self::Vec4Unorm8 => 4,
        }
    }
}

/// Pixel format of an image sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ImageFormat {
    #[default]
    Rgba8 = 0,
    Dxt1 = 1,
    Dxt3 = 2,
    Dxt5 = 3,
}

impl ImageFormat {
    pub const fn from_wire(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Rgba8),
            1 => Some(Self::Dxt1),
            2 => Some(Self::Dxt3),
            3 => Some(Self::Dxt5),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Rgba8 => "RGBA8",
            Self::Dxt1 => "DXT1",
            Self::Dxt3 => "DXT3",
            Self::Dxt5 => "DXT5",
        }
    }
}

/// Index width used for a mesh on one frame.
///
/// The choice depends on that frame's vertex count, so it can change
/// from frame to frame for the same mesh.
#[inline]
pub const fn index_format(vertex_count: u32, force_16bit: bool) -> ElementFormat {
    if vertex_count <= MAX_16BIT_VERTEX_COUNT || force_16bit {
        ElementFormat::IndexU16
    } else {
        ElementFormat::IndexU32
    }
}
