//! Table of contents: the parsed directory of a container.
//!
//! The TOC sits at the start of the file. Right after it the frame data
//! blocks begin; every [`FrameDescriptor::file_position`] is relative to
//! that point ([`TableOfContents::frame_data_offset`]).

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use smallvec::SmallVec;

use super::deps;
use super::format::*;
use crate::util::{Bounds, Error, Result, Vec3, Vec4};

/// Per-mesh description, fixed for the whole sequence.
#[derive(Debug, Clone, Default)]
pub struct MeshDescriptor {
    pub name: String,
    /// Mesh data never changes; frame 0 is cached for its lifetime.
    pub constant: bool,
    pub max_vertices: u64,
    pub max_surfaces: u64,
    pub formats: MeshFormats,
}

/// Encoding selector of every attribute channel of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshFormats {
    pub position: Encoding,
    pub normal: Encoding,
    pub tangent: Encoding,
    pub velocity: Encoding,
    pub texcoord: Encoding,
    pub color: Encoding,
}

impl Default for MeshFormats {
    fn default() -> Self {
        Self {
            position: Encoding::Full,
            normal: Encoding::Full,
            tangent: Encoding::None,
            velocity: Encoding::Full,
            texcoord: Encoding::Full,
            color: Encoding::Byte,
        }
    }
}

impl MeshFormats {
    pub fn get(&self, channel: Channel) -> Encoding {
        match channel {
            Channel::Position => self.position,
            Channel::Normal => self.normal,
            Channel::Tangent => self.tangent,
            Channel::Velocity => self.velocity,
            Channel::TexCoord => self.texcoord,
            Channel::Color => self.color,
        }
    }
}

/// Per-image-sequence description.
#[derive(Debug, Clone, Default)]
pub struct ImageSequenceDescriptor {
    pub name: String,
    pub format: ImageFormat,
    pub constant: bool,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
}

/// Byte range of one stream inside a frame block.
///
/// `seek == OMITTED_SEEK` means the stream is unchanged since an earlier
/// frame and must be reused from there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamRange {
    pub seek: i32,
    pub size: u32,
}

impl StreamRange {
    pub const OMITTED: Self = Self { seek: OMITTED_SEEK, size: 0 };

    #[inline]
    pub const fn new(seek: i32, size: u32) -> Self {
        Self { seek, size }
    }

    /// Not stored this frame.
    #[inline]
    pub const fn is_omitted(&self) -> bool {
        self.seek == OMITTED_SEEK
    }

    /// Stored this frame with actual bytes.
    #[inline]
    pub const fn has_data(&self) -> bool {
        self.seek >= 0 && self.size > 0
    }

    /// End offset inside the frame block, if stored.
    #[inline]
    pub fn end(&self) -> Option<u64> {
        (self.seek >= 0).then(|| self.seek as u64 + self.size as u64)
    }
}

/// Quantization parameters: decoded = center + normalized * extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
    pub center: Vec3,
    pub extents: Vec3,
}

impl Default for Quantization {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            extents: Vec3::ONE,
        }
    }
}

/// One draw call's slice of a mesh's vertex/index buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct MeshSection {
    pub vertex_start: u32,
    pub index_start: u32,
    pub surface_count: u32,
    pub min_vertex_index: u32,
    pub max_vertex_index: u32,
}

/// Per-mesh, per-frame layout.
#[derive(Debug, Clone, Default)]
pub struct FrameMeshDescriptor {
    pub vertex_count: u32,
    pub surface_count: u32,
    pub sections: SmallVec<[MeshSection; 4]>,
    pub indices: StreamRange,
    pub positions: StreamRange,
    pub position_quantization: Quantization,
    pub normals: StreamRange,
    pub tangents: StreamRange,
    pub velocities: StreamRange,
    pub velocity_quantization: Quantization,
    pub texcoords: [StreamRange; MAX_TEXCOORDS],
    pub colors: [StreamRange; MAX_COLORS],
    pub color_extents: [Vec4; MAX_COLORS],
    pub bounds: Bounds,
    /// At least one stream is reused from an earlier frame.
    pub has_omitted_streams: bool,
    /// Earliest frame that must be live to rebuild this mesh.
    pub dependency: u32,
}

impl FrameMeshDescriptor {
    /// Every stream range with its mask bit.
    pub fn streams(&self) -> [(deps::StreamMask, StreamRange); 11] {
        use deps::StreamMask as M;
        [
            (M::INDICES, self.indices),
            (M::POSITIONS, self.positions),
            (M::NORMALS, self.normals),
            (M::TANGENTS, self.tangents),
            (M::VELOCITIES, self.velocities),
            (M::TEXCOORD0, self.texcoords[0]),
            (M::TEXCOORD1, self.texcoords[1]),
            (M::TEXCOORD2, self.texcoords[2]),
            (M::TEXCOORD3, self.texcoords[3]),
            (M::COLOR0, self.colors[0]),
            (M::COLOR1, self.colors[1]),
        ]
    }
}

/// Layout of one mip level of an image frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MipDescriptor {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub range: StreamRange,
}

/// Per-image-sequence, per-frame layout.
#[derive(Debug, Clone, Default)]
pub struct FrameImageDescriptor {
    pub mip_count: u32,
    pub mips: [MipDescriptor; MAX_MIPMAPS],
    /// Earliest frame that must be live to rebuild this image.
    pub dependency: u32,
}

impl FrameImageDescriptor {
    /// Mip levels actually used.
    pub fn used_mips(&self) -> &[MipDescriptor] {
        &self.mips[..(self.mip_count as usize).min(MAX_MIPMAPS)]
    }
}

/// Per-frame layout of the data block.
#[derive(Debug, Clone, Default)]
pub struct FrameDescriptor {
    /// Block position, relative to [`TableOfContents::frame_data_offset`].
    pub file_position: u64,
    pub byte_length: u64,
    pub meshes: Vec<FrameMeshDescriptor>,
    pub images: Vec<FrameImageDescriptor>,
    /// Some mesh or image reuses a stream from an earlier frame.
    pub has_omitted_streams: bool,
    /// Frames `[dependency ..= self]` must be materialized in order, and kept
    /// alive, to rebuild this frame.
    pub dependency: u32,
}

/// Parsed container directory. Read-only after parsing.
#[derive(Debug, Clone, Default)]
pub struct TableOfContents {
    pub version: Version,
    pub source_file: String,
    pub creation_date: String,
    pub time_per_frame: f32,
    pub frame_rate: f32,
    pub force_16bit_indices: bool,
    pub meshes: Vec<MeshDescriptor>,
    pub image_sequences: Vec<ImageSequenceDescriptor>,
    pub frames: Vec<FrameDescriptor>,
    /// Absolute file position where frame data begins.
    pub frame_data_offset: u64,
}

impl TableOfContents {
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Whether frame 0 has to be cached outside the streaming window.
    pub fn has_constant_streams(&self) -> bool {
        self.meshes.iter().any(|m| m.constant) || self.image_sequences.iter().any(|s| s.constant)
    }
}

/// Parse a table of contents, accepting files compatible with [`ENGINE_VERSION`].
pub fn read_toc<R: Read>(reader: R) -> Result<TableOfContents> {
    read_toc_for(reader, ENGINE_VERSION)
}

/// Parse a table of contents, accepting files compatible with `engine`.
#[tracing::instrument(skip_all, fields(engine = %engine))]
pub fn read_toc_for<R: Read>(reader: R, engine: Version) -> Result<TableOfContents> {
    let mut r = TocReader::new(reader);

    let version = r.version()?;
    if !version.is_compatible_with(&engine) {
        return Err(Error::IncompatibleVersion { file: version, engine });
    }

    let mut toc = TableOfContents {
        version,
        source_file: r.string()?,
        creation_date: r.string()?,
        time_per_frame: r.f32()?,
        frame_rate: r.f32()?,
        force_16bit_indices: r.u32()? != 0,
        ..Default::default()
    };

    let mesh_count = r.u32()?;
    for _ in 0..mesh_count {
        toc.meshes.push(r.mesh()?);
    }

    let sequence_count = r.u32()?;
    for _ in 0..sequence_count {
        toc.image_sequences.push(r.image_sequence()?);
    }

    let frame_count = r.u32()?;
    for index in 0..frame_count {
        let frame = r.frame(toc.meshes.len(), toc.image_sequences.len())?;
        validate_frame(index, &frame)?;
        toc.frames.push(frame);
    }

    toc.frame_data_offset = r.pos;

    deps::resolve_dependencies(&mut toc.frames)?;

    tracing::info!(
        version = %toc.version,
        frames = toc.frames.len(),
        meshes = toc.meshes.len(),
        image_sequences = toc.image_sequences.len(),
        data_offset = toc.frame_data_offset,
        "table of contents parsed"
    );

    Ok(toc)
}

/// The block record must not overflow and every stored stream must fit
/// inside the block.
fn validate_frame(index: u32, frame: &FrameDescriptor) -> Result<()> {
    if frame.file_position.checked_add(frame.byte_length).is_none() {
        return Err(Error::invalid(format!(
            "frame {index}: block at {} with {} bytes overflows",
            frame.file_position, frame.byte_length
        )));
    }

    let check = |what: &str, range: &StreamRange| -> Result<()> {
        if range.seek < OMITTED_SEEK {
            return Err(Error::invalid(format!(
                "frame {index}: {what} has negative seek {}",
                range.seek
            )));
        }
        match range.end() {
            Some(end) if end > frame.byte_length => Err(Error::invalid(format!(
                "frame {index}: {what} ends at {end}, block is {} bytes",
                frame.byte_length
            ))),
            _ => Ok(()),
        }
    };

    for (m, mesh) in frame.meshes.iter().enumerate() {
        for (mask, range) in mesh.streams() {
            check(&format!("mesh {m} stream {mask:?}"), &range)?;
        }
    }
    for (i, image) in frame.images.iter().enumerate() {
        if image.mip_count as usize > MAX_MIPMAPS {
            return Err(Error::invalid(format!(
                "frame {index}: image {i} has {} mips (max {MAX_MIPMAPS})",
                image.mip_count
            )));
        }
        for (level, mip) in image.used_mips().iter().enumerate() {
            check(&format!("image {i} mip {level}"), &mip.range)?;
        }
    }
    Ok(())
}

/// Little-endian field reader that tracks how many bytes it consumed.
struct TocReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> TocReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }

    fn eof(&self, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof(self.pos)
        } else {
            Error::Io(e)
        }
    }

    fn u8(&mut self) -> Result<u8> {
        let v = self.inner.read_u8().map_err(|e| self.eof(e))?;
        self.pos += 1;
        Ok(v)
    }

    fn bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    fn u32(&mut self) -> Result<u32> {
        let v = self.inner.read_u32::<LittleEndian>().map_err(|e| self.eof(e))?;
        self.pos += 4;
        Ok(v)
    }

    fn i32(&mut self) -> Result<i32> {
        let v = self.inner.read_i32::<LittleEndian>().map_err(|e| self.eof(e))?;
        self.pos += 4;
        Ok(v)
    }

    fn u64(&mut self) -> Result<u64> {
        let v = self.inner.read_u64::<LittleEndian>().map_err(|e| self.eof(e))?;
        self.pos += 8;
        Ok(v)
    }

    fn f32(&mut self) -> Result<f32> {
        let v = self.inner.read_f32::<LittleEndian>().map_err(|e| self.eof(e))?;
        self.pos += 4;
        Ok(v)
    }

    fn vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn vec4(&mut self) -> Result<Vec4> {
        Ok(Vec4::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    fn version(&mut self) -> Result<Version> {
        let v = Version::new(self.u8()?, self.u8()?, self.u8()?);
        let _reserved = self.u8()?;
        Ok(v)
    }

    /// i32 length prefix followed by raw bytes. Non-positive length is empty.
    fn string(&mut self) -> Result<String> {
        let len = self.i32()?;
        if len <= 0 {
            return Ok(String::new());
        }
        let len = len as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::invalid(format!("string of {len} bytes at {}", self.pos)));
        }
        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).map_err(|e| self.eof(e))?;
        self.pos += len as u64;
        // Strip a trailing null if the writer kept one
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(end);
        Ok(String::from_utf8(buf)?)
    }

    fn encoding(&mut self, channel: Channel) -> Result<Encoding> {
        let raw = self.i32()?;
        Encoding::from_wire(channel, raw).ok_or_else(|| {
            Error::invalid(format!("invalid {} format {raw}", channel.name()))
        })
    }

    fn range(&mut self) -> Result<StreamRange> {
        Ok(StreamRange::new(self.i32()?, self.u32()?))
    }

    fn mesh(&mut self) -> Result<MeshDescriptor> {
        Ok(MeshDescriptor {
            name: self.string()?,
            constant: self.bool()?,
            max_vertices: self.u64()?,
            max_surfaces: self.u64()?,
            formats: MeshFormats {
                position: self.encoding(Channel::Position)?,
                normal: self.encoding(Channel::Normal)?,
                tangent: self.encoding(Channel::Tangent)?,
                velocity: self.encoding(Channel::Velocity)?,
                texcoord: self.encoding(Channel::TexCoord)?,
                color: self.encoding(Channel::Color)?,
            },
        })
    }

    fn image_sequence(&mut self) -> Result<ImageSequenceDescriptor> {
        let name = self.string()?;
        let raw = self.i32()?;
        let format = ImageFormat::from_wire(raw)
            .ok_or_else(|| Error::invalid(format!("invalid image format {raw}")))?;
        Ok(ImageSequenceDescriptor {
            name,
            format,
            constant: self.bool()?,
            width: self.u32()?,
            height: self.u32()?,
            mip_count: self.u32()?,
        })
    }

    fn frame(&mut self, mesh_count: usize, image_count: usize) -> Result<FrameDescriptor> {
        let mut frame = FrameDescriptor {
            file_position: self.u64()?,
            byte_length: self.u64()?,
            meshes: Vec::with_capacity(mesh_count),
            images: Vec::with_capacity(image_count),
            ..Default::default()
        };
        for _ in 0..mesh_count {
            frame.meshes.push(self.frame_mesh()?);
        }
        for _ in 0..image_count {
            frame.images.push(self.frame_image()?);
        }
        Ok(frame)
    }

    fn frame_mesh(&mut self) -> Result<FrameMeshDescriptor> {
        let vertex_count = self.u32()?;
        let surface_count = self.u32()?;

        let section_count = self.u32()?;
        let mut sections = SmallVec::new();
        for _ in 0..section_count {
            sections.push(MeshSection {
                vertex_start: self.u32()?,
                index_start: self.u32()?,
                surface_count: self.u32()?,
                min_vertex_index: self.u32()?,
                max_vertex_index: self.u32()?,
            });
        }

        let indices = self.range()?;
        let positions = self.range()?;
        let position_quantization = Quantization {
            center: self.vec3()?,
            extents: self.vec3()?,
        };
        let normals = self.range()?;
        let tangents = self.range()?;
        let velocities = self.range()?;
        let velocity_quantization = Quantization {
            center: self.vec3()?,
            extents: self.vec3()?,
        };

        // seeks for every channel come first, then sizes
        let mut texcoords = [StreamRange::default(); MAX_TEXCOORDS];
        for tc in texcoords.iter_mut() {
            tc.seek = self.i32()?;
        }
        for tc in texcoords.iter_mut() {
            tc.size = self.u32()?;
        }

        let mut colors = [StreamRange::default(); MAX_COLORS];
        for c in colors.iter_mut() {
            c.seek = self.i32()?;
        }
        for c in colors.iter_mut() {
            c.size = self.u32()?;
        }
        let color_extents = [self.vec4()?, self.vec4()?];

        let bounds = Bounds::new(self.vec3()?, self.vec3()?);

        Ok(FrameMeshDescriptor {
            vertex_count,
            surface_count,
            sections,
            indices,
            positions,
            position_quantization,
            normals,
            tangents,
            velocities,
            velocity_quantization,
            texcoords,
            colors,
            color_extents,
            bounds,
            ..Default::default()
        })
    }

    fn frame_image(&mut self) -> Result<FrameImageDescriptor> {
        let mut image = FrameImageDescriptor {
            mip_count: self.u32()?,
            ..Default::default()
        };
        // all slots are on disk, used or not
        for mip in image.mips.iter_mut() {
            *mip = MipDescriptor {
                width: self.u32()?,
                height: self.u32()?,
                row_pitch: self.u32()?,
                slice_pitch: self.u32()?,
                range: self.range()?,
            };
        }
        Ok(image)
    }
}
