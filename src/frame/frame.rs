//! Materialized frames and their per-mesh / per-image views.

use std::collections::BTreeSet;
use std::time::Duration;

use smallvec::SmallVec;

use super::decode;
use super::view::{FrameBuffer, StreamView};
use crate::container::{
    ElementFormat, MeshFormats, MeshSection, Quantization, StreamMask, MAX_COLORS, MAX_TEXCOORDS,
};
use crate::util::{Bounds, Vec2, Vec3, Vec4};

/// Index buffer of one mesh; width can change from frame to frame.
#[derive(Debug, Clone)]
pub enum IndexView {
    U16(StreamView),
    U32(StreamView),
}

impl IndexView {
    pub(crate) fn from_view(view: StreamView) -> Self {
        match view.format() {
            ElementFormat::IndexU32 => Self::U32(view),
            _ => Self::U16(view),
        }
    }

    pub fn view(&self) -> &StreamView {
        match self {
            Self::U16(v) | Self::U32(v) => v,
        }
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.view().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_u32(&self) -> Vec<u32> {
        decode::indices_u32(self.view())
    }
}

/// One mesh on one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameMesh {
    pub vertex_count: u32,
    pub surface_count: u32,
    pub sections: SmallVec<[MeshSection; 4]>,
    pub bounds: Bounds,
    pub formats: MeshFormats,
    pub indices: Option<IndexView>,
    pub positions: Option<StreamView>,
    pub position_quantization: Quantization,
    pub normals: Option<StreamView>,
    pub tangents: Option<StreamView>,
    pub velocities: Option<StreamView>,
    pub velocity_quantization: Quantization,
    pub texcoords: [Option<StreamView>; MAX_TEXCOORDS],
    pub colors: [Option<StreamView>; MAX_COLORS],
    pub color_extents: [Vec4; MAX_COLORS],
    /// Omitted streams with nothing to borrow from. Only transient frames
    /// materialized without their full dependency chain have any.
    pub unresolved: StreamMask,
}

impl FrameMesh {
    /// Every present view with its mask bit.
    pub fn views(&self) -> impl Iterator<Item = (StreamMask, &StreamView)> {
        let fixed = [
            (StreamMask::INDICES, self.indices.as_ref().map(IndexView::view)),
            (StreamMask::POSITIONS, self.positions.as_ref()),
            (StreamMask::NORMALS, self.normals.as_ref()),
            (StreamMask::TANGENTS, self.tangents.as_ref()),
            (StreamMask::VELOCITIES, self.velocities.as_ref()),
        ];
        let texcoords = self
            .texcoords
            .iter()
            .enumerate()
            .map(|(i, v)| (StreamMask::texcoord(i), v.as_ref()));
        let colors = self
            .colors
            .iter()
            .enumerate()
            .map(|(i, v)| (StreamMask::color(i), v.as_ref()));
        fixed
            .into_iter()
            .chain(texcoords)
            .chain(colors)
            .filter_map(|(m, v)| v.map(|v| (m, v)))
    }

    pub fn decoded_positions(&self) -> Vec<Vec3> {
        self.positions
            .as_ref()
            .map(|v| decode::decode_positions(v, &self.position_quantization))
            .unwrap_or_default()
    }

    pub fn decoded_normals(&self) -> Vec<Vec3> {
        self.normals.as_ref().map(decode::decode_normals).unwrap_or_default()
    }

    pub fn decoded_tangents(&self) -> Vec<Vec4> {
        self.tangents.as_ref().map(decode::decode_tangents).unwrap_or_default()
    }

    pub fn decoded_velocities(&self) -> Vec<Vec3> {
        self.velocities
            .as_ref()
            .map(|v| decode::decode_velocities(v, &self.velocity_quantization))
            .unwrap_or_default()
    }

    pub fn decoded_texcoords(&self, channel: usize) -> Vec<Vec2> {
        self.texcoords
            .get(channel)
            .and_then(Option::as_ref)
            .map(decode::decode_texcoords)
            .unwrap_or_default()
    }

    pub fn decoded_colors(&self, channel: usize) -> Vec<Vec4> {
        match (self.colors.get(channel).and_then(Option::as_ref), self.color_extents.get(channel)) {
            (Some(v), Some(extents)) => decode::decode_colors(v, self.formats.color, *extents),
            _ => Vec::new(),
        }
    }

    pub fn decoded_indices(&self) -> Vec<u32> {
        self.indices.as_ref().map(IndexView::to_u32).unwrap_or_default()
    }
}

/// One mip level of an image frame.
#[derive(Debug, Clone)]
pub struct MipView {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub data: StreamView,
}

/// One image sequence on one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameImage {
    pub mip_count: u32,
    pub mips: SmallVec<[Option<MipView>; 8]>,
    /// Bit per omitted mip level with nothing to borrow from.
    pub unresolved_mips: u16,
}

impl FrameImage {
    pub fn mip(&self, level: usize) -> Option<&MipView> {
        self.mips.get(level).and_then(Option::as_ref)
    }
}

/// Decoded, in-memory result for one frame index.
///
/// Owns the data block read for this frame. Streams reused from earlier
/// frames are views into those frames' blocks, which stay alive as long as
/// this frame does.
#[derive(Debug, Clone)]
pub struct MaterializedFrame {
    pub(crate) index: u32,
    pub(crate) buffer: FrameBuffer,
    pub(crate) meshes: Vec<FrameMesh>,
    pub(crate) images: Vec<FrameImage>,
    pub(crate) read_time: Duration,
    pub(crate) process_time: Duration,
}

impl MaterializedFrame {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Block read for this frame.
    #[inline]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Bytes owned by this frame (borrowed streams not included).
    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.buffer.len() as u64
    }

    #[inline]
    pub fn read_time(&self) -> Duration {
        self.read_time
    }

    #[inline]
    pub fn process_time(&self) -> Duration {
        self.process_time
    }

    pub fn meshes(&self) -> &[FrameMesh] {
        &self.meshes
    }

    pub fn mesh(&self, mesh: usize) -> Option<&FrameMesh> {
        self.meshes.get(mesh)
    }

    pub fn images(&self) -> &[FrameImage] {
        &self.images
    }

    pub fn image(&self, image: usize) -> Option<&FrameImage> {
        self.images.get(image)
    }

    pub fn vertex_count(&self, mesh: usize) -> u32 {
        self.mesh(mesh).map_or(0, |m| m.vertex_count)
    }

    pub fn surface_count(&self, mesh: usize) -> u32 {
        self.mesh(mesh).map_or(0, |m| m.surface_count)
    }

    pub fn sections(&self, mesh: usize) -> &[MeshSection] {
        self.mesh(mesh).map_or(&[][..], |m| m.sections.as_slice())
    }

    pub fn bounds(&self, mesh: usize) -> Bounds {
        self.mesh(mesh).map_or(Bounds::ZERO, |m| m.bounds)
    }

    pub fn indices(&self, mesh: usize) -> Option<&IndexView> {
        self.mesh(mesh)?.indices.as_ref()
    }

    pub fn positions(&self, mesh: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.positions.as_ref()
    }

    pub fn normals(&self, mesh: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.normals.as_ref()
    }

    pub fn tangents(&self, mesh: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.tangents.as_ref()
    }

    pub fn velocities(&self, mesh: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.velocities.as_ref()
    }

    pub fn texcoords(&self, mesh: usize, channel: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.texcoords.get(channel)?.as_ref()
    }

    pub fn colors(&self, mesh: usize, channel: usize) -> Option<&StreamView> {
        self.mesh(mesh)?.colors.get(channel)?.as_ref()
    }

    pub fn position_quantization(&self, mesh: usize) -> Quantization {
        self.mesh(mesh).map(|m| m.position_quantization).unwrap_or_default()
    }

    pub fn velocity_quantization(&self, mesh: usize) -> Quantization {
        self.mesh(mesh).map(|m| m.velocity_quantization).unwrap_or_default()
    }

    pub fn color_extents(&self, mesh: usize, channel: usize) -> Vec4 {
        self.mesh(mesh)
            .and_then(|m| m.color_extents.get(channel).copied())
            .unwrap_or(Vec4::ONE)
    }

    /// Raw bytes of one mip level.
    pub fn image_data(&self, image: usize, mip: usize) -> Option<&[u8]> {
        Some(self.image(image)?.mip(mip)?.data.bytes())
    }

    /// No omitted stream was left without data.
    pub fn is_complete(&self) -> bool {
        self.meshes.iter().all(|m| m.unresolved.is_empty())
            && self.images.iter().all(|i| i.unresolved_mips == 0)
    }

    /// Earlier frames whose blocks this frame still points into.
    pub fn borrowed_frames(&self) -> BTreeSet<u32> {
        let meshes = self.meshes.iter().flat_map(|m| m.views().map(|(_, v)| v.source_frame()));
        let images = self
            .images
            .iter()
            .flat_map(|i| i.mips.iter().flatten().map(|m| m.data.source_frame()));
        meshes
            .chain(images)
            .filter(|&f| f != self.index)
            .collect()
    }
}
