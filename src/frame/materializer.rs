//! Reads frame blocks and builds [`MaterializedFrame`]s.

use std::sync::Arc;
use std::time::Instant;

use smallvec::SmallVec;

use super::frame::{FrameImage, FrameMesh, IndexView, MaterializedFrame, MipView};
use super::view::{FrameBuffer, StreamView};
use crate::container::{
    index_format, ByteSource, Channel, ElementFormat, FrameDescriptor, FrameMeshDescriptor,
    MeshDescriptor, StreamMask, StreamRange, TableOfContents,
};
use crate::stream::StatsCollector;
use crate::util::{Error, Result};

/// Turns TOC frame records into materialized frames.
pub struct Materializer {
    source: Box<dyn ByteSource>,
    toc: Arc<TableOfContents>,
    stats: Option<Arc<StatsCollector>>,
}

impl Materializer {
    pub fn new(source: Box<dyn ByteSource>, toc: Arc<TableOfContents>) -> Self {
        Self {
            source,
            toc,
            stats: None,
        }
    }

    /// Feed bytes read and timings of every frame into `stats`.
    pub fn with_stats(mut self, stats: Arc<StatsCollector>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn toc(&self) -> &Arc<TableOfContents> {
        &self.toc
    }

    /// Materialize frame `index`.
    ///
    /// Omitted streams are borrowed from `ancestor`, which must be frame
    /// `index - 1`. Without an ancestor they are left unresolved (see
    /// [`MaterializedFrame::is_complete`]).
    #[tracing::instrument(skip_all, fields(frame = index))]
    pub fn materialize(
        &mut self,
        index: u32,
        ancestor: Option<&MaterializedFrame>,
    ) -> Result<MaterializedFrame> {
        let toc = Arc::clone(&self.toc);
        let desc = toc
            .frames
            .get(index as usize)
            .ok_or_else(|| Error::other(format!("frame {index} out of range")))?;

        if let Some(a) = ancestor {
            if a.index() + 1 != index {
                return Err(Error::other(format!(
                    "frame {index} cannot borrow from frame {}",
                    a.index()
                )));
            }
        }

        let read_start = Instant::now();
        let (position, length) = self.block_range(index, toc.frame_data_offset, desc)?;
        let mut bytes = vec![0u8; length];
        self.source.read_exact_at(position, &mut bytes)?;
        let read_time = read_start.elapsed();

        let process_start = Instant::now();
        let buffer = FrameBuffer::new(index, bytes);

        let meshes = desc
            .meshes
            .iter()
            .zip(&toc.meshes)
            .enumerate()
            .map(|(m, (fm, mesh))| {
                let inherited = ancestor.and_then(|a| a.mesh(m));
                build_mesh(&buffer, mesh, fm, inherited, toc.force_16bit_indices)
            })
            .collect::<Result<Vec<_>>>()?;

        let images = build_images(&buffer, desc, ancestor)?;
        let process_time = process_start.elapsed();

        if let Some(stats) = &self.stats {
            stats.record_frame(desc.byte_length, read_time, process_time);
        }

        tracing::trace!(
            bytes = desc.byte_length,
            read_us = read_time.as_micros() as u64,
            process_us = process_time.as_micros() as u64,
            "frame materialized"
        );

        Ok(MaterializedFrame {
            index,
            buffer,
            meshes,
            images,
            read_time,
            process_time,
        })
    }

    /// Absolute position and length of a frame block.
    ///
    /// The block must lie inside the source; nothing is allocated for a
    /// record that points past its end.
    fn block_range(
        &mut self,
        index: u32,
        data_offset: u64,
        desc: &FrameDescriptor,
    ) -> Result<(u64, usize)> {
        let position = data_offset.checked_add(desc.file_position).ok_or_else(|| {
            Error::invalid(format!(
                "frame {index}: block position {} overflows",
                desc.file_position
            ))
        })?;
        let end = position.checked_add(desc.byte_length).ok_or_else(|| {
            Error::invalid(format!(
                "frame {index}: block length {} overflows",
                desc.byte_length
            ))
        })?;
        let length = usize::try_from(desc.byte_length).map_err(|_| {
            Error::invalid(format!(
                "frame {index}: block length {} is not addressable",
                desc.byte_length
            ))
        })?;

        let available = self.source.source_len()?;
        if end > available {
            return Err(Error::UnexpectedEof(available));
        }
        Ok((position, length))
    }

    /// Materialize `index`, first loading its dependency chain as transient
    /// frames when no ancestor is available and the frame omits streams.
    ///
    /// Transient frames are dropped on return; the target keeps alive the
    /// blocks it borrows from.
    pub fn materialize_with_chain(
        &mut self,
        index: u32,
        ancestor: Option<&MaterializedFrame>,
    ) -> Result<MaterializedFrame> {
        let (has_omitted, dependency) = self
            .toc
            .frames
            .get(index as usize)
            .map(|f| (f.has_omitted_streams, f.dependency))
            .ok_or_else(|| Error::other(format!("frame {index} out of range")))?;

        if ancestor.is_some() || !has_omitted {
            return self.materialize(index, ancestor);
        }

        tracing::debug!(
            frame = index,
            from = dependency,
            transient = index - dependency,
            "loading dependency chain"
        );

        let mut previous: Option<MaterializedFrame> = None;
        for i in dependency..index {
            previous = Some(self.materialize(i, previous.as_ref())?);
        }
        self.materialize(index, previous.as_ref())
    }
}

/// Resolve one stream: borrow it when omitted, view the fresh block when stored.
///
/// Returns the view plus whether it is an unresolved omission.
fn resolve(
    buffer: &FrameBuffer,
    range: StreamRange,
    format: Option<ElementFormat>,
    inherited: Option<(Option<&StreamView>, bool)>,
) -> Result<(Option<StreamView>, bool)> {
    if range.is_omitted() {
        return Ok(match inherited {
            Some((view, unresolved)) => (view.cloned(), unresolved),
            None => (None, format.is_some()),
        });
    }
    match format {
        Some(format) if range.has_data() => {
            let view = buffer.view(range.seek as usize, range.size as usize, format)?;
            Ok((Some(view), false))
        }
        _ => Ok((None, false)),
    }
}

fn build_mesh(
    buffer: &FrameBuffer,
    mesh: &MeshDescriptor,
    fm: &FrameMeshDescriptor,
    inherited: Option<&FrameMesh>,
    force_16bit: bool,
) -> Result<FrameMesh> {
    let mut unresolved = StreamMask::empty();
    let formats = mesh.formats;

    let mut stream = |bit: StreamMask,
                      range: StreamRange,
                      format: Option<ElementFormat>,
                      pick: fn(&FrameMesh) -> Option<&StreamView>|
     -> Result<Option<StreamView>> {
        let from = inherited.map(|m| (pick(m), m.unresolved.contains(bit)));
        let (view, missing) = resolve(buffer, range, format, from)?;
        if missing {
            unresolved |= bit;
        }
        Ok(view)
    };

    let indices = stream(
        StreamMask::INDICES,
        fm.indices,
        Some(index_format(fm.vertex_count, force_16bit)),
        |m| m.indices.as_ref().map(IndexView::view),
    )?
    .map(IndexView::from_view);

    let positions = stream(
        StreamMask::POSITIONS,
        fm.positions,
        formats.position.element_format(Channel::Position),
        |m| m.positions.as_ref(),
    )?;
    let normals = stream(
        StreamMask::NORMALS,
        fm.normals,
        formats.normal.element_format(Channel::Normal),
        |m| m.normals.as_ref(),
    )?;
    let tangents = stream(
        StreamMask::TANGENTS,
        fm.tangents,
        formats.tangent.element_format(Channel::Tangent),
        |m| m.tangents.as_ref(),
    )?;
    let velocities = stream(
        StreamMask::VELOCITIES,
        fm.velocities,
        formats.velocity.element_format(Channel::Velocity),
        |m| m.velocities.as_ref(),
    )?;

    let texcoord_format = formats.texcoord.element_format(Channel::TexCoord);
    let texcoords = [
        stream(StreamMask::TEXCOORD0, fm.texcoords[0], texcoord_format, |m| m.texcoords[0].as_ref())?,
        stream(StreamMask::TEXCOORD1, fm.texcoords[1], texcoord_format, |m| m.texcoords[1].as_ref())?,
        stream(StreamMask::TEXCOORD2, fm.texcoords[2], texcoord_format, |m| m.texcoords[2].as_ref())?,
        stream(StreamMask::TEXCOORD3, fm.texcoords[3], texcoord_format, |m| m.texcoords[3].as_ref())?,
    ];

    let color_format = formats.color.element_format(Channel::Color);
    let colors = [
        stream(StreamMask::COLOR0, fm.colors[0], color_format, |m| m.colors[0].as_ref())?,
        stream(StreamMask::COLOR1, fm.colors[1], color_format, |m| m.colors[1].as_ref())?,
    ];

    Ok(FrameMesh {
        vertex_count: fm.vertex_count,
        surface_count: fm.surface_count,
        sections: fm.sections.clone(),
        bounds: fm.bounds,
        formats,
        indices,
        positions,
        position_quantization: fm.position_quantization,
        normals,
        tangents,
        velocities,
        velocity_quantization: fm.velocity_quantization,
        texcoords,
        colors,
        color_extents: fm.color_extents,
        unresolved,
    })
}

fn build_images(
    buffer: &FrameBuffer,
    desc: &FrameDescriptor,
    ancestor: Option<&MaterializedFrame>,
) -> Result<Vec<FrameImage>> {
    let mut images = Vec::with_capacity(desc.images.len());
    for (i, fi) in desc.images.iter().enumerate() {
        let inherited = ancestor.and_then(|a| a.image(i));
        let mut image = FrameImage {
            mip_count: fi.mip_count,
            mips: SmallVec::new(),
            unresolved_mips: 0,
        };
        for (level, mip) in fi.used_mips().iter().enumerate() {
            let view = if mip.range.is_omitted() {
                match inherited {
                    Some(prev) => {
                        let view = prev.mip(level).cloned();
                        if view.is_none() || prev.unresolved_mips & (1 << level) != 0 {
                            image.unresolved_mips |= 1 << level;
                        }
                        view
                    }
                    None => {
                        image.unresolved_mips |= 1 << level;
                        None
                    }
                }
            } else if mip.range.has_data() {
                Some(MipView {
                    width: mip.width,
                    height: mip.height,
                    row_pitch: mip.row_pitch,
                    slice_pitch: mip.slice_pitch,
                    data: buffer.view(
                        mip.range.seek as usize,
                        mip.range.size as usize,
                        ElementFormat::Raw,
                    )?,
                })
            } else {
                None
            };
            image.mips.push(view);
        }
        images.push(image);
    }
    Ok(images)
}
