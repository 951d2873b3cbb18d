//! Playback metadata derived from the table of contents.

use serde::Serialize;

use super::format::{Encoding, ImageFormat, MAX_16BIT_VERTEX_COUNT};
use super::toc::{MeshFormats, TableOfContents};

/// Everything a consumer needs to allocate downstream resources.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackInfo {
    pub time_per_frame: f32,
    pub frame_rate: f32,
    pub frame_count: u32,
    /// Seconds: `frame_count * time_per_frame`.
    pub duration: f32,
    pub source_file: String,
    pub creation_date: String,
    pub force_16bit_indices: bool,
    pub meshes: Vec<MeshInfo>,
    pub image_sequences: Vec<ImageSequenceInfo>,
    pub optimization_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeshInfo {
    pub index: u32,
    pub name: String,
    pub max_vertices: u64,
    pub max_surfaces: u64,
    pub constant: bool,
    pub force_16bit_indices: bool,
    pub position_format: &'static str,
    pub normal_format: &'static str,
    pub tangent_format: &'static str,
    pub velocity_format: &'static str,
    pub texcoord_format: &'static str,
    pub color_format: &'static str,
    #[serde(skip)]
    pub formats: MeshFormats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageSequenceInfo {
    pub index: u32,
    pub name: String,
    /// "RGBA8", "DXT1", "DXT3" or "DXT5"
    pub format: &'static str,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
    pub frame_count: u32,
    pub constant: bool,
    #[serde(skip)]
    pub image_format: ImageFormat,
}

impl PlaybackInfo {
    pub fn from_toc(toc: &TableOfContents) -> Self {
        let frame_count = toc.frame_count();

        let meshes = toc
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| MeshInfo {
                index: i as u32,
                name: m.name.clone(),
                max_vertices: m.max_vertices,
                max_surfaces: m.max_surfaces,
                constant: m.constant,
                force_16bit_indices: toc.force_16bit_indices,
                position_format: m.formats.position.name(),
                normal_format: m.formats.normal.name(),
                tangent_format: m.formats.tangent.name(),
                velocity_format: m.formats.velocity.name(),
                texcoord_format: m.formats.texcoord.name(),
                color_format: m.formats.color.name(),
                formats: m.formats,
            })
            .collect();

        let image_sequences = toc
            .image_sequences
            .iter()
            .enumerate()
            .map(|(i, s)| ImageSequenceInfo {
                index: i as u32,
                name: s.name.clone(),
                format: s.format.name(),
                width: s.width,
                height: s.height,
                mip_count: s.mip_count,
                frame_count,
                constant: s.constant,
                image_format: s.format,
            })
            .collect();

        Self {
            time_per_frame: toc.time_per_frame,
            frame_rate: toc.frame_rate,
            frame_count,
            duration: frame_count as f32 * toc.time_per_frame,
            source_file: toc.source_file.clone(),
            creation_date: toc.creation_date.clone(),
            force_16bit_indices: toc.force_16bit_indices,
            meshes,
            image_sequences,
            optimization_suggestions: optimization_suggestions(toc),
        }
    }
}

/// Cheap hints about encodings that would shrink the container.
pub fn optimization_suggestions(toc: &TableOfContents) -> Vec<String> {
    let mut out = Vec::new();

    for mesh in &toc.meshes {
        if mesh.max_vertices > MAX_16BIT_VERTEX_COUNT as u64 {
            if mesh.formats.position == Encoding::Full {
                out.push(format!(
                    "mesh '{}': {} vertices with full-precision positions, consider half precision",
                    mesh.name, mesh.max_vertices
                ));
            }
            if mesh.formats.normal == Encoding::Full {
                out.push(format!(
                    "mesh '{}': {} vertices with full-precision normals, consider half or byte precision",
                    mesh.name, mesh.max_vertices
                ));
            }
        }
    }

    for (i, seq) in toc.image_sequences.iter().enumerate() {
        if seq.constant || toc.frames.len() < 2 {
            continue;
        }
        let static_data = toc.frames[1..].iter().all(|f| {
            f.images
                .get(i)
                .is_some_and(|img| img.used_mips().iter().all(|m| m.range.is_omitted()))
        });
        if static_data {
            out.push(format!(
                "image sequence '{}' never changes, consider marking it constant",
                seq.name
            ));
        }
    }

    out
}
