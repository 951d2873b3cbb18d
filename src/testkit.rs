//! Fixture encoder for tests: writes containers in the on-disk layout.
//!
//! Only depends on std, byteorder and tempfile so integration tests can pull it
//! in with `#[path]`.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

type LE = LittleEndian;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureStream {
    pub seek: i32,
    pub size: u32,
}

impl FixtureStream {
    pub const OMITTED: Self = Self { seek: -1, size: 0 };
    pub const EMPTY: Self = Self { seek: 0, size: 0 };
}

#[derive(Debug, Clone)]
pub struct FixtureMesh {
    pub name: String,
    pub constant: bool,
    pub max_vertices: u64,
    pub max_surfaces: u64,
    /// position, normal, tangent, velocity, texcoord, color (wire values)
    pub formats: [i32; 6],
}

impl FixtureMesh {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            constant: false,
            max_vertices: 3,
            max_surfaces: 1,
            formats: [0; 6],
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureImage {
    pub name: String,
    pub format: i32,
    pub constant: bool,
    pub width: u32,
    pub height: u32,
    pub mip_count: u32,
}

impl FixtureImage {
    pub fn new(name: &str, format: i32, width: u32, height: u32, mip_count: u32) -> Self {
        Self {
            name: name.into(),
            format,
            constant: false,
            width,
            height,
            mip_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureFrameMesh {
    pub vertex_count: u32,
    pub surface_count: u32,
    pub sections: Vec<[u32; 5]>,
    pub indices: FixtureStream,
    pub positions: FixtureStream,
    pub position_center: [f32; 3],
    pub position_extents: [f32; 3],
    pub normals: FixtureStream,
    pub tangents: FixtureStream,
    pub velocities: FixtureStream,
    pub velocity_center: [f32; 3],
    pub velocity_extents: [f32; 3],
    pub texcoords: [FixtureStream; 4],
    pub colors: [FixtureStream; 2],
    pub color_extents: [[f32; 4]; 2],
    pub bounds_center: [f32; 3],
    pub bounds_size: [f32; 3],
}

impl FixtureFrameMesh {
    /// Every stream stored (empty), unit quantization.
    pub fn new(vertex_count: u32, surface_count: u32) -> Self {
        Self {
            vertex_count,
            surface_count,
            sections: Vec::new(),
            indices: FixtureStream::EMPTY,
            positions: FixtureStream::EMPTY,
            position_center: [0.0; 3],
            position_extents: [1.0; 3],
            normals: FixtureStream::EMPTY,
            tangents: FixtureStream::EMPTY,
            velocities: FixtureStream::EMPTY,
            velocity_center: [0.0; 3],
            velocity_extents: [1.0; 3],
            texcoords: [FixtureStream::EMPTY; 4],
            colors: [FixtureStream::EMPTY; 2],
            color_extents: [[1.0; 4]; 2],
            bounds_center: [0.0; 3],
            bounds_size: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureMip {
    pub width: u32,
    pub height: u32,
    pub row_pitch: u32,
    pub slice_pitch: u32,
    pub seek: i32,
    pub size: u32,
}

impl FixtureMip {
    pub fn new(width: u32, height: u32, stream: FixtureStream) -> Self {
        Self {
            width,
            height,
            row_pitch: width * 4,
            slice_pitch: width * height * 4,
            seek: stream.seek,
            size: stream.size,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FixtureFrameImage {
    pub mip_count: u32,
    pub mips: [FixtureMip; 8],
}

impl FixtureFrameImage {
    pub fn new(mip_count: u32) -> Self {
        Self {
            mip_count,
            mips: Default::default(),
        }
    }
}

/// One frame: its data block plus per-mesh/per-image layout.
#[derive(Debug, Clone, Default)]
pub struct FixtureFrame {
    pub data: Vec<u8>,
    pub meshes: Vec<FixtureFrameMesh>,
    pub images: Vec<FixtureFrameImage>,
    /// Written in place of the real `(file_position, byte_length)` record.
    pub record: Option<(u64, u64)>,
}

impl FixtureFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the data block and return their range.
    pub fn push(&mut self, bytes: &[u8]) -> FixtureStream {
        let seek = self.data.len() as i32;
        self.data.extend_from_slice(bytes);
        FixtureStream {
            seek,
            size: bytes.len() as u32,
        }
    }

    pub fn push_f32(&mut self, values: &[f32]) -> FixtureStream {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            bytes.write_f32::<LE>(*v).unwrap();
        }
        self.push(&bytes)
    }

    pub fn push_u16(&mut self, values: &[u16]) -> FixtureStream {
        let mut bytes = Vec::with_capacity(values.len() * 2);
        for v in values {
            bytes.write_u16::<LE>(*v).unwrap();
        }
        self.push(&bytes)
    }

    pub fn push_u32(&mut self, values: &[u32]) -> FixtureStream {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            bytes.write_u32::<LE>(*v).unwrap();
        }
        self.push(&bytes)
    }

    pub fn push_i16(&mut self, values: &[i16]) -> FixtureStream {
        let mut bytes = Vec::with_capacity(values.len() * 2);
        for v in values {
            bytes.write_i16::<LE>(*v).unwrap();
        }
        self.push(&bytes)
    }
}

/// Whole container, written with [`ContainerBuilder::build`].
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    pub version: [u8; 3],
    pub source_file: String,
    pub creation_date: String,
    pub time_per_frame: f32,
    pub frame_rate: f32,
    pub force_16bit_indices: bool,
    pub meshes: Vec<FixtureMesh>,
    pub images: Vec<FixtureImage>,
    pub frames: Vec<FixtureFrame>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    /// Empty container at the engine version (0.5.0).
    pub fn new() -> Self {
        Self {
            version: [0, 5, 0],
            source_file: "fixture.abc".into(),
            creation_date: "2024-01-01".into(),
            time_per_frame: 1.0 / 30.0,
            frame_rate: 30.0,
            force_16bit_indices: false,
            meshes: Vec::new(),
            images: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Encode the TOC followed by every frame block, back to back.
    pub fn build(&self) -> Vec<u8> {
        let mut w = Vec::new();
        w.write_all(&self.version).unwrap();
        w.write_u8(0).unwrap();
        write_string(&mut w, &self.source_file);
        write_string(&mut w, &self.creation_date);
        w.write_f32::<LE>(self.time_per_frame).unwrap();
        w.write_f32::<LE>(self.frame_rate).unwrap();
        w.write_u32::<LE>(self.force_16bit_indices as u32).unwrap();

        w.write_u32::<LE>(self.meshes.len() as u32).unwrap();
        for m in &self.meshes {
            write_string(&mut w, &m.name);
            w.write_u8(m.constant as u8).unwrap();
            w.write_u64::<LE>(m.max_vertices).unwrap();
            w.write_u64::<LE>(m.max_surfaces).unwrap();
            for f in m.formats {
                w.write_i32::<LE>(f).unwrap();
            }
        }

        w.write_u32::<LE>(self.images.len() as u32).unwrap();
        for s in &self.images {
            write_string(&mut w, &s.name);
            w.write_i32::<LE>(s.format).unwrap();
            w.write_u8(s.constant as u8).unwrap();
            w.write_u32::<LE>(s.width).unwrap();
            w.write_u32::<LE>(s.height).unwrap();
            w.write_u32::<LE>(s.mip_count).unwrap();
        }

        w.write_u32::<LE>(self.frames.len() as u32).unwrap();
        let mut position = 0u64;
        for frame in &self.frames {
            let (file_position, byte_length) =
                frame.record.unwrap_or((position, frame.data.len() as u64));
            w.write_u64::<LE>(file_position).unwrap();
            w.write_u64::<LE>(byte_length).unwrap();
            position += frame.data.len() as u64;

            for m in &frame.meshes {
                w.write_u32::<LE>(m.vertex_count).unwrap();
                w.write_u32::<LE>(m.surface_count).unwrap();
                w.write_u32::<LE>(m.sections.len() as u32).unwrap();
                for s in &m.sections {
                    for v in s {
                        w.write_u32::<LE>(*v).unwrap();
                    }
                }
                write_stream(&mut w, m.indices);
                write_stream(&mut w, m.positions);
                write_f32s(&mut w, &m.position_center);
                write_f32s(&mut w, &m.position_extents);
                write_stream(&mut w, m.normals);
                write_stream(&mut w, m.tangents);
                write_stream(&mut w, m.velocities);
                write_f32s(&mut w, &m.velocity_center);
                write_f32s(&mut w, &m.velocity_extents);
                for t in &m.texcoords {
                    w.write_i32::<LE>(t.seek).unwrap();
                }
                for t in &m.texcoords {
                    w.write_u32::<LE>(t.size).unwrap();
                }
                for c in &m.colors {
                    w.write_i32::<LE>(c.seek).unwrap();
                }
                for c in &m.colors {
                    w.write_u32::<LE>(c.size).unwrap();
                }
                for e in &m.color_extents {
                    write_f32s(&mut w, e);
                }
                write_f32s(&mut w, &m.bounds_center);
                write_f32s(&mut w, &m.bounds_size);
            }

            for img in &frame.images {
                w.write_u32::<LE>(img.mip_count).unwrap();
                for mip in &img.mips {
                    w.write_u32::<LE>(mip.width).unwrap();
                    w.write_u32::<LE>(mip.height).unwrap();
                    w.write_u32::<LE>(mip.row_pitch).unwrap();
                    w.write_u32::<LE>(mip.slice_pitch).unwrap();
                    w.write_i32::<LE>(mip.seek).unwrap();
                    w.write_u32::<LE>(mip.size).unwrap();
                }
            }
        }

        for frame in &self.frames {
            w.write_all(&frame.data).unwrap();
        }
        w
    }

    /// Build and write to a temporary file.
    pub fn write_temp(&self) -> tempfile::NamedTempFile {
        write_temp(&self.build())
    }
}

pub fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(bytes).unwrap();
    tmp.flush().unwrap();
    tmp
}

fn write_string(w: &mut Vec<u8>, s: &str) {
    w.write_i32::<LE>(s.len() as i32).unwrap();
    w.write_all(s.as_bytes()).unwrap();
}

fn write_stream(w: &mut Vec<u8>, s: FixtureStream) {
    w.write_i32::<LE>(s.seek).unwrap();
    w.write_u32::<LE>(s.size).unwrap();
}

fn write_f32s(w: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        w.write_f32::<LE>(*v).unwrap();
    }
}

/// Positions of the single triangle on frame `i`: x carries the frame index.
pub fn triangle_positions(i: u32) -> [f32; 9] {
    let x = i as f32;
    [x, 0.0, 0.0, x, 1.0, 0.0, x, 0.0, 1.0]
}

/// Normals of the single triangle on frame `i`, distinct from positions.
pub fn triangle_normals(i: u32) -> [f32; 9] {
    let z = 1.0 + i as f32;
    [0.0, 0.0, z, 0.0, 0.0, z, 0.0, 0.0, z]
}

/// `frames` frames of one full-precision triangle mesh "tri".
///
/// Positions are stored on every frame except where `omit_positions(i)` is
/// true; indices and normals are stored on every frame. Tangents, velocities,
/// texcoords and colors use the `None` encoding.
pub fn single_mesh_builder(frames: u32, omit_positions: impl Fn(u32) -> bool) -> ContainerBuilder {
    let mut b = ContainerBuilder::new();
    b.meshes.push(FixtureMesh {
        // position Full, normal Full, tangent None, velocity None, texcoord None, color None
        formats: [0, 0, 3, 3, 2, 4],
        ..FixtureMesh::named("tri")
    });
    for i in 0..frames {
        let mut frame = FixtureFrame::new();
        let mut mesh = FixtureFrameMesh::new(3, 1);
        mesh.sections.push([0, 0, 1, 0, 2]);
        mesh.indices = frame.push_u16(&[0, 1, 2]);
        mesh.positions = if omit_positions(i) {
            FixtureStream::OMITTED
        } else {
            frame.push_f32(&triangle_positions(i))
        };
        mesh.normals = frame.push_f32(&triangle_normals(i));
        mesh.bounds_center = [i as f32, 0.5, 0.5];
        mesh.bounds_size = [0.0, 1.0, 1.0];
        frame.meshes.push(mesh);
        b.frames.push(frame);
    }
    b
}

/// Encoded bytes of [`single_mesh_builder`].
pub fn single_mesh_sequence(frames: u32, omit_positions: impl Fn(u32) -> bool) -> Vec<u8> {
    single_mesh_builder(frames, omit_positions).build()
}
