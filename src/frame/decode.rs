//! Stream decoders: one reader per element layout, dispatched once per stream.
//!
//! Reduced-precision layouts are normalized integers. Positions and
//! velocities are then mapped back with the frame's quantization
//! (`center + v * extents`), colors scaled by their per-channel extents.

use byteorder::{ByteOrder, LittleEndian as LE};

use super::view::StreamView;
use crate::container::{ElementFormat, Encoding, Quantization};
use crate::util::{Vec2, Vec3, Vec4};

#[inline]
fn snorm16(c: &[u8]) -> f32 {
    (LE::read_i16(c) as f32 / i16::MAX as f32).max(-1.0)
}

#[inline]
fn snorm8(b: u8) -> f32 {
    (b as i8 as f32 / i8::MAX as f32).max(-1.0)
}

#[inline]
fn unorm16(c: &[u8]) -> f32 {
    LE::read_u16(c) as f32 / u16::MAX as f32
}

#[inline]
fn unorm8(b: u8) -> f32 {
    b as f32 / u8::MAX as f32
}

fn read<T>(view: &StreamView, f: impl Fn(&[u8]) -> T) -> Vec<T> {
    view.bytes()
        .chunks_exact(view.format().stride())
        .map(f)
        .collect()
}

/// Two-component stream. Unsupported layouts decode to nothing.
pub fn decode_vec2(view: &StreamView) -> Vec<Vec2> {
    match view.format() {
        ElementFormat::Vec2F32 => read(view, |c| Vec2::new(LE::read_f32(c), LE::read_f32(&c[4..]))),
        ElementFormat::Vec2Unorm16 => read(view, |c| Vec2::new(unorm16(c), unorm16(&c[2..]))),
        _ => Vec::new(),
    }
}

/// Three-component stream. Unsupported layouts decode to nothing.
pub fn decode_vec3(view: &StreamView) -> Vec<Vec3> {
    match view.format() {
        ElementFormat::Vec3F32 => read(view, |c| {
            Vec3::new(LE::read_f32(c), LE::read_f32(&c[4..]), LE::read_f32(&c[8..]))
        }),
        ElementFormat::Vec3Snorm16 => {
            read(view, |c| Vec3::new(snorm16(c), snorm16(&c[2..]), snorm16(&c[4..])))
        }
        ElementFormat::Vec3Snorm8 => read(view, |c| Vec3::new(snorm8(c[0]), snorm8(c[1]), snorm8(c[2]))),
        _ => Vec::new(),
    }
}

/// Four-component stream. Unsupported layouts decode to nothing.
pub fn decode_vec4(view: &StreamView) -> Vec<Vec4> {
    match view.format() {
        ElementFormat::Vec4F32 => read(view, |c| {
            Vec4::new(
                LE::read_f32(c),
                LE::read_f32(&c[4..]),
                LE::read_f32(&c[8..]),
                LE::read_f32(&c[12..]),
            )
        }),
        ElementFormat::Vec4Snorm16 => read(view, |c| {
            Vec4::new(snorm16(c), snorm16(&c[2..]), snorm16(&c[4..]), snorm16(&c[6..]))
        }),
        ElementFormat::Vec4Snorm8 => {
            read(view, |c| Vec4::new(snorm8(c[0]), snorm8(c[1]), snorm8(c[2]), snorm8(c[3])))
        }
        ElementFormat::Vec4Unorm16 => read(view, |c| {
            Vec4::new(unorm16(c), unorm16(&c[2..]), unorm16(&c[4..]), unorm16(&c[6..]))
        }),
        ElementFormat::Vec4Unorm8 => {
            read(view, |c| Vec4::new(unorm8(c[0]), unorm8(c[1]), unorm8(c[2]), unorm8(c[3])))
        }
        _ => Vec::new(),
    }
}

fn dequantize(view: &StreamView, q: &Quantization) -> Vec<Vec3> {
    let values = decode_vec3(view);
    if view.format() == ElementFormat::Vec3F32 {
        return values;
    }
    values.into_iter().map(|v| q.center + v * q.extents).collect()
}

/// World-space positions.
pub fn decode_positions(view: &StreamView, quantization: &Quantization) -> Vec<Vec3> {
    dequantize(view, quantization)
}

pub fn decode_normals(view: &StreamView) -> Vec<Vec3> {
    decode_vec3(view)
}

pub fn decode_tangents(view: &StreamView) -> Vec<Vec4> {
    decode_vec4(view)
}

pub fn decode_velocities(view: &StreamView, quantization: &Quantization) -> Vec<Vec3> {
    dequantize(view, quantization)
}

pub fn decode_texcoords(view: &StreamView) -> Vec<Vec2> {
    decode_vec2(view)
}

/// Colors; `Half` and `ByteHdr` are scaled by `extents`.
pub fn decode_colors(view: &StreamView, encoding: Encoding, extents: Vec4) -> Vec<Vec4> {
    let values = decode_vec4(view);
    match encoding {
        Encoding::Half | Encoding::ByteHdr => values.into_iter().map(|v| v * extents).collect(),
        _ => values,
    }
}

/// Indices widened to `u32`.
pub fn indices_u32(view: &StreamView) -> Vec<u32> {
    match view.format() {
        ElementFormat::IndexU16 => read(view, |c| LE::read_u16(c) as u32),
        ElementFormat::IndexU32 => read(view, LE::read_u32),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuffer;

    fn view(bytes: Vec<u8>, format: ElementFormat) -> StreamView {
        let len = bytes.len();
        FrameBuffer::new(0, bytes).view(0, len, format).unwrap()
    }

    fn le_bytes<const N: usize>(values: &[[u8; N]]) -> Vec<u8> {
        values.iter().flatten().copied().collect()
    }

    #[test]
    fn test_positions_full() {
        let bytes = le_bytes(&[1.0f32.to_le_bytes(), 2.0f32.to_le_bytes(), 3.0f32.to_le_bytes()]);
        let v = view(bytes, ElementFormat::Vec3F32);
        let q = Quantization {
            center: Vec3::splat(100.0),
            extents: Vec3::splat(2.0),
        };
        // full precision ignores quantization
        assert_eq!(decode_positions(&v, &q), vec![Vec3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_positions_half_dequantized() {
        let bytes = le_bytes(&[
            i16::MAX.to_le_bytes(),
            0i16.to_le_bytes(),
            (-i16::MAX).to_le_bytes(),
        ]);
        let v = view(bytes, ElementFormat::Vec3Snorm16);
        let q = Quantization {
            center: Vec3::new(10.0, 20.0, 30.0),
            extents: Vec3::new(2.0, 4.0, 8.0),
        };
        assert_eq!(decode_positions(&v, &q), vec![Vec3::new(12.0, 20.0, 22.0)]);
        assert_eq!(decode_velocities(&v, &q), decode_positions(&v, &q));
    }

    #[test]
    fn test_snorm_clamps_minimum() {
        let v = view(vec![0x80, 0x7f, 0x00], ElementFormat::Vec3Snorm8);
        assert_eq!(decode_normals(&v), vec![Vec3::new(-1.0, 1.0, 0.0)]);

        let bytes = le_bytes(&[i16::MIN.to_le_bytes(), 0i16.to_le_bytes(), 0i16.to_le_bytes()]);
        let v = view(bytes, ElementFormat::Vec3Snorm16);
        assert_eq!(decode_normals(&v)[0].x, -1.0);
    }

    #[test]
    fn test_texcoords_half() {
        let bytes = le_bytes(&[u16::MAX.to_le_bytes(), 0u16.to_le_bytes()]);
        let v = view(bytes, ElementFormat::Vec2Unorm16);
        assert_eq!(decode_texcoords(&v), vec![Vec2::new(1.0, 0.0)]);
    }

    #[test]
    fn test_colors() {
        let v = view(vec![255, 0, 255, 255], ElementFormat::Vec4Unorm8);
        let extents = Vec4::new(4.0, 4.0, 2.0, 1.0);
        assert_eq!(
            decode_colors(&v, Encoding::Byte, extents),
            vec![Vec4::new(1.0, 0.0, 1.0, 1.0)]
        );
        assert_eq!(
            decode_colors(&v, Encoding::ByteHdr, extents),
            vec![Vec4::new(4.0, 0.0, 2.0, 1.0)]
        );
    }

    #[test]
    fn test_tangents_byte() {
        let v = view(vec![0x7f, 0, 0, 0x81], ElementFormat::Vec4Snorm8);
        assert_eq!(decode_tangents(&v), vec![Vec4::new(1.0, 0.0, 0.0, -1.0)]);
    }

    #[test]
    fn test_indices() {
        let v = view(le_bytes(&[1u16.to_le_bytes(), 2u16.to_le_bytes()]), ElementFormat::IndexU16);
        assert_eq!(indices_u32(&v), vec![1, 2]);
        let v = view(le_bytes(&[70_000u32.to_le_bytes()]), ElementFormat::IndexU32);
        assert_eq!(indices_u32(&v), vec![70_000]);
        let v = view(vec![1, 2, 3, 4], ElementFormat::Raw);
        assert!(indices_u32(&v).is_empty());
    }
}
