//! Inter-frame dependency resolution.
//!
//! A frame may omit any stream that did not change since an earlier frame.
//! For every frame we record the earliest frame that has to be materialized
//! (and kept alive) so all of its omitted streams can be borrowed.

use bitflags::bitflags;

use super::format::MAX_MIPMAPS;
use super::toc::{FrameDescriptor, FrameImageDescriptor, FrameMeshDescriptor};
use crate::util::{Error, Result};

bitflags! {
    /// Set of mesh attribute streams.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamMask: u16 {
        const INDICES = 1 << 0;
        const POSITIONS = 1 << 1;
        const NORMALS = 1 << 2;
        const TANGENTS = 1 << 3;
        const VELOCITIES = 1 << 4;
        const TEXCOORD0 = 1 << 5;
        const TEXCOORD1 = 1 << 6;
        const TEXCOORD2 = 1 << 7;
        const TEXCOORD3 = 1 << 8;
        const COLOR0 = 1 << 9;
        const COLOR1 = 1 << 10;
    }
}

impl StreamMask {
    /// Mask bit for texture coordinate channel `i` (0..4).
    pub fn texcoord(i: usize) -> Self {
        Self::from_bits_truncate(Self::TEXCOORD0.bits() << i.min(3))
    }

    /// Mask bit for color channel `i` (0..2).
    pub fn color(i: usize) -> Self {
        Self::from_bits_truncate(Self::COLOR0.bits() << i.min(1))
    }

    /// Streams this mesh omits on its frame.
    pub fn omitted(mesh: &FrameMeshDescriptor) -> Self {
        mesh.streams()
            .iter()
            .filter(|(_, r)| r.is_omitted())
            .fold(Self::empty(), |acc, (m, _)| acc | *m)
    }

    /// Streams this mesh stores on its frame.
    pub fn stored(mesh: &FrameMeshDescriptor) -> Self {
        Self::all() - Self::omitted(mesh)
    }
}

/// Bit per mip level omitted on this frame.
pub fn omitted_mips(image: &FrameImageDescriptor) -> u16 {
    image
        .used_mips()
        .iter()
        .enumerate()
        .filter(|(_, mip)| mip.range.is_omitted())
        .fold(0, |acc, (i, _)| acc | (1 << i))
}

fn stored_mips(image: &FrameImageDescriptor) -> u16 {
    let used = (1u16 << image.mip_count.min(MAX_MIPMAPS as u32)) - 1;
    used & !omitted_mips(image)
}

/// Fill in `dependency` and `has_omitted_streams` for every frame.
///
/// Frame 0 has nothing to inherit from; omitting a stream there is rejected.
pub fn resolve_dependencies(frames: &mut [FrameDescriptor]) -> Result<()> {
    if let Some(first) = frames.first() {
        for (m, mesh) in first.meshes.iter().enumerate() {
            let omitted = StreamMask::omitted(mesh);
            if !omitted.is_empty() {
                return Err(Error::invalid(format!(
                    "frame 0: mesh {m} omits {omitted:?}"
                )));
            }
        }
        for (i, image) in first.images.iter().enumerate() {
            if omitted_mips(image) != 0 {
                return Err(Error::invalid(format!("frame 0: image {i} omits mip data")));
            }
        }
    }

    for f in 0..frames.len() {
        let mut frame_dep = f as u32;
        let mut any_omitted = false;

        for m in 0..frames[f].meshes.len() {
            let needed = StreamMask::omitted(&frames[f].meshes[m]).bits();
            let dep = if needed == 0 {
                f as u32
            } else {
                any_omitted = true;
                scan_back(frames, f, needed, |frame| StreamMask::stored(&frame.meshes[m]).bits())
            };
            frames[f].meshes[m].has_omitted_streams = needed != 0;
            frames[f].meshes[m].dependency = dep;
            frame_dep = frame_dep.min(dep);
        }

        for i in 0..frames[f].images.len() {
            let needed = omitted_mips(&frames[f].images[i]);
            let dep = if needed == 0 {
                f as u32
            } else {
                any_omitted = true;
                scan_back(frames, f, needed, |frame| stored_mips(&frame.images[i]))
            };
            frames[f].images[i].dependency = dep;
            frame_dep = frame_dep.min(dep);
        }

        frames[f].has_omitted_streams = any_omitted;
        frames[f].dependency = frame_dep;
    }

    Ok(())
}

/// Walk back from `f - 1` until every bit in `needed` was stored by some
/// frame, returning the earliest frame visited. Stops at frame 0.
fn scan_back(
    frames: &[FrameDescriptor],
    f: usize,
    needed: u16,
    stored: impl Fn(&FrameDescriptor) -> u16,
) -> u32 {
    let mut found = 0u16;
    let mut back = f;
    while back > 0 {
        back -= 1;
        found |= stored(&frames[back]) & needed;
        if found == needed {
            break;
        }
    }
    back as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::toc::{FrameImageDescriptor, MipDescriptor, StreamRange};

    fn mesh(omit: StreamMask) -> FrameMeshDescriptor {
        let stored = StreamRange::new(0, 0);
        let pick = |bit: StreamMask| if omit.contains(bit) { StreamRange::OMITTED } else { stored };
        FrameMeshDescriptor {
            indices: pick(StreamMask::INDICES),
            positions: pick(StreamMask::POSITIONS),
            normals: pick(StreamMask::NORMALS),
            tangents: pick(StreamMask::TANGENTS),
            velocities: pick(StreamMask::VELOCITIES),
            texcoords: std::array::from_fn(|i| pick(StreamMask::texcoord(i))),
            colors: std::array::from_fn(|i| pick(StreamMask::color(i))),
            ..Default::default()
        }
    }

    fn frames(meshes: &[StreamMask]) -> Vec<FrameDescriptor> {
        meshes
            .iter()
            .map(|omit| FrameDescriptor {
                meshes: vec![mesh(*omit)],
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_mask_roundtrip() {
        let m = mesh(StreamMask::POSITIONS | StreamMask::COLOR1);
        assert_eq!(StreamMask::omitted(&m), StreamMask::POSITIONS | StreamMask::COLOR1);
        assert!(!StreamMask::stored(&m).contains(StreamMask::POSITIONS));
        assert!(StreamMask::stored(&m).contains(StreamMask::TEXCOORD3));
        assert_eq!(StreamMask::texcoord(2), StreamMask::TEXCOORD2);
        assert_eq!(StreamMask::color(1), StreamMask::COLOR1);
    }

    #[test]
    fn test_single_omission() {
        let none = StreamMask::empty();
        let mut f = frames(&[none, StreamMask::POSITIONS, none]);
        resolve_dependencies(&mut f).unwrap();
        assert_eq!(f[0].dependency, 0);
        assert_eq!(f[1].dependency, 0);
        assert!(f[1].has_omitted_streams);
        assert!(f[1].meshes[0].has_omitted_streams);
        assert_eq!(f[2].dependency, 2);
        assert!(!f[2].has_omitted_streams);
    }

    #[test]
    fn test_channels_scanned_independently() {
        // positions last stored on 1, normals last stored on 0
        let mut f = frames(&[
            StreamMask::empty(),
            StreamMask::NORMALS,
            StreamMask::NORMALS | StreamMask::POSITIONS,
            StreamMask::NORMALS | StreamMask::POSITIONS,
        ]);
        resolve_dependencies(&mut f).unwrap();
        assert_eq!(f[1].dependency, 0);
        assert_eq!(f[2].dependency, 0);
        assert_eq!(f[3].dependency, 0);

        let mut f = frames(&[
            StreamMask::empty(),
            StreamMask::empty(),
            StreamMask::POSITIONS,
            StreamMask::POSITIONS,
        ]);
        resolve_dependencies(&mut f).unwrap();
        assert_eq!(f[3].dependency, 1);
    }

    #[test]
    fn test_frame_dependency_is_minimum_over_meshes() {
        let mut f: Vec<FrameDescriptor> = (0..4)
            .map(|i| FrameDescriptor {
                meshes: vec![
                    mesh(if i == 3 { StreamMask::INDICES } else { StreamMask::empty() }),
                    mesh(if i >= 2 { StreamMask::COLOR0 } else { StreamMask::empty() }),
                ],
                ..Default::default()
            })
            .collect();
        resolve_dependencies(&mut f).unwrap();
        assert_eq!(f[3].meshes[0].dependency, 2);
        assert_eq!(f[3].meshes[1].dependency, 1);
        assert_eq!(f[3].dependency, 1);
    }

    #[test]
    fn test_image_mips_resolved() {
        let image = |omit_level: Option<usize>| {
            let mut img = FrameImageDescriptor {
                mip_count: 2,
                ..Default::default()
            };
            for (level, mip) in img.mips.iter_mut().enumerate().take(2) {
                *mip = MipDescriptor {
                    range: if Some(level) == omit_level {
                        StreamRange::OMITTED
                    } else {
                        StreamRange::new(0, 4)
                    },
                    ..Default::default()
                };
            }
            img
        };
        let mut f: Vec<FrameDescriptor> = [None, Some(1), Some(1)]
            .into_iter()
            .map(|omit| FrameDescriptor {
                images: vec![image(omit)],
                ..Default::default()
            })
            .collect();
        resolve_dependencies(&mut f).unwrap();
        assert_eq!(f[2].images[0].dependency, 0);
        assert_eq!(f[2].dependency, 0);
        assert!(f[2].has_omitted_streams);
    }

    #[test]
    fn test_dependency_never_after_frame() {
        let pattern = [
            StreamMask::empty(),
            StreamMask::VELOCITIES,
            StreamMask::empty(),
            StreamMask::TEXCOORD1 | StreamMask::INDICES,
            StreamMask::TEXCOORD1,
        ];
        let mut f = frames(&pattern);
        resolve_dependencies(&mut f).unwrap();
        for (i, frame) in f.iter().enumerate() {
            assert!(frame.dependency as usize <= i);
        }
        assert_eq!(f[4].dependency, 2);
    }

    #[test]
    fn test_frame_zero_omission_rejected() {
        let mut f = frames(&[StreamMask::TANGENTS]);
        assert!(matches!(
            resolve_dependencies(&mut f),
            Err(Error::InvalidStructure(_))
        ));
    }
}
