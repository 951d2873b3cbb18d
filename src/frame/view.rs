//! Shared frame buffers and typed views into them.
//!
//! A frame's data block is read once into a [`FrameBuffer`]. Every stream is a
//! [`StreamView`]: buffer handle + byte range + element layout. Reusing a
//! stream from an earlier frame clones the view, which keeps that frame's
//! buffer alive for as long as the view exists.

use std::fmt;
use std::sync::Arc;

use bytemuck::Pod;

use crate::container::ElementFormat;
use crate::util::{Error, Result};

/// Reference-counted data block of one frame.
#[derive(Clone)]
pub struct FrameBuffer {
    frame_index: u32,
    bytes: Arc<Vec<u8>>,
}

impl FrameBuffer {
    pub fn new(frame_index: u32, bytes: Vec<u8>) -> Self {
        Self {
            frame_index,
            bytes: Arc::new(bytes),
        }
    }

    /// Frame this block was read for.
    #[inline]
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of live handles (the frame itself plus every view into it).
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }

    /// Same underlying allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &FrameBuffer) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// View `len` bytes at `offset`, interpreted as `format`.
    pub fn view(&self, offset: usize, len: usize, format: ElementFormat) -> Result<StreamView> {
        offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                Error::invalid(format!(
                    "stream {offset}+{len} outside frame {} block of {} bytes",
                    self.frame_index,
                    self.bytes.len()
                ))
            })?;
        Ok(StreamView {
            buffer: self.clone(),
            offset,
            len,
            format,
        })
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("frame_index", &self.frame_index)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Typed slice of a frame buffer.
#[derive(Clone)]
pub struct StreamView {
    buffer: FrameBuffer,
    offset: usize,
    len: usize,
    format: ElementFormat,
}

impl StreamView {
    /// Raw bytes of the stream.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buffer.as_bytes()[self.offset..self.offset + self.len]
    }

    #[inline]
    pub fn format(&self) -> ElementFormat {
        self.format
    }

    /// Byte offset inside the owning buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len
    }

    /// Number of whole elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.len / self.format.stride()
    }

    /// Frame whose buffer holds the data.
    #[inline]
    pub fn source_frame(&self) -> u32 {
        self.buffer.frame_index()
    }

    #[inline]
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Points into `buffer`.
    #[inline]
    pub fn is_shared_with(&self, buffer: &FrameBuffer) -> bool {
        self.buffer.ptr_eq(buffer)
    }

    /// Zero-copy cast; `None` if the slice is misaligned or has a ragged tail.
    pub fn try_cast<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.bytes()).ok()
    }

    /// Copy out as `T` regardless of alignment. A ragged tail is dropped.
    pub fn to_vec<T: Pod>(&self) -> Vec<T> {
        let size = std::mem::size_of::<T>();
        if size == 0 {
            return Vec::new();
        }
        let whole = self.len / size * size;
        bytemuck::pod_collect_to_vec(&self.bytes()[..whole])
    }
}

impl fmt::Debug for StreamView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamView")
            .field("frame", &self.buffer.frame_index())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("format", &self.format)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_bounds() {
        let buf = FrameBuffer::new(3, vec![0u8; 16]);
        assert!(buf.view(0, 16, ElementFormat::Raw).is_ok());
        assert!(buf.view(4, 12, ElementFormat::Raw).is_ok());
        assert!(matches!(
            buf.view(8, 12, ElementFormat::Raw),
            Err(Error::InvalidStructure(_))
        ));
        assert!(buf.view(usize::MAX, 2, ElementFormat::Raw).is_err());
    }

    #[test]
    fn test_view_keeps_buffer_alive() {
        let view = {
            let buf = FrameBuffer::new(7, (0u8..12).collect());
            let v = buf.view(4, 8, ElementFormat::Vec2F32).unwrap();
            assert_eq!(buf.handle_count(), 2);
            v
        };
        assert_eq!(view.buffer().handle_count(), 1);
        assert_eq!(view.source_frame(), 7);
        assert_eq!(view.bytes(), &[4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(view.count(), 1);
    }

    #[test]
    fn test_to_vec_unaligned() {
        let mut bytes = vec![0u8; 1];
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-2.0f32).to_le_bytes());
        let buf = FrameBuffer::new(0, bytes);
        let view = buf.view(1, 8, ElementFormat::Vec2F32).unwrap();
        let values: Vec<f32> = view.to_vec();
        assert_eq!(values, vec![1.5, -2.0]);
        assert!(view.is_shared_with(&buf));
        assert!(!view.is_shared_with(&FrameBuffer::new(0, vec![])));
    }
}
