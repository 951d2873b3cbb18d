//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bakestream::container::read_toc;

#[path = "../../src/testkit.rs"]
mod testkit;
pub use testkit::*;

/// Offset of the first frame block in an encoded container.
pub fn frame_data_offset(bytes: &[u8]) -> u64 {
    read_toc(Cursor::new(bytes)).expect("fixture parses").frame_data_offset
}

/// In-memory source whose frame-data reads fail while `failures` is non-zero.
pub struct FlakySource {
    inner: Cursor<Vec<u8>>,
    data_start: u64,
    failures: Arc<AtomicUsize>,
}

impl FlakySource {
    pub fn new(bytes: Vec<u8>, failures: Arc<AtomicUsize>) -> Self {
        let data_start = frame_data_offset(&bytes);
        Self {
            inner: Cursor::new(bytes),
            data_start,
            failures,
        }
    }
}

impl Read for FlakySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.inner.position();
        let len = self.inner.get_ref().len() as u64;
        if pos >= self.data_start && pos < len {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(io::Error::other("flaky read"));
            }
        }
        self.inner.read(buf)
    }
}

impl Seek for FlakySource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// In-memory source whose frame-data reads stall until the gate opens.
pub struct GatedSource {
    inner: Cursor<Vec<u8>>,
    data_start: u64,
    open: Arc<AtomicBool>,
}

impl GatedSource {
    pub fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let open = Arc::new(AtomicBool::new(false));
        let data_start = frame_data_offset(&bytes);
        let source = Self {
            inner: Cursor::new(bytes),
            data_start,
            open: Arc::clone(&open),
        };
        (source, open)
    }
}

impl Read for GatedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.inner.position();
        let len = self.inner.get_ref().len() as u64;
        if pos >= self.data_start && pos < len {
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
        }
        self.inner.read(buf)
    }
}

impl Seek for GatedSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// In-memory source that panics on a frame-data read once `armed` is set.
///
/// Reads stall until then, so callers can block on a pending frame first.
pub struct PanickingSource {
    inner: Cursor<Vec<u8>>,
    data_start: u64,
    armed: Arc<AtomicBool>,
}

impl PanickingSource {
    pub fn new(bytes: Vec<u8>) -> (Self, Arc<AtomicBool>) {
        let armed = Arc::new(AtomicBool::new(false));
        let data_start = frame_data_offset(&bytes);
        let source = Self {
            inner: Cursor::new(bytes),
            data_start,
            armed: Arc::clone(&armed),
        };
        (source, armed)
    }
}

impl Read for PanickingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.inner.position();
        let len = self.inner.get_ref().len() as u64;
        if pos >= self.data_start && pos < len {
            while !self.armed.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(2));
            }
            panic!("frame data read at {pos} blew up");
        }
        self.inner.read(buf)
    }
}

impl Seek for PanickingSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Poll `cond` every few milliseconds for up to `timeout`.
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
