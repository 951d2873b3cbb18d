//! Byte sources the engine reads containers from.
//!
//! The engine only needs seek + read. Anything that is `Read + Seek + Send`
//! is a [`ByteSource`]; [`open_source`] picks a memory-mapped or plain file
//! backend the same way for every caller.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use memmap2::Mmap;

use crate::util::{Error, Result};

/// Seekable byte source.
pub trait ByteSource: Read + Seek + Send {
    /// Seek to `pos` and read until `buf` is full or the source ends.
    ///
    /// Returns the number of bytes actually read.
    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<usize> {
        self.seek(SeekFrom::Start(pos))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(filled)
    }

    /// Seek to `pos` and fill `buf` completely.
    fn read_exact_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        let n = self.read_at(pos, buf)?;
        if n < buf.len() {
            return Err(Error::UnexpectedEof(pos + n as u64));
        }
        Ok(())
    }

    /// Total length of the source in bytes.
    fn source_len(&mut self) -> Result<u64> {
        Ok(self.seek(SeekFrom::End(0))?)
    }
}

impl<T: Read + Seek + Send> ByteSource for T {}

/// Open a container file for reading.
///
/// With `use_mmap` the file is memory-mapped (preferred for large files);
/// otherwise reads go straight to the file handle.
pub fn open_source(path: impl AsRef<Path>, use_mmap: bool) -> Result<Box<dyn ByteSource>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            Error::FileNotFound(path.to_path_buf())
        } else {
            Error::Io(e)
        }
    })?;

    let size = file.metadata()?.len();

    if use_mmap && size > 0 {
        // Safety: file is opened read-only; the container is not expected to
        // change underneath a running player.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
        Ok(Box::new(Cursor::new(mmap)))
    } else {
        Ok(Box::new(file))
    }
}
