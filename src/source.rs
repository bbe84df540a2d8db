//! Random-access byte sources and bounded lazy readers.
//!
//! A parsed file hands out one reader per segment and section, each bounded
//! to its own window of the underlying source. Readers never advance shared
//! state: every read carries its own position, so any number of readers can
//! operate on the same source concurrently.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::Result;

/// A source of bytes addressable by absolute position.
///
/// The minimum contract for parsing: a read of `buf.len()` bytes at
/// `offset`, returning how many bytes were actually read (0 at end of
/// source). Implementations must not maintain a shared cursor; `&self`
/// reads from distinct offsets may run concurrently.
pub trait ReadAt: Send + Sync {
    /// Reads bytes at the given absolute offset.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes at the given absolute offset.
    fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn slice_read_at(data: &[u8], buf: &mut [u8], offset: u64) -> io::Result<usize> {
    if offset >= data.len() as u64 {
        return Ok(0);
    }
    let avail = &data[offset as usize..];
    let n = buf.len().min(avail.len());
    buf[..n].copy_from_slice(&avail[..n]);
    Ok(n)
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        slice_read_at(self, buf, offset)
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        slice_read_at(self, buf, offset)
    }
}

#[cfg(unix)]
impl ReadAt for fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl ReadAt for fs::File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_read(self, buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        (**self).read_at(buf, offset)
    }
}

/// A reader bounded to the window `[offset, offset + size)` of a shared
/// source.
///
/// Segments and sections each hold one of these. `data` reads the whole
/// window; `open` yields an independent cursor so multiple consumers never
/// fight over a seek position.
#[derive(Clone)]
pub struct SectionReader {
    source: Arc<dyn ReadAt>,
    offset: u64,
    size: u64,
}

impl SectionReader {
    /// Creates a reader over `[offset, offset + size)` of `source`.
    pub fn new(source: Arc<dyn ReadAt>, offset: u64, size: u64) -> Self {
        Self {
            source,
            offset,
            size,
        }
    }

    /// Size of the window in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Absolute offset of the window within the source.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads bytes at `offset` relative to the window start, clamped to the
    /// window end.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        if offset >= self.size {
            return Ok(0);
        }
        let avail = (self.size - offset) as usize;
        let n = buf.len().min(avail);
        self.source.read_at(&mut buf[..n], self.offset + offset)
    }

    /// Reads and returns the entire window.
    pub fn data(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.size as usize];
        self.source.read_exact_at(&mut buf, self.offset)?;
        Ok(buf)
    }

    /// Returns a new cursor reading the window from its start.
    pub fn open(&self) -> SourceCursor {
        SourceCursor {
            source: Arc::clone(&self.source),
            offset: self.offset,
            size: self.size,
            pos: 0,
        }
    }
}

impl std::fmt::Debug for SectionReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SectionReader")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

/// An independent `Read + Seek` cursor over a window of a shared source.
pub struct SourceCursor {
    source: Arc<dyn ReadAt>,
    offset: u64,
    size: u64,
    pos: u64,
}

impl Read for SourceCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size {
            return Ok(0);
        }
        let avail = (self.size - self.pos) as usize;
        let n = buf.len().min(avail);
        let read = self.source.read_at(&mut buf[..n], self.offset + self.pos)?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for SourceCursor {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => self.size.checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        match new_pos {
            Some(p) => {
                self.pos = p;
                Ok(p)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl std::fmt::Debug for SourceCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceCursor")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .field("pos", &self.pos)
            .finish()
    }
}
