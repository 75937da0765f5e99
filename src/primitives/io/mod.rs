#![forbid(unsafe_code)]

use std::{
    fs::File,
    io::{self, ErrorKind},
    ops::Range,
    path::Path,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::types::{Result, StorageError};

/// Positioned I/O over a relation file.
pub trait FileIo: Send + Sync + 'static {
    /// Reads exactly `dst.len()` bytes starting at `off`.
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()>;
    /// Writes all of `src` starting at `off`.
    fn write_at(&self, off: u64, src: &[u8]) -> Result<()>;
    /// Flushes file data and metadata to durable storage.
    fn sync_all(&self) -> Result<()>;
    /// Current length of the file in bytes.
    fn len(&self) -> Result<u64>;
    /// Returns true if the file is empty.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
    /// Truncates or zero-extends the file to `len` bytes.
    fn set_len(&self, len: u64) -> Result<()>;
}

/// Repeats a positioned transfer until `len` bytes have moved.
///
/// `step` performs one `pread`/`pwrite`-style call at the given file offset
/// and buffer position and returns how many bytes it moved. A zero-length
/// transfer ends the loop with `stalled`.
fn transfer_all(
    mut off: u64,
    len: usize,
    stalled: ErrorKind,
    mut step: impl FnMut(u64, usize) -> io::Result<usize>,
) -> io::Result<()> {
    let mut done = 0;
    while done < len {
        match step(off, done) {
            Ok(0) => return Err(io::Error::new(stalled, "positioned transfer made no progress")),
            Ok(n) => {
                done += n;
                off += n as u64;
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, dst, off)
}

#[cfg(unix)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, src, off)
}

#[cfg(windows)]
fn pread(file: &File, dst: &mut [u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, dst, off)
}

#[cfg(windows)]
fn pwrite(file: &File, src: &[u8], off: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, src, off)
}

#[cfg(not(any(unix, windows)))]
fn pread(_file: &File, _dst: &mut [u8], _off: u64) -> io::Result<usize> {
    Err(io::Error::new(ErrorKind::Unsupported, "positioned reads are unsupported"))
}

#[cfg(not(any(unix, windows)))]
fn pwrite(_file: &File, _src: &[u8], _off: u64) -> io::Result<usize> {
    Err(io::Error::new(ErrorKind::Unsupported, "positioned writes are unsupported"))
}

/// A relation file on disk. Clones share the handle.
#[derive(Clone)]
pub struct StdFileIo {
    file: Arc<File>,
}

impl StdFileIo {
    /// Opens `path` read-write, creating an empty file if it is missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file: Arc::new(file),
        })
    }
}

impl FileIo for StdFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let len = dst.len();
        transfer_all(off, len, ErrorKind::UnexpectedEof, |at, pos| {
            pread(&self.file, &mut dst[pos..], at)
        })?;
        Ok(())
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        transfer_all(off, src.len(), ErrorKind::WriteZero, |at, pos| {
            pwrite(&self.file, &src[pos..], at)
        })?;
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        tracing::trace!(target: "hashcheck::io", "io.sync_all");
        Ok(self.file.sync_all()?)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        tracing::trace!(target: "hashcheck::io", len, "io.set_len");
        Ok(self.file.set_len(len)?)
    }
}

/// In-memory file with optional read fault injection.
///
/// Reads overlapping the faulted byte range fail with an I/O error, which
/// lets tests exercise unreadable pages without touching the filesystem.
#[derive(Default)]
pub struct MemFileIo {
    data: Mutex<Vec<u8>>,
    read_fault: Mutex<Option<Range<u64>>>,
}

impl MemFileIo {
    /// Creates an empty in-memory file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every read touching `range` fail until cleared.
    pub fn fail_reads(&self, range: Range<u64>) {
        *self.read_fault.lock() = Some(range);
    }

    /// Removes any injected read fault.
    pub fn clear_faults(&self) {
        *self.read_fault.lock() = None;
    }

    /// Copy of the current file contents.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl FileIo for MemFileIo {
    fn read_at(&self, off: u64, dst: &mut [u8]) -> Result<()> {
        let end = off
            .checked_add(dst.len() as u64)
            .ok_or(StorageError::Invalid("read offset overflow"))?;
        if let Some(fault) = self.read_fault.lock().as_ref() {
            if off < fault.end && fault.start < end {
                return Err(StorageError::Io(io::Error::new(
                    ErrorKind::Other,
                    "injected read failure",
                )));
            }
        }
        let data = self.data.lock();
        if end > data.len() as u64 {
            return Err(StorageError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "read past end of memory file",
            )));
        }
        dst.copy_from_slice(&data[off as usize..end as usize]);
        Ok(())
    }

    fn write_at(&self, off: u64, src: &[u8]) -> Result<()> {
        let end = off
            .checked_add(src.len() as u64)
            .ok_or(StorageError::Invalid("write offset overflow"))? as usize;
        let mut data = self.data.lock();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[off as usize..end].copy_from_slice(src);
        Ok(())
    }

    fn sync_all(&self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        self.data.lock().resize(len as usize, 0);
        Ok(())
    }
}
