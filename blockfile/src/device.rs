//! The unit-addressed file device.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sync_file::{RandomAccessFile, ReadAt, WriteAt};
use tracing::trace;

use crate::IoCounters;

/// A file accessed only in fixed-size units at integer offsets.
///
/// The unit size is the length of the buffer passed to each call, so one
/// device can serve page-sized transfers for a primary area and
/// record-sized transfers for an overflow area; the caller just supplies
/// the right buffer. Offsets are `index * buf.len()` bytes.
///
/// Writes go through positioned I/O with no userspace buffering, so a
/// counted write has reached the operating system by the time the call
/// returns. Reads past the end of the file are not errors; they report
/// "no such unit" and leave the buffer contents unspecified, which is the
/// natural stop condition for callers that iterate units in order.
///
/// After a filename-level rename over this device's path, [`reopen`] must
/// be called before the next transfer; the device never knowingly operates
/// on a stale handle.
///
/// [`reopen`]: BlockFile::reopen
pub struct BlockFile {
    path: PathBuf,
    file: RandomAccessFile,
    counters: Arc<IoCounters>,
}

impl BlockFile {
    /// Opens (creating if absent) the file at `path` for read/write access,
    /// billing transfers against `counters`.
    pub fn open(path: impl Into<PathBuf>, counters: Arc<IoCounters>) -> io::Result<Self> {
        let path = path.into();
        let file = open_rw(&path, false)?;
        Ok(Self {
            path,
            file: RandomAccessFile::from(file),
            counters,
        })
    }

    /// The path this device operates on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The ledger this device bills against.
    pub fn counters(&self) -> &Arc<IoCounters> {
        &self.counters
    }

    /// Reads the unit at `index` into `buf`.
    ///
    /// Returns `Ok(false)` when the file ends before the full unit (no such
    /// unit); `buf` is unspecified in that case. Counts one read on success.
    pub fn read_unit(&self, index: u64, buf: &mut [u8]) -> io::Result<bool> {
        let offset = index * buf.len() as u64;
        match self.file.read_exact_at(buf, offset) {
            Ok(()) => {
                self.counters.record_read();
                trace!(index, unit = buf.len(), path = %self.path.display(), "read unit");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Writes `buf` as the unit at `index`, extending the file if `index`
    /// is at or past the current end. Counts one write.
    pub fn write_unit(&mut self, index: u64, buf: &[u8]) -> io::Result<()> {
        let offset = index * buf.len() as u64;
        self.file.write_all_at(buf, offset)?;
        self.counters.record_write();
        trace!(index, unit = buf.len(), path = %self.path.display(), "wrote unit");
        Ok(())
    }

    /// Appends `buf` as one unit at the end of the file and returns the
    /// index it landed at (file length before the write, in units).
    /// Counts one write.
    pub fn append_unit(&mut self, buf: &[u8]) -> io::Result<u64> {
        let index = self.size_in(buf.len() as u64)?;
        self.write_unit(index, buf)?;
        Ok(index)
    }

    /// File length divided by `unit`, rounded down.
    pub fn size_in(&self, unit: u64) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len() / unit)
    }

    /// Truncates the file to zero length and reopens it. The counters are
    /// not touched.
    pub fn clear(&mut self) -> io::Result<()> {
        self.file = RandomAccessFile::from(open_rw(&self.path, true)?);
        Ok(())
    }

    /// Re-acquires the handle from the path.
    ///
    /// Mandatory after the file at this path has been replaced by a rename;
    /// until then the device would still address the unlinked old file.
    pub fn reopen(&mut self) -> io::Result<()> {
        self.file = RandomAccessFile::from(open_rw(&self.path, false)?);
        Ok(())
    }
}

fn open_rw(path: &Path, truncate: bool) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)
}
