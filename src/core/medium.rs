// Storage primitive behind the queue: single-byte reads/writes at absolute
// offsets, optional one-time init, optional flush. The engine treats every
// call as synchronous; a stalled medium stalls the caller.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use libc::{EACCES, EPERM, EWOULDBLOCK};
use memmap2::MmapMut;

use crate::core::error::{Error, ErrorKind};

pub trait Medium {
    fn read_byte(&self, offset: usize) -> u8;
    fn write_byte(&mut self, offset: usize, value: u8);

    /// Total addressable bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-time medium initialization; idempotent. Default no-op.
    fn begin(&mut self, total_size: usize) -> Result<(), Error> {
        let _ = total_size;
        Ok(())
    }

    /// Flush pending writes to the physical medium. Default no-op.
    fn commit(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Plain in-memory medium. Fresh instances read back all zeroes, which the
/// recovery scanner rejects until the region is formatted.
#[derive(Clone, Debug)]
pub struct RamMedium {
    bytes: Vec<u8>,
}

impl RamMedium {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl Medium for RamMedium {
    fn read_byte(&self, offset: usize) -> u8 {
        self.bytes[offset]
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        self.bytes[offset] = value;
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// File-backed medium: the whole region lives in one memory-mapped file held
/// under an exclusive lock, so a second process cannot own the same queue.
/// `commit` flushes the map to disk.
#[derive(Debug)]
pub struct MmapMedium {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
}

impl MmapMedium {
    pub fn create(path: impl AsRef<Path>, size: usize) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        file.set_len(size as u64)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        Self::map(path, file)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?;

        Self::map(path, file)
    }

    fn map(path: PathBuf, file: File) -> Result<Self, Error> {
        file.try_lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(lock_error_message(&err))
                .with_path(&path)
                .with_source(err)
        })?;

        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .map_err(|err| Error::new(ErrorKind::Io).with_path(&path).with_source(err))?
        };

        Ok(Self { path, file, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MmapMedium {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl Medium for MmapMedium {
    fn read_byte(&self, offset: usize) -> u8 {
        self.mmap[offset]
    }

    fn write_byte(&mut self, offset: usize, value: u8) {
        self.mmap[offset] = value;
    }

    fn len(&self) -> usize {
        self.mmap.len()
    }

    fn begin(&mut self, total_size: usize) -> Result<(), Error> {
        if total_size > self.mmap.len() {
            return Err(Error::new(ErrorKind::Io)
                .with_message(format!(
                    "backing file holds {} bytes, region needs {total_size}",
                    self.mmap.len()
                ))
                .with_path(&self.path));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.mmap
            .flush()
            .map_err(|err| Error::new(ErrorKind::Io).with_path(&self.path).with_source(err))
    }
}

fn lock_error_message(err: &io::Error) -> &'static str {
    let errno = err.raw_os_error().unwrap_or_default();
    if errno == EACCES || errno == EPERM {
        return "no permission to lock the backing file";
    }
    if errno == EWOULDBLOCK || err.kind() == io::ErrorKind::WouldBlock {
        return "backing file is locked by another owner";
    }
    "could not lock the backing file"
}

#[cfg(test)]
mod tests {
    use super::{Medium, MmapMedium, RamMedium};
    use crate::core::error::ErrorKind;

    #[test]
    fn ram_medium_round_trips_bytes() {
        let mut medium = RamMedium::new(16);
        medium.write_byte(0, 0xa5);
        medium.write_byte(15, 0x5a);
        assert_eq!(medium.read_byte(0), 0xa5);
        assert_eq!(medium.read_byte(15), 0x5a);
        assert_eq!(medium.len(), 16);
    }

    #[test]
    fn mmap_medium_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.ferroq");

        let mut medium = MmapMedium::create(&path, 64).expect("create");
        medium.write_byte(3, 42);
        medium.commit().expect("commit");
        drop(medium);

        let medium = MmapMedium::open(&path).expect("open");
        assert_eq!(medium.read_byte(3), 42);
        assert_eq!(medium.len(), 64);
    }

    #[test]
    fn second_owner_is_locked_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.ferroq");

        let _held = MmapMedium::create(&path, 64).expect("create");
        let err = MmapMedium::open(&path).expect_err("lock should conflict");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn begin_rejects_an_undersized_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("queue.ferroq");

        let mut medium = MmapMedium::create(&path, 32).expect("create");
        medium.begin(32).expect("begin fits");
        let err = medium.begin(64).expect_err("should not fit");
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
