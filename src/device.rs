//! Block device abstraction over a host backing file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::RwLock;

use crate::SECTOR_SIZE;

/// A device addressable in whole sectors, keyed by byte offset.
///
/// A minimal `BlockDevice` trait: associated error type, `read`/`write`
/// taking an explicit offset and block count.
pub trait BlockDevice: Send + Sync {
    type Error;

    fn read(&self, buf: &mut [u8], offset: usize, block_cnt: usize) -> Result<(), Self::Error>;
    fn write(&self, buf: &[u8], offset: usize, block_cnt: usize) -> Result<(), Self::Error>;
    fn block_count(&self) -> usize;
}

/// A `BlockDevice` backed by a single host file.
pub struct BlockFile(pub RwLock<File>);

impl BlockFile {
    /// Opens `path` for read/write, creating and zero-filling it to
    /// `size_bytes` if it does not already exist.
    pub fn open(path: impl AsRef<Path>, size_bytes: u64) -> std::io::Result<Self> {
        let path = path.as_ref();
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if !existed {
            file.set_len(size_bytes)?;
        }
        Ok(Self(RwLock::new(file)))
    }

    pub fn len(&self) -> std::io::Result<u64> {
        self.0.read().unwrap().metadata().map(|m| m.len())
    }
}

impl BlockDevice for BlockFile {
    type Error = std::io::Error;

    fn read(&self, buf: &mut [u8], offset: usize, block_cnt: usize) -> std::io::Result<()> {
        assert_eq!(offset % SECTOR_SIZE, 0, "offset must be sector-aligned");
        assert_eq!(buf.len(), block_cnt * SECTOR_SIZE);
        let mut file = self.0.write().unwrap();
        file.seek(SeekFrom::Start(offset as u64))?;
        file.read_exact(buf)
    }

    fn write(&self, buf: &[u8], offset: usize, block_cnt: usize) -> std::io::Result<()> {
        assert_eq!(offset % SECTOR_SIZE, 0, "offset must be sector-aligned");
        assert_eq!(buf.len(), block_cnt * SECTOR_SIZE);
        let mut file = self.0.write().unwrap();
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(buf)
    }

    fn block_count(&self) -> usize {
        (self.len().unwrap_or(0) as usize) / SECTOR_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn creates_and_zero_fills() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let dev = BlockFile::open(tmp.path(), 4096).unwrap();
        let mut buf = vec![0xAAu8; SECTOR_SIZE];
        dev.read(&mut buf, 0, 1).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let dev = BlockFile::open(tmp.path(), 4096).unwrap();
        let data = vec![0x42u8; SECTOR_SIZE];
        dev.write(&data, SECTOR_SIZE, 1).unwrap();
        let mut buf = vec![0u8; SECTOR_SIZE];
        dev.read(&mut buf, SECTOR_SIZE, 1).unwrap();
        assert_eq!(buf, data);
    }
}
