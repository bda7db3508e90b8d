//! File byte I/O: create/read/write/append/delete/rename/chmod/chown
//! against the root directory and FAT.

use std::sync::Arc;

use crate::cache::get_cluster_cache;
use crate::device::BlockFile;
use crate::dir::{DirRecord, RootDirectory};
use crate::error::{Error, Result};
use crate::fat::FatTable;
use crate::{CLUSTER_SIZE, DIRENT_NAME_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Replace,
    Append,
}

pub struct FileStore {
    device: Arc<BlockFile>,
    dir: RootDirectory,
    fat: FatTable,
}

impl FileStore {
    pub fn new(device: Arc<BlockFile>, total_clusters: u32) -> Self {
        Self {
            dir: RootDirectory::new(Arc::clone(&device)),
            fat: FatTable::new(Arc::clone(&device), total_clusters),
            device,
        }
    }

    pub fn dir(&self) -> &RootDirectory {
        &self.dir
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn device(&self) -> &BlockFile {
        &self.device
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() || name.as_bytes().len() > DIRENT_NAME_LEN || crate::is_illegal_name(name) {
            return Err(Error::NameTooLong(name.to_string()));
        }
        Ok(())
    }

    pub fn create(&self, name: &str, uid: u8, gid: u8, attrs: u8) -> Result<DirRecord> {
        Self::check_name(name)?;
        let record = DirRecord::new(name, uid, gid, crate::DEFAULT_FILE_PERMS, attrs);
        self.dir.insert(record)?;
        Ok(record)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let (_, record) = self
            .dir
            .find(name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        self.read_chain(record.first_cluster, record.size as usize)
    }

    fn read_chain(&self, first_cluster: u32, size: usize) -> Result<Vec<u8>> {
        if first_cluster == 0 || size == 0 {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(size);
        for cluster in self.fat.chain(first_cluster)? {
            if out.len() >= size {
                break;
            }
            let cache = get_cluster_cache(cluster, Arc::clone(&self.device))?;
            let guard = cache.read().unwrap();
            let remaining = size - out.len();
            let take = remaining.min(CLUSTER_SIZE);
            out.extend_from_slice(&guard.raw()[..take]);
        }
        out.truncate(size);
        Ok(out)
    }

    /// Writes `data` to `name`. In `Append` mode, the previous content is
    /// read back and prepended to `data`, matching the original's
    /// append-then-rewrite behavior rather than seeking to the end.
    pub fn write(&self, name: &str, data: &[u8], mode: WriteMode) -> Result<DirRecord> {
        let (_, existing) = self
            .dir
            .find(name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let content = match mode {
            WriteMode::Replace => data.to_vec(),
            WriteMode::Append => {
                let mut old = self.read_chain(existing.first_cluster, existing.size as usize)?;
                old.extend_from_slice(data);
                old
            }
        };

        let needed_clusters = if content.is_empty() {
            0
        } else {
            (content.len() + CLUSTER_SIZE - 1) / CLUSTER_SIZE
        };

        // Always free the old chain before writing the new one: a shorter
        // replacement must not leave stale clusters allocated (see
        // DESIGN.md -- this closes the Python original's leaked-cluster
        // bug on a shrinking overwrite).
        if existing.first_cluster != 0 {
            self.fat.free_chain(existing.first_cluster)?;
        }

        let first_cluster = if needed_clusters == 0 {
            0
        } else {
            self.write_clusters(&content, needed_clusters)?
        };

        self.dir.update(name, |record| {
            record.size = content.len() as u32;
            record.first_cluster = first_cluster;
            record.touch_modified();
        })
    }

    fn write_clusters(&self, content: &[u8], needed_clusters: usize) -> Result<u32> {
        let mut first_cluster = None;
        let mut prev_cluster = None;

        for chunk_index in 0..needed_clusters {
            let cluster = self.fat.allocate_free()?;
            if let Some(prev) = prev_cluster {
                self.fat.extend(prev, cluster)?;
            } else {
                first_cluster = Some(cluster);
            }

            let start = chunk_index * CLUSTER_SIZE;
            let end = (start + CLUSTER_SIZE).min(content.len());
            let cache = get_cluster_cache(cluster, Arc::clone(&self.device))?;
            let mut guard = cache.write().unwrap();
            let buf = guard.raw_mut();
            buf.iter_mut().for_each(|b| *b = 0);
            buf[..end - start].copy_from_slice(&content[start..end]);
            drop(guard);

            prev_cluster = Some(cluster);
        }

        if let Some(last) = prev_cluster {
            self.fat.terminate(last)?;
        }

        Ok(first_cluster.unwrap_or(0))
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let record = self.dir.remove(name)?;
        if record.first_cluster != 0 {
            self.fat.free_chain(record.first_cluster)?;
        }
        Ok(())
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        Self::check_name(new)?;
        self.dir.rename(old, new)?;
        Ok(())
    }

    pub fn chmod(&self, name: &str, mode: u16) -> Result<()> {
        if mode > 0o777 {
            return Err(Error::BadMode(format!("{mode:o}")));
        }
        self.dir.update(name, |record| {
            record.perms = mode;
            record.touch_modified();
        })?;
        Ok(())
    }

    pub fn chown(&self, name: &str, uid: u8, gid: u8) -> Result<()> {
        self.dir.update(name, |record| {
            record.uid = uid;
            record.gid = gid;
            record.touch_modified();
        })?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<DirRecord>> {
        Ok(self.dir.list()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh_store() -> (FileStore, Arc<BlockFile>) {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let total_clusters = crate::DATA_START_CLUSTER + 8;
        let device = Arc::new(
            BlockFile::open(tmp.path(), total_clusters as u64 * CLUSTER_SIZE as u64).unwrap(),
        );
        (FileStore::new(Arc::clone(&device), total_clusters), device)
    }

    #[test]
    fn create_write_read_round_trips() {
        let (store, _dev) = fresh_store();
        store.create("a.txt", 1000, 100, 0).unwrap();
        store.write("a.txt", b"hello", WriteMode::Replace).unwrap();
        assert_eq!(store.read("a.txt").unwrap(), b"hello");
        crate::cache::drop_all();
    }

    #[test]
    fn multi_cluster_write_chains_correctly() {
        let (store, _dev) = fresh_store();
        store.create("big.bin", 0, 0, 0).unwrap();
        let data = vec![b'X'; CLUSTER_SIZE + 500];
        store.write("big.bin", &data, WriteMode::Replace).unwrap();
        assert_eq!(store.read("big.bin").unwrap(), data);
        let (_, record) = store.dir().find("big.bin").unwrap().unwrap();
        assert_eq!(store.fat().chain_len(record.first_cluster).unwrap(), 2);
        crate::cache::drop_all();
    }

    #[test]
    fn delete_frees_chain() {
        let (store, _dev) = fresh_store();
        store.create("a.txt", 0, 0, 0).unwrap();
        store.write("a.txt", b"hello", WriteMode::Replace).unwrap();
        let (_, record) = store.dir().find("a.txt").unwrap().unwrap();
        let first = record.first_cluster;
        store.delete("a.txt").unwrap();
        assert!(store.fat().is_free(first).unwrap());
        assert!(store.dir().find("a.txt").unwrap().is_none());
        crate::cache::drop_all();
    }

    #[test]
    fn append_prepends_existing_content() {
        let (store, _dev) = fresh_store();
        store.create("a.txt", 0, 0, 0).unwrap();
        store.write("a.txt", b"hello ", WriteMode::Replace).unwrap();
        store.write("a.txt", b"world", WriteMode::Append).unwrap();
        assert_eq!(store.read("a.txt").unwrap(), b"hello world");
        crate::cache::drop_all();
    }

    #[test]
    fn shrinking_replace_frees_unused_clusters() {
        let (store, _dev) = fresh_store();
        store.create("a.txt", 0, 0, 0).unwrap();
        let big = vec![b'X'; CLUSTER_SIZE + 500];
        store.write("a.txt", &big, WriteMode::Replace).unwrap();
        let (_, record) = store.dir().find("a.txt").unwrap().unwrap();
        let old_chain = store.fat().chain(record.first_cluster).unwrap();
        store.write("a.txt", b"short", WriteMode::Replace).unwrap();
        for cluster in &old_chain[1..] {
            assert!(store.fat().is_free(*cluster).unwrap());
        }
        crate::cache::drop_all();
    }
}
