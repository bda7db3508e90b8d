//! The fixed flat root directory: a linear array of 61-byte records spread
//! across the root directory cluster region. A single fixed-width record
//! replaces the short+long directory entry pairs of a real FAT directory,
//! since this format has no subdirectories and no long-name aliasing.

use std::sync::Arc;

use crate::cache::get_cluster_cache;
use crate::codec::{read_fixed_str, read_u16, read_u32, write_fixed_str, write_u16, write_u32, Timestamp};
use crate::device::BlockFile;
use crate::error::{Error, Result};
use crate::{
    ATTR_HIDDEN, ATTR_READ_ONLY, ATTR_SYSTEM, CLUSTER_SIZE, DIRENT_FREE, DIRENT_NAME_LEN,
    DIRENT_SIZE, DIRENT_TOMBSTONE, ROOT_DIR_REGION_CLUSTERS, ROOT_DIR_START_CLUSTER,
};

const OFF_NAME: usize = 0;
const OFF_ATTR: usize = 40;
const OFF_CREATE_TIME: usize = 41;
const OFF_MODIFY_TIME: usize = 44;
const OFF_MODIFY_DATE: usize = 47;
const OFF_UID: usize = 49;
const OFF_GID: usize = 50;
const OFF_PERMS: usize = 51;
const OFF_SIZE: usize = 53;
const OFF_FIRST_CLUSTER: usize = 57;

/// Number of directory slots held in the root region. Must match the
/// per-cluster packing `slot_addr` actually uses (`CLUSTER_SIZE /
/// DIRENT_SIZE` records per cluster, no record spans a cluster boundary),
/// not a flat `region_bytes / DIRENT_SIZE` division -- the latter
/// overcounts by the padding `slot_addr` leaves at the end of each
/// cluster, which would let slot indices resolve into the data region.
/// See DESIGN.md.
pub const TOTAL_DIR_SLOTS: usize =
    ROOT_DIR_REGION_CLUSTERS as usize * (CLUSTER_SIZE / DIRENT_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirRecord {
    pub name: [u8; DIRENT_NAME_LEN],
    pub attrs: u8,
    pub create_time: [u8; 3],
    pub modify_time: [u8; 3],
    pub modify_date: [u8; 2],
    pub uid: u8,
    pub gid: u8,
    pub perms: u16,
    pub size: u32,
    pub first_cluster: u32,
}

impl DirRecord {
    pub fn new(name: &str, uid: u8, gid: u8, perms: u16, attrs: u8) -> Self {
        let mut n = [0u8; DIRENT_NAME_LEN];
        write_fixed_str(&mut n, name);
        let now = Timestamp::now();
        Self {
            name: n,
            attrs,
            create_time: now.pack_time(),
            modify_time: now.pack_time(),
            modify_date: now.pack_date(),
            uid,
            gid,
            perms,
            size: 0,
            first_cluster: 0,
        }
    }

    pub fn name(&self) -> String {
        read_fixed_str(&self.name)
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == DIRENT_FREE
    }

    pub fn is_tombstone(&self) -> bool {
        self.name[0] == DIRENT_TOMBSTONE
    }

    pub fn is_live(&self) -> bool {
        !self.is_free() && !self.is_tombstone()
    }

    pub fn is_hidden(&self) -> bool {
        self.attrs & ATTR_HIDDEN != 0
    }

    pub fn is_system(&self) -> bool {
        self.attrs & ATTR_SYSTEM != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attrs & ATTR_READ_ONLY != 0
    }

    pub fn touch_modified(&mut self) {
        let now = Timestamp::now();
        self.modify_time = now.pack_time();
        self.modify_date = now.pack_date();
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[OFF_NAME..OFF_NAME + DIRENT_NAME_LEN].copy_from_slice(&self.name);
        buf[OFF_ATTR] = self.attrs;
        buf[OFF_CREATE_TIME..OFF_CREATE_TIME + 3].copy_from_slice(&self.create_time);
        buf[OFF_MODIFY_TIME..OFF_MODIFY_TIME + 3].copy_from_slice(&self.modify_time);
        buf[OFF_MODIFY_DATE..OFF_MODIFY_DATE + 2].copy_from_slice(&self.modify_date);
        buf[OFF_UID] = self.uid;
        buf[OFF_GID] = self.gid;
        write_u16(&mut buf[OFF_PERMS..], self.perms);
        write_u32(&mut buf[OFF_SIZE..], self.size);
        write_u32(&mut buf[OFF_FIRST_CLUSTER..], self.first_cluster);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut name = [0u8; DIRENT_NAME_LEN];
        name.copy_from_slice(&buf[OFF_NAME..OFF_NAME + DIRENT_NAME_LEN]);
        let mut create_time = [0u8; 3];
        create_time.copy_from_slice(&buf[OFF_CREATE_TIME..OFF_CREATE_TIME + 3]);
        let mut modify_time = [0u8; 3];
        modify_time.copy_from_slice(&buf[OFF_MODIFY_TIME..OFF_MODIFY_TIME + 3]);
        let mut modify_date = [0u8; 2];
        modify_date.copy_from_slice(&buf[OFF_MODIFY_DATE..OFF_MODIFY_DATE + 2]);
        Self {
            name,
            attrs: buf[OFF_ATTR],
            create_time,
            modify_time,
            modify_date,
            uid: buf[OFF_UID],
            gid: buf[OFF_GID],
            perms: read_u16(&buf[OFF_PERMS..]),
            size: read_u32(&buf[OFF_SIZE..]),
            first_cluster: read_u32(&buf[OFF_FIRST_CLUSTER..]),
        }
    }
}

/// A resolved directory slot: which cluster it lives in, and the byte
/// offset within that cluster.
#[derive(Debug, Clone, Copy)]
struct SlotAddr {
    cluster: u32,
    offset: usize,
}

fn slot_addr(index: usize) -> SlotAddr {
    let slots_per_cluster = CLUSTER_SIZE / DIRENT_SIZE;
    let cluster = ROOT_DIR_START_CLUSTER + (index / slots_per_cluster) as u32;
    let offset = (index % slots_per_cluster) * DIRENT_SIZE;
    SlotAddr { cluster, offset }
}

pub struct RootDirectory {
    device: Arc<BlockFile>,
}

impl RootDirectory {
    pub fn new(device: Arc<BlockFile>) -> Self {
        Self { device }
    }

    fn read_slot(&self, index: usize) -> std::io::Result<DirRecord> {
        let addr = slot_addr(index);
        let cache = get_cluster_cache(addr.cluster, Arc::clone(&self.device))?;
        let guard = cache.read().unwrap();
        Ok(DirRecord::decode(
            &guard.raw()[addr.offset..addr.offset + DIRENT_SIZE],
        ))
    }

    fn write_slot(&self, index: usize, record: &DirRecord) -> std::io::Result<()> {
        let addr = slot_addr(index);
        let cache = get_cluster_cache(addr.cluster, Arc::clone(&self.device))?;
        let mut guard = cache.write().unwrap();
        record.encode(&mut guard.raw_mut()[addr.offset..addr.offset + DIRENT_SIZE]);
        Ok(())
    }

    /// Iterates slots until the first byte-0x00 "end of allocated slots"
    /// marker, yielding `(index, record)` for live and tombstoned slots.
    fn scan(&self) -> std::io::Result<Vec<(usize, DirRecord)>> {
        let mut out = Vec::new();
        for index in 0..TOTAL_DIR_SLOTS {
            let record = self.read_slot(index)?;
            if record.is_free() {
                break;
            }
            out.push((index, record));
        }
        Ok(out)
    }

    pub fn find(&self, name: &str) -> std::io::Result<Option<(usize, DirRecord)>> {
        for (index, record) in self.scan()? {
            if record.is_live() && record.name() == name {
                return Ok(Some((index, record)));
            }
        }
        Ok(None)
    }

    /// All live, non-hidden records -- what a directory listing shows.
    pub fn list(&self) -> std::io::Result<Vec<DirRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_live() && !r.is_hidden())
            .collect())
    }

    /// All live records including reserved/hidden ones.
    pub fn list_all(&self) -> std::io::Result<Vec<DirRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| r.is_live())
            .collect())
    }

    fn find_free_slot(&self) -> Result<usize> {
        let scanned = self.scan()?;
        for (index, record) in &scanned {
            if record.is_tombstone() {
                return Ok(*index);
            }
        }
        let next = scanned.len();
        if next >= TOTAL_DIR_SLOTS {
            return Err(Error::DirFull);
        }
        Ok(next)
    }

    pub fn insert(&self, record: DirRecord) -> Result<usize> {
        if self.find(&record.name())?.is_some() {
            return Err(Error::AlreadyExists(record.name()));
        }
        let slot = self.find_free_slot()?;
        self.write_slot(slot, &record)?;
        Ok(slot)
    }

    pub fn remove(&self, name: &str) -> Result<DirRecord> {
        let (index, record) = self
            .find(name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let mut tombstoned = record;
        tombstoned.name[0] = DIRENT_TOMBSTONE;
        self.write_slot(index, &tombstoned)?;
        Ok(record)
    }

    pub fn update(&self, name: &str, f: impl FnOnce(&mut DirRecord)) -> Result<DirRecord> {
        let (index, mut record) = self
            .find(name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        f(&mut record);
        self.write_slot(index, &record)?;
        Ok(record)
    }

    pub fn rename(&self, old: &str, new: &str) -> Result<DirRecord> {
        if self.find(new)?.is_some() {
            return Err(Error::AlreadyExists(new.to_string()));
        }
        self.update(old, |record| {
            let mut n = [0u8; DIRENT_NAME_LEN];
            write_fixed_str(&mut n, new);
            record.name = n;
            record.touch_modified();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh_dir() -> (RootDirectory, Arc<BlockFile>) {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let total_clusters = crate::DATA_START_CLUSTER + 4;
        let device = Arc::new(
            BlockFile::open(tmp.path(), total_clusters as u64 * CLUSTER_SIZE as u64).unwrap(),
        );
        (RootDirectory::new(Arc::clone(&device)), device)
    }

    #[test]
    fn insert_find_remove_round_trips() {
        let (dir, _dev) = fresh_dir();
        let record = DirRecord::new("a.txt", 1000, 100, 0o644, 0);
        dir.insert(record).unwrap();
        let (_, found) = dir.find("a.txt").unwrap().unwrap();
        assert_eq!(found.name(), "a.txt");
        dir.remove("a.txt").unwrap();
        assert!(dir.find("a.txt").unwrap().is_none());
        crate::cache::drop_all();
    }

    #[test]
    fn reuses_tombstoned_slot() {
        let (dir, _dev) = fresh_dir();
        dir.insert(DirRecord::new("a.txt", 0, 0, 0o644, 0)).unwrap();
        dir.remove("a.txt").unwrap();
        let slot = dir.find_free_slot().unwrap();
        assert_eq!(slot, 0);
        crate::cache::drop_all();
    }

    #[test]
    fn duplicate_name_rejected() {
        let (dir, _dev) = fresh_dir();
        dir.insert(DirRecord::new("a.txt", 0, 0, 0o644, 0)).unwrap();
        assert!(matches!(
            dir.insert(DirRecord::new("a.txt", 0, 0, 0o644, 0)),
            Err(Error::AlreadyExists(_))
        ));
        crate::cache::drop_all();
    }
}
