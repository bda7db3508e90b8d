//! FAT allocator: interprets the FAT region, allocates and frees cluster
//! chains, scanning the whole data region for a free cluster (the Python
//! source's 1000-cluster-limited variant of this search is not
//! reproduced -- see DESIGN.md).

use std::sync::Arc;

use crate::cache::get_cluster_cache;
use crate::codec::{read_u32, write_u32};
use crate::device::BlockFile;
use crate::error::{Error, Result};
use crate::{
    CLUSTER_SIZE, DATA_START_CLUSTER, END_OF_CLUSTER, FAT_ENTRY_SIZE, FAT_START_CLUSTER,
    FREE_CLUSTER,
};

/// How many FAT entries fit in one cluster of the FAT region.
const ENTRIES_PER_FAT_CLUSTER: u32 = (CLUSTER_SIZE / FAT_ENTRY_SIZE) as u32;

pub struct FatTable {
    device: Arc<BlockFile>,
    total_clusters: u32,
}

impl FatTable {
    pub fn new(device: Arc<BlockFile>, total_clusters: u32) -> Self {
        Self {
            device,
            total_clusters,
        }
    }

    fn entry_location(cluster: u32) -> (u32, usize) {
        let fat_cluster = FAT_START_CLUSTER + cluster / ENTRIES_PER_FAT_CLUSTER;
        let offset = (cluster % ENTRIES_PER_FAT_CLUSTER) as usize * FAT_ENTRY_SIZE;
        (fat_cluster, offset)
    }

    pub fn get(&self, cluster: u32) -> std::io::Result<u32> {
        let (fat_cluster, offset) = Self::entry_location(cluster);
        let cache = get_cluster_cache(fat_cluster, Arc::clone(&self.device))?;
        let guard = cache.read().unwrap();
        Ok(read_u32(&guard.raw()[offset..offset + FAT_ENTRY_SIZE]))
    }

    pub fn set(&self, cluster: u32, value: u32) -> std::io::Result<()> {
        let (fat_cluster, offset) = Self::entry_location(cluster);
        let cache = get_cluster_cache(fat_cluster, Arc::clone(&self.device))?;
        let mut guard = cache.write().unwrap();
        write_u32(&mut guard.raw_mut()[offset..offset + FAT_ENTRY_SIZE], value);
        Ok(())
    }

    pub fn is_free(&self, cluster: u32) -> std::io::Result<bool> {
        Ok(self.get(cluster)? == FREE_CLUSTER)
    }

    /// Scans the whole data region for a free cluster. Unlike the Python
    /// original this does not stop after 1000 clusters.
    pub fn allocate_free(&self) -> Result<u32> {
        for cluster in DATA_START_CLUSTER..self.total_clusters {
            if self.is_free(cluster)? {
                self.set(cluster, END_OF_CLUSTER)?;
                return Ok(cluster);
            }
        }
        Err(Error::OutOfSpace)
    }

    pub fn extend(&self, prev: u32, next: u32) -> std::io::Result<()> {
        self.set(prev, next)
    }

    pub fn terminate(&self, cluster: u32) -> std::io::Result<()> {
        self.set(cluster, END_OF_CLUSTER)
    }

    /// Walks the chain starting at `first`, returning its cluster numbers
    /// in order. Bounded at `total_clusters` steps to guard against a
    /// corrupted cyclic chain.
    pub fn chain(&self, first: u32) -> std::io::Result<Vec<u32>> {
        let mut clusters = Vec::new();
        let mut current = first;
        for _ in 0..self.total_clusters {
            if current == 0 || current == END_OF_CLUSTER {
                break;
            }
            clusters.push(current);
            let next = self.get(current)?;
            if next == END_OF_CLUSTER || next == FREE_CLUSTER {
                break;
            }
            current = next;
        }
        Ok(clusters)
    }

    /// Frees every cluster in the chain starting at `first`.
    pub fn free_chain(&self, first: u32) -> std::io::Result<()> {
        if first == 0 {
            return Ok(());
        }
        let mut current = first;
        for _ in 0..self.total_clusters {
            if current == 0 {
                break;
            }
            let next = self.get(current)?;
            self.set(current, FREE_CLUSTER)?;
            if next == END_OF_CLUSTER || next == FREE_CLUSTER {
                break;
            }
            current = next;
        }
        Ok(())
    }

    pub fn chain_len(&self, first: u32) -> std::io::Result<usize> {
        Ok(self.chain(first)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh_table() -> (FatTable, Arc<BlockFile>) {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        let total_clusters = DATA_START_CLUSTER + 16;
        let device = Arc::new(
            BlockFile::open(tmp.path(), total_clusters as u64 * CLUSTER_SIZE as u64).unwrap(),
        );
        (FatTable::new(Arc::clone(&device), total_clusters), device)
    }

    #[test]
    fn allocate_then_free_round_trips() {
        let (fat, _dev) = fresh_table();
        let a = fat.allocate_free().unwrap();
        let b = fat.allocate_free().unwrap();
        assert_ne!(a, b);
        fat.extend(a, b).unwrap();
        assert_eq!(fat.chain(a).unwrap(), vec![a, b]);
        fat.free_chain(a).unwrap();
        assert!(fat.is_free(a).unwrap());
        assert!(fat.is_free(b).unwrap());
        crate::cache::drop_all();
    }

    #[test]
    fn out_of_space_when_exhausted() {
        let (fat, _dev) = fresh_table();
        let total = 16;
        let mut allocated = Vec::new();
        for _ in 0..total {
            allocated.push(fat.allocate_free().unwrap());
        }
        assert!(matches!(fat.allocate_free(), Err(Error::OutOfSpace)));
        crate::cache::drop_all();
    }
}
