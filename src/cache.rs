//! An LRU cache of whole clusters sitting in front of the block device.
//!
//! A `Cache` trait (`read`/`modify`/`sync` closures over a typed view of
//! the buffer) backed by a `lazy_static` global manager, operating at
//! 4096-byte cluster granularity rather than raw 512-byte blocks.

use std::sync::{Arc, Mutex, RwLock};

use lazy_static::lazy_static;
use lru::LruCache;

use crate::device::{BlockDevice, BlockFile};
use crate::{CLUSTER_SIZE, SECTORS_PER_CLUSTER};

const CLUSTER_CACHE_LIMIT: usize = 64;

pub trait Cache {
    fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V;
    fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V;
    fn sync(&mut self) -> std::io::Result<()>;
}

pub struct ClusterCache {
    cache: Vec<u8>,
    cluster_id: u32,
    device: Arc<BlockFile>,
    modified: bool,
}

impl ClusterCache {
    pub fn new(cluster_id: u32, device: Arc<BlockFile>) -> std::io::Result<Self> {
        let mut cache = vec![0u8; CLUSTER_SIZE];
        device.read(
            &mut cache,
            cluster_id as usize * CLUSTER_SIZE,
            SECTORS_PER_CLUSTER,
        )?;
        Ok(Self {
            cache,
            cluster_id,
            device,
            modified: false,
        })
    }

    fn addr_of_offset(&self, offset: usize) -> usize {
        &self.cache[offset] as *const _ as usize
    }

    fn get_ref<T: Sized>(&self, offset: usize) -> &T {
        let type_size = std::mem::size_of::<T>();
        assert!(offset + type_size <= CLUSTER_SIZE);
        let addr = self.addr_of_offset(offset);
        unsafe { &*(addr as *const T) }
    }

    fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = std::mem::size_of::<T>();
        assert!(offset + type_size <= CLUSTER_SIZE);
        self.modified = true;
        let addr = self.addr_of_offset(offset);
        unsafe { &mut *(addr as *mut T) }
    }

    pub fn raw(&self) -> &[u8] {
        &self.cache
    }

    pub fn raw_mut(&mut self) -> &mut [u8] {
        self.modified = true;
        &mut self.cache
    }
}

impl Cache for ClusterCache {
    fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get_ref(offset))
    }

    fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    fn sync(&mut self) -> std::io::Result<()> {
        if self.modified {
            self.modified = false;
            self.device.write(
                &self.cache,
                self.cluster_id as usize * CLUSTER_SIZE,
                SECTORS_PER_CLUSTER,
            )?;
        }
        Ok(())
    }
}

impl Drop for ClusterCache {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}

pub struct ClusterCacheManager {
    lru: LruCache<u32, Arc<RwLock<ClusterCache>>>,
}

impl ClusterCacheManager {
    pub fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
        }
    }

    pub fn get(
        &mut self,
        cluster_id: u32,
        device: Arc<BlockFile>,
    ) -> std::io::Result<Arc<RwLock<ClusterCache>>> {
        if let Some(hit) = self.lru.get(&cluster_id) {
            return Ok(Arc::clone(hit));
        }

        let cache = Arc::new(RwLock::new(ClusterCache::new(cluster_id, device)?));

        if self.lru.len() >= CLUSTER_CACHE_LIMIT {
            if let Some((_, victim)) = self.lru.peek_lru() {
                if Arc::strong_count(victim) == 1 {
                    self.lru.pop_lru();
                }
            }
        }
        self.lru.put(cluster_id, Arc::clone(&cache));
        Ok(cache)
    }

    pub fn sync_all(&mut self) -> std::io::Result<()> {
        for (_, cache) in self.lru.iter() {
            cache.write().unwrap().sync()?;
        }
        Ok(())
    }

    pub fn drop_all(&mut self) {
        self.lru.clear();
    }
}

impl Default for ClusterCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref CLUSTER_CACHE_MANAGER: Mutex<ClusterCacheManager> =
        Mutex::new(ClusterCacheManager::new());
}

pub fn get_cluster_cache(
    cluster_id: u32,
    device: Arc<BlockFile>,
) -> std::io::Result<Arc<RwLock<ClusterCache>>> {
    CLUSTER_CACHE_MANAGER.lock().unwrap().get(cluster_id, device)
}

pub fn sync_all() -> std::io::Result<()> {
    CLUSTER_CACHE_MANAGER.lock().unwrap().sync_all()
}

/// Drops every cached cluster without writing back. Used between tests
/// that reuse the same backing path so a later test does not observe an
/// earlier test's clusters still pinned in the global cache.
pub fn drop_all() {
    CLUSTER_CACHE_MANAGER.lock().unwrap().drop_all();
}
