//! Superblock: volume metadata living in cluster 0.
//!
//! A much smaller layout than a real FAT32 BIOS Parameter Block, since
//! the volume geometry here is entirely fixed at format time rather than
//! negotiated per-partition.

use crate::codec::{read_fixed_str, read_u16, read_u32, write_fixed_str, write_u16, write_u32};
use crate::device::{BlockDevice, BlockFile};
use crate::{CLUSTER_SIZE, DATA_START_CLUSTER, ROOT_DIR_START_CLUSTER, SECTOR_SIZE};

const OFFSET_VOLUME_NAME: usize = 0;
const LEN_VOLUME_NAME: usize = 10;
const OFFSET_TOTAL_SECTORS: usize = 10;
const OFFSET_SECTOR_SIZE: usize = 14;
const OFFSET_SECTORS_PER_CLUSTER: usize = 16;
const OFFSET_FAT_COUNT: usize = 17;
const OFFSET_FAT_SIZE_CLUSTERS: usize = 18;
const OFFSET_FREE_CLUSTERS: usize = 20;
const OFFSET_FIRST_FREE_CLUSTER: usize = 24;
const OFFSET_ROOT_DIR_CLUSTER: usize = 28;
const OFFSET_MAX_UID: usize = 32;
const OFFSET_MAX_GID: usize = 34;

/// In-memory view of the superblock, read once at mount and written back on
/// every change to free-cluster count or issued UID/GID high-water marks.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub volume_name: [u8; LEN_VOLUME_NAME],
    pub total_sectors: u32,
    pub sector_size: u16,
    pub sectors_per_cluster: u8,
    pub fat_count: u8,
    pub fat_size_clusters: u16,
    pub free_clusters: u32,
    pub first_free_cluster: u32,
    pub root_dir_cluster: u32,
    pub max_uid: u16,
    pub max_gid: u16,
}

impl Superblock {
    pub fn new(volume_name: &str, total_clusters: u32) -> Self {
        let data_clusters = total_clusters.saturating_sub(DATA_START_CLUSTER);
        let mut name = [0u8; LEN_VOLUME_NAME];
        write_fixed_str(&mut name, volume_name);
        Self {
            volume_name: name,
            total_sectors: total_clusters * (CLUSTER_SIZE / SECTOR_SIZE) as u32,
            sector_size: SECTOR_SIZE as u16,
            sectors_per_cluster: (CLUSTER_SIZE / SECTOR_SIZE) as u8,
            fat_count: 1,
            fat_size_clusters: crate::FAT_REGION_CLUSTERS as u16,
            free_clusters: data_clusters,
            first_free_cluster: DATA_START_CLUSTER,
            root_dir_cluster: ROOT_DIR_START_CLUSTER,
            max_uid: 0,
            max_gid: 99,
        }
    }

    pub fn volume_name(&self) -> String {
        read_fixed_str(&self.volume_name)
    }

    pub fn total_clusters(&self) -> u32 {
        self.total_sectors / self.sectors_per_cluster as u32
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[OFFSET_VOLUME_NAME..OFFSET_VOLUME_NAME + LEN_VOLUME_NAME]
            .copy_from_slice(&self.volume_name);
        write_u32(&mut buf[OFFSET_TOTAL_SECTORS..], self.total_sectors);
        write_u16(&mut buf[OFFSET_SECTOR_SIZE..], self.sector_size);
        buf[OFFSET_SECTORS_PER_CLUSTER] = self.sectors_per_cluster;
        buf[OFFSET_FAT_COUNT] = self.fat_count;
        write_u16(&mut buf[OFFSET_FAT_SIZE_CLUSTERS..], self.fat_size_clusters);
        write_u32(&mut buf[OFFSET_FREE_CLUSTERS..], self.free_clusters);
        write_u32(&mut buf[OFFSET_FIRST_FREE_CLUSTER..], self.first_free_cluster);
        write_u32(&mut buf[OFFSET_ROOT_DIR_CLUSTER..], self.root_dir_cluster);
        write_u16(&mut buf[OFFSET_MAX_UID..], self.max_uid);
        write_u16(&mut buf[OFFSET_MAX_GID..], self.max_gid);
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut volume_name = [0u8; LEN_VOLUME_NAME];
        volume_name.copy_from_slice(&buf[OFFSET_VOLUME_NAME..OFFSET_VOLUME_NAME + LEN_VOLUME_NAME]);
        Self {
            volume_name,
            total_sectors: read_u32(&buf[OFFSET_TOTAL_SECTORS..]),
            sector_size: read_u16(&buf[OFFSET_SECTOR_SIZE..]),
            sectors_per_cluster: buf[OFFSET_SECTORS_PER_CLUSTER],
            fat_count: buf[OFFSET_FAT_COUNT],
            fat_size_clusters: read_u16(&buf[OFFSET_FAT_SIZE_CLUSTERS..]),
            free_clusters: read_u32(&buf[OFFSET_FREE_CLUSTERS..]),
            first_free_cluster: read_u32(&buf[OFFSET_FIRST_FREE_CLUSTER..]),
            root_dir_cluster: read_u32(&buf[OFFSET_ROOT_DIR_CLUSTER..]),
            max_uid: read_u16(&buf[OFFSET_MAX_UID..]),
            max_gid: read_u16(&buf[OFFSET_MAX_GID..]),
        }
    }

    pub fn read_from(device: &BlockFile) -> std::io::Result<Self> {
        let mut buf = vec![0u8; CLUSTER_SIZE];
        device.read(&mut buf, 0, CLUSTER_SIZE / SECTOR_SIZE)?;
        Ok(Self::decode(&buf))
    }

    pub fn write_to(&self, device: &BlockFile) -> std::io::Result<()> {
        let mut buf = vec![0u8; CLUSTER_SIZE];
        self.encode(&mut buf);
        device.write(&buf, 0, CLUSTER_SIZE / SECTOR_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let sb = Superblock::new("OSEMU", 300_000);
        let mut buf = vec![0u8; CLUSTER_SIZE];
        sb.encode(&mut buf);
        let decoded = Superblock::decode(&buf);
        assert_eq!(decoded.volume_name(), "OSEMU");
        assert_eq!(decoded.total_sectors, sb.total_sectors);
        assert_eq!(decoded.max_gid, 99);
    }
}
