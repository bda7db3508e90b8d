//! `Filesystem`: the single entry point consumers use, combining the
//! device, superblock, FAT, directory, file I/O, and identity store.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info};

use crate::device::{BlockDevice, BlockFile};
use crate::dir::DirRecord;
use crate::error::Result;
use crate::file::{FileStore, WriteMode};
use crate::identity::IdentityStore;
use crate::permissions::{self, Operation};
use crate::superblock::Superblock;
use crate::{CLUSTER_SIZE, DATA_START_CLUSTER, DEFAULT_DISK_SIZE_GIB};

pub struct Filesystem {
    device: Arc<BlockFile>,
    files: FileStore,
    total_clusters: u32,
}

impl Filesystem {
    /// Opens an existing image, or formats a new one at `path` sized
    /// `disk_size_gib` GiB if it does not yet exist.
    pub fn open_or_format(path: impl AsRef<Path>, disk_size_gib: u64) -> Result<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();
        let size_bytes = disk_size_gib.max(1) * 1024 * 1024 * 1024;
        let total_clusters = (size_bytes / CLUSTER_SIZE as u64) as u32;

        let device = Arc::new(BlockFile::open(path, size_bytes)?);

        if is_new {
            info!("formatting new image at {:?} ({} GiB)", path, disk_size_gib);
            Self::format(&device, total_clusters)?;
        } else {
            debug!("opening existing image at {:?}", path);
        }

        let files = FileStore::new(Arc::clone(&device), total_clusters);
        let fs = Self {
            device,
            files,
            total_clusters,
        };
        IdentityStore::new(&fs.files).ensure_bootstrapped()?;
        Ok(fs)
    }

    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_or_format(path, DEFAULT_DISK_SIZE_GIB)
    }

    fn format(device: &Arc<BlockFile>, total_clusters: u32) -> Result<()> {
        debug!("writing superblock");
        let superblock = Superblock::new("OSEMU", total_clusters);
        superblock.write_to(device)?;

        debug!("zeroing FAT region");
        let zero_cluster = vec![0u8; CLUSTER_SIZE];
        for cluster in crate::FAT_START_CLUSTER..crate::ROOT_DIR_START_CLUSTER {
            device.write(
                &zero_cluster,
                cluster as usize * CLUSTER_SIZE,
                crate::SECTORS_PER_CLUSTER,
            )?;
        }

        debug!("zeroing root directory region");
        for cluster in crate::ROOT_DIR_START_CLUSTER..DATA_START_CLUSTER {
            device.write(
                &zero_cluster,
                cluster as usize * CLUSTER_SIZE,
                crate::SECTORS_PER_CLUSTER,
            )?;
        }

        Ok(())
    }

    pub fn identity(&self) -> IdentityStore<'_> {
        IdentityStore::new(&self.files)
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    pub fn total_clusters(&self) -> u32 {
        self.total_clusters
    }

    pub fn free_cluster_count(&self) -> Result<u32> {
        let fat = self.files.fat();
        let mut free = 0u32;
        for cluster in DATA_START_CLUSTER..self.total_clusters {
            if fat.is_free(cluster)? {
                free += 1;
            }
        }
        Ok(free)
    }

    pub fn list(&self) -> Result<Vec<DirRecord>> {
        self.files.list()
    }

    pub fn create(&self, name: &str, uid: u8, gid: u8) -> Result<DirRecord> {
        self.files.create(name, uid, gid, 0)
    }

    pub fn read_checked(&self, name: &str, uid: u8, gid: u8) -> Result<Vec<u8>> {
        self.authorize(name, uid, gid, Operation::Read)?;
        self.files.read(name)
    }

    pub fn write_checked(
        &self,
        name: &str,
        data: &[u8],
        mode: WriteMode,
        uid: u8,
        gid: u8,
    ) -> Result<()> {
        if self.files.dir().find(name)?.is_some() {
            self.authorize(name, uid, gid, Operation::Write)?;
        } else {
            self.files.create(name, uid, gid, 0)?;
        }
        self.files.write(name, data, mode)?;
        Ok(())
    }

    pub fn delete_checked(&self, name: &str, uid: u8, gid: u8) -> Result<()> {
        self.authorize(name, uid, gid, Operation::Delete)?;
        self.files.delete(name)
    }

    pub fn rename_checked(&self, old: &str, new: &str, uid: u8, gid: u8) -> Result<()> {
        self.authorize(old, uid, gid, Operation::Rename)?;
        self.files.rename(old, new)
    }

    pub fn chmod_checked(&self, name: &str, mode: u16, uid: u8, gid: u8) -> Result<()> {
        let (_, record) = self
            .files
            .dir()
            .find(name)?
            .ok_or_else(|| crate::error::Error::NotFound(name.to_string()))?;
        if uid != 0 && uid != record.uid {
            return Err(crate::error::Error::PermissionDenied(format!(
                "only the owner or root may chmod {name:?}"
            )));
        }
        self.files.chmod(name, mode)
    }

    pub fn chown_checked(
        &self,
        name: &str,
        new_uid: u8,
        new_gid: u8,
        requester_uid: u8,
    ) -> Result<()> {
        if requester_uid != 0 {
            return Err(crate::error::Error::PermissionDenied(
                "only root may chown".into(),
            ));
        }
        self.files.chown(name, new_uid, new_gid)
    }

    fn authorize(&self, name: &str, uid: u8, gid: u8, op: Operation) -> Result<()> {
        let (_, record) = self
            .files
            .dir()
            .find(name)?
            .ok_or_else(|| crate::error::Error::NotFound(name.to_string()))?;
        if !permissions::check(&record, uid, gid, op) {
            return Err(crate::error::Error::PermissionDenied(format!(
                "{op:?} denied on {name:?}"
            )));
        }
        Ok(())
    }

    pub fn sync(&self) -> std::io::Result<()> {
        crate::cache::sync_all()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Execute => "execute",
            Operation::Delete => "delete",
            Operation::Rename => "rename",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh_fs() -> Filesystem {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::remove_file(tmp.path()).ok();
        // Small image: enough for superblock + FAT + root dir + a few data
        // clusters, far below 1 GiB, to keep tests fast.
        let total_clusters = DATA_START_CLUSTER + 8;
        let bytes = total_clusters as u64 * CLUSTER_SIZE as u64;
        let device = Arc::new(BlockFile::open(tmp.path(), bytes).unwrap());
        Superblock::new("OSEMU", total_clusters).write_to(&device).unwrap();
        let zero = vec![0u8; CLUSTER_SIZE];
        for cluster in crate::FAT_START_CLUSTER..DATA_START_CLUSTER {
            device
                .write(&zero, cluster as usize * CLUSTER_SIZE, crate::SECTORS_PER_CLUSTER)
                .unwrap();
        }
        let files = FileStore::new(Arc::clone(&device), total_clusters);
        let fs = Filesystem {
            device,
            files,
            total_clusters,
        };
        fs.identity().ensure_bootstrapped().unwrap();
        fs
    }

    #[test]
    fn first_run_until_root_password_set() {
        let fs = fresh_fs();
        assert!(fs.identity().is_first_run().unwrap());
        fs.identity().set_password("root", "hunter2").unwrap();
        assert!(!fs.identity().is_first_run().unwrap());
        assert!(fs.identity().verify_password("root", "hunter2").unwrap());
        crate::cache::drop_all();
    }

    #[test]
    fn reserved_files_hidden_from_listing() {
        let fs = fresh_fs();
        let names: Vec<_> = fs.list().unwrap().into_iter().map(|r| r.name()).collect();
        assert!(!names.contains(&"users".to_string()));
        assert!(!names.contains(&"groups".to_string()));
        crate::cache::drop_all();
    }

    #[test]
    fn permission_checked_write_enforces_owner() {
        let fs = fresh_fs();
        fs.create("a.txt", 5, 50).unwrap();
        fs.chmod_checked("a.txt", 0o640, 5, 5).unwrap();
        assert!(fs
            .write_checked("a.txt", b"x", WriteMode::Replace, 9, 50)
            .is_err());
        fs.write_checked("a.txt", b"x", WriteMode::Replace, 5, 50)
            .unwrap();
        crate::cache::drop_all();
    }
}
