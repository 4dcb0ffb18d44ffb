//! Pool of quota-limited work directories.
//!
//! Untrusted archives are extracted into a mounted ext2 filesystem backed by
//! a sparse 250 MB image, so an archive that decompresses into terabytes
//! runs out of quota instead of disk. Mounting needs superuser assistance;
//! unmounting is deferred to pool teardown, in reverse mount order.
//!
//! Each lease exposes an initially empty `work/` directory below the mount
//! point; leftovers from a previous lease are cleared on acquisition.

use crate::error::{PoolError, Result};
use crate::process::{run_command, sudo};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Size of the backing image. ext2 bookkeeping eats a slice of this, so the
/// usable quota is a bit smaller.
const IMAGE_SIZE_BYTES: u64 = 250 * 1024 * 1024;

/// Pool of mounted quota directories.
pub struct QuotaDirPool {
    available: RefCell<Vec<PathBuf>>,
    mounts: RefCell<Vec<PathBuf>>,
    tempdirs: RefCell<Vec<TempDir>>,
    mounted: bool,
}

impl QuotaDirPool {
    pub fn new() -> Self {
        Self {
            available: RefCell::new(Vec::new()),
            mounts: RefCell::new(Vec::new()),
            tempdirs: RefCell::new(Vec::new()),
            mounted: true,
        }
    }

    /// Plain temporary directories instead of quota mounts: no superuser
    /// assistance and no disk quota. For tests and dry runs.
    pub fn plain() -> Self {
        Self {
            mounted: false,
            ..Self::new()
        }
    }

    /// Acquire a quota directory, mounting a fresh one when none is free.
    pub async fn acquire(&self) -> Result<QuotaLease<'_>> {
        // Do not hold the free-list borrow across the awaits below.
        let popped = self.available.borrow_mut().pop();
        let mount_point = match popped {
            Some(mount_point) => mount_point,
            None => self.add().await?,
        };

        // Clear leftovers of the previous lease.
        let work = mount_point.join("work");
        if work.exists() {
            tokio::fs::remove_dir_all(&work)
                .await
                .map_err(|e| PoolError::io(&work, e))?;
        }
        tokio::fs::create_dir(&work)
            .await
            .map_err(|e| PoolError::io(&work, e))?;

        Ok(QuotaLease {
            pool: self,
            mount_point: Some(mount_point),
            work,
        })
    }

    async fn add(&self) -> Result<PathBuf> {
        let tempdir = TempDir::new().map_err(|e| PoolError::io("quota tempdir", e))?;
        let storage = tempdir.path().join("storage");
        let mount_point = tempdir.path().join("mount_point");

        if !self.mounted {
            std::fs::create_dir(&mount_point).map_err(|e| PoolError::io(&mount_point, e))?;
            self.tempdirs.borrow_mut().push(tempdir);
            return Ok(mount_point);
        }

        // Sparse backing file, formatted ext2 with no reserved blocks.
        let file = std::fs::File::create(&storage).map_err(|e| PoolError::io(&storage, e))?;
        file.set_len(IMAGE_SIZE_BYTES)
            .map_err(|e| PoolError::io(&storage, e))?;
        drop(file);
        run_command(
            "mkfs",
            &["-t", "ext2", "-m", "0", "-q", &storage.to_string_lossy()],
        )
        .await?;

        std::fs::create_dir(&mount_point).map_err(|e| PoolError::io(&mount_point, e))?;
        sudo(&[
            "mount",
            "-t",
            "ext2",
            "-o",
            "loop",
            &storage.to_string_lossy(),
            &mount_point.to_string_lossy(),
        ])
        .await?;
        self.mounts.borrow_mut().push(mount_point.clone());

        let user = std::env::var("USER").unwrap_or_else(|_| "root".to_owned());
        sudo(&["chown", &user, &mount_point.to_string_lossy()]).await?;

        self.tempdirs.borrow_mut().push(tempdir);
        Ok(mount_point)
    }

    fn release(&self, mount_point: PathBuf) {
        self.available.borrow_mut().push(mount_point);
    }

    /// Unmount everything, in reverse mount order. Backing files disappear
    /// with the temp directories afterwards.
    pub async fn teardown(&self) {
        self.available.borrow_mut().clear();
        let mounts: Vec<PathBuf> = self.mounts.borrow_mut().drain(..).collect();
        for mount_point in mounts.into_iter().rev() {
            if let Err(error) = sudo(&["umount", "--force", &mount_point.to_string_lossy()]).await
            {
                tracing::warn!("could not unmount {}: {error}", mount_point.display());
            }
        }
        self.tempdirs.borrow_mut().clear();
    }
}

impl Default for QuotaDirPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased quota directory.
pub struct QuotaLease<'a> {
    pool: &'a QuotaDirPool,
    mount_point: Option<PathBuf>,
    work: PathBuf,
}

impl QuotaLease<'_> {
    /// The empty work directory to extract into.
    pub fn work_dir(&self) -> &Path {
        &self.work
    }

    /// Bytes still free on the quota filesystem.
    pub fn free_bytes(&self) -> std::io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(&self.work)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
        Ok(stat.blocks_available() * stat.fragment_size())
    }

    /// Total size of the quota filesystem in bytes.
    pub fn total_bytes(&self) -> std::io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(&self.work)
            .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
        Ok(stat.blocks() * stat.fragment_size())
    }
}

impl Drop for QuotaLease<'_> {
    fn drop(&mut self) {
        if let Some(mount_point) = self.mount_point.take() {
            self.pool.release(mount_point);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn work_dir_starts_empty_every_lease() {
        let pool = QuotaDirPool::plain();
        let work = {
            let lease = pool.acquire().await.unwrap();
            std::fs::write(lease.work_dir().join("leftover"), "x").unwrap();
            lease.work_dir().to_path_buf()
        };
        assert!(work.join("leftover").exists());

        // The same directory comes back, cleared.
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.work_dir(), work);
        assert!(!work.join("leftover").exists());
    }

    #[tokio::test]
    async fn free_bytes_reports_something() {
        let pool = QuotaDirPool::plain();
        let lease = pool.acquire().await.unwrap();
        assert!(lease.free_bytes().unwrap() > 0);
        assert!(lease.total_bytes().unwrap() >= lease.free_bytes().unwrap());
    }
}
