//! Pool of cgroups limiting sandboxed subprocesses.
//!
//! Each lease hands out one cgroup per subsystem we use: `memory` (capped at
//! 50 MB of memory+swap, so a malicious `setup.py` cannot OOM the host) and
//! `blkio` (minimal disk IO weight). The per-subsystem groups live under
//! `/sys/fs/cgroup/{subsystem}/zerofeed/{id}`.
//!
//! The parent `zerofeed` groups may already exist, e.g. when a sysadmin
//! created them instead of granting sudo; they are never removed. Our own
//! numbered groups are removed at teardown, killing any process still
//! attached.

use crate::error::{PoolError, Result};
use crate::process::{kill_pids, sudo};
use nix::errno::Errno;
use nix::unistd::{AccessFlags, access};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Grace between SIGTERM and SIGKILL when draining a group.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Memory+swap cap for one sandboxed process.
const MEMORY_LIMIT: &str = "50M";

/// The cgroup subsystems we use.
const SUBSYSTEMS: &[&str] = &["memory", "blkio"];

/// One leased set of per-subsystem cgroup directories, all limiting the
/// same process.
#[derive(Debug, Clone)]
pub struct Cgroup {
    paths: Vec<PathBuf>,
}

impl Cgroup {
    /// The `tasks` files a sandboxed process writes its PID into.
    pub fn tasks_files(&self) -> Vec<PathBuf> {
        self.paths.iter().map(|path| path.join("tasks")).collect()
    }

    /// PIDs currently attached to any of the groups.
    async fn attached_pids(&self) -> Vec<i32> {
        let mut pids = Vec::new();
        for tasks in self.tasks_files() {
            if let Ok(content) = tokio::fs::read_to_string(&tasks).await {
                pids.extend(content.split_whitespace().filter_map(|pid| pid.parse::<i32>().ok()));
            }
        }
        pids.sort_unstable();
        pids.dedup();
        pids
    }

    /// Kill every process still attached, retrying until the groups are
    /// empty.
    async fn drain(&self) {
        loop {
            let pids = self.attached_pids().await;
            if pids.is_empty() {
                return;
            }
            kill_pids(&pids, KILL_GRACE).await;
        }
    }
}

/// Pool of [`Cgroup`]s.
pub struct CgroupPool {
    root: PathBuf,
    available: RefCell<Vec<Cgroup>>,
    all: RefCell<Vec<PathBuf>>,
    last_id: Cell<u64>,
}

impl CgroupPool {
    pub fn new() -> Self {
        Self::with_root("/sys/fs/cgroup")
    }

    /// Use a different cgroup filesystem root, for tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            available: RefCell::new(Vec::new()),
            all: RefCell::new(Vec::new()),
            last_id: Cell::new(0),
        }
    }

    fn parent(&self, subsystem: &str) -> PathBuf {
        self.root.join(subsystem).join("zerofeed")
    }

    /// Create the parent groups, with superuser assistance where our own
    /// permissions do not suffice.
    pub async fn setup(&self) -> Result<()> {
        for subsystem in SUBSYSTEMS {
            let parent = self.parent(subsystem);
            if !parent.exists() {
                sudo(&["mkdir", &parent.to_string_lossy()]).await?;
            }
            if access(&parent, AccessFlags::W_OK).is_err() {
                let user = std::env::var("USER").unwrap_or_else(|_| "root".to_owned());
                sudo(&["chown", &user, &parent.to_string_lossy()]).await?;
            }
        }
        Ok(())
    }

    /// Acquire a cgroup set, creating one when none is available.
    ///
    /// The groups are drained before they are handed out: a lease dropped on
    /// a cancellation path returns its groups without killing attached
    /// processes, and that debt is settled here.
    pub async fn acquire(&self) -> Result<CgroupLease<'_>> {
        // Do not hold the free-list borrow across the await below.
        let popped = self.available.borrow_mut().pop();
        let cgroup = match popped {
            Some(cgroup) => cgroup,
            None => self.add().await?,
        };
        cgroup.drain().await;
        Ok(CgroupLease {
            pool: self,
            cgroup: Some(cgroup),
        })
    }

    async fn add(&self) -> Result<Cgroup> {
        let id = self.last_id.get() + 1;
        self.last_id.set(id);

        let mut paths = Vec::new();
        for subsystem in SUBSYSTEMS {
            let path = self.parent(subsystem).join(id.to_string());
            tokio::fs::create_dir(&path)
                .await
                .map_err(|e| PoolError::io(&path, e))?;
            self.all.borrow_mut().push(path.clone());
            match *subsystem {
                "memory" => {
                    write_limit(&path, "memory.limit_in_bytes", MEMORY_LIMIT).await?;
                    write_limit(&path, "memory.memsw.limit_in_bytes", MEMORY_LIMIT).await?;
                }
                "blkio" => {
                    write_limit(&path, "blkio.weight", "100").await?;
                }
                other => unreachable!("unused subsystem: {other}"),
            }
            paths.push(path);
        }
        Ok(Cgroup { paths })
    }

    fn release(&self, cgroup: Cgroup) {
        self.available.borrow_mut().push(cgroup);
    }

    /// Best-effort removal of every group this pool created. Busy groups
    /// are drained and retried.
    pub async fn teardown(&self) {
        let all: Vec<PathBuf> = self.all.borrow_mut().drain(..).collect();
        for path in all {
            remove_cgroup(&path).await;
        }
        self.available.borrow_mut().clear();
    }
}

impl Default for CgroupPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A leased cgroup set. Prefer [`CgroupLease::release`]; dropping without it
/// skips the straggler kill, which the next acquisition settles.
pub struct CgroupLease<'a> {
    pool: &'a CgroupPool,
    cgroup: Option<Cgroup>,
}

impl CgroupLease<'_> {
    pub fn cgroup(&self) -> &Cgroup {
        self.cgroup.as_ref().expect("cgroup present until drop")
    }

    /// Kill any process still attached and return the groups to the pool.
    pub async fn release(mut self) {
        if let Some(cgroup) = self.cgroup.take() {
            cgroup.drain().await;
            self.pool.release(cgroup);
        }
    }
}

impl Drop for CgroupLease<'_> {
    fn drop(&mut self) {
        if let Some(cgroup) = self.cgroup.take() {
            self.pool.release(cgroup);
        }
    }
}

async fn write_limit(cgroup: &Path, file: &str, value: &str) -> Result<()> {
    let path = cgroup.join(file);
    tokio::fs::write(&path, value)
        .await
        .map_err(|e| PoolError::io(&path, e))
}

/// Stubbornly remove one cgroup directory.
async fn remove_cgroup(path: &Path) {
    loop {
        match tokio::fs::remove_dir(path).await {
            Ok(()) => return,
            Err(error) if error.raw_os_error() == Some(Errno::EBUSY as i32) => {
                // Busy means processes are still attached; kill them and
                // try again.
                let cgroup = Cgroup {
                    paths: vec![path.to_path_buf()],
                };
                cgroup.drain().await;
            }
            Err(error) => {
                tracing::warn!("could not remove {}: {error}", path.display());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a fake cgroup tree under a temp dir; limits are plain files
    /// here, so only the bookkeeping is exercised.
    fn pool_with_parents() -> (tempfile::TempDir, CgroupPool) {
        let root = tempfile::tempdir().unwrap();
        for subsystem in SUBSYSTEMS {
            std::fs::create_dir_all(root.path().join(subsystem).join("zerofeed")).unwrap();
        }
        let pool = CgroupPool::with_root(root.path());
        (root, pool)
    }

    #[tokio::test]
    async fn acquire_creates_numbered_groups() {
        let (root, pool) = pool_with_parents();
        // memory.limit_in_bytes does not exist on a plain tempdir, but
        // tokio::fs::write creates it, which is all the test needs.
        let lease = pool.acquire().await.unwrap();
        let tasks = lease.cgroup().tasks_files();
        assert_eq!(tasks.len(), SUBSYSTEMS.len());
        assert!(tasks[0].starts_with(root.path()));
        assert!(tasks[0].parent().unwrap().ends_with("zerofeed/1"));
        assert_eq!(
            std::fs::read_to_string(root.path().join("memory/zerofeed/1/memory.limit_in_bytes"))
                .unwrap(),
            MEMORY_LIMIT
        );
        lease.release().await;

        // The same group is reused for the next lease.
        let lease = pool.acquire().await.unwrap();
        assert!(lease.cgroup().tasks_files()[0]
            .parent()
            .unwrap()
            .ends_with("zerofeed/1"));
        lease.release().await;
    }

    #[tokio::test]
    async fn teardown_removes_groups() {
        let (root, pool) = pool_with_parents();
        let lease = pool.acquire().await.unwrap();
        lease.release().await;
        // On a real cgroup filesystem the limit files are virtual; rmdir
        // works on a group with no subgroups. Mimic that on the fake tree.
        for group in ["memory/zerofeed/1", "blkio/zerofeed/1"] {
            for entry in std::fs::read_dir(root.path().join(group)).unwrap() {
                std::fs::remove_file(entry.unwrap().path()).unwrap();
            }
        }
        pool.teardown().await;
        assert!(!root.path().join("memory/zerofeed/1").exists());
        assert!(!root.path().join("blkio/zerofeed/1").exists());
    }
}
