//! The combined pool handed to workers.

use crate::cgroup::{CgroupLease, CgroupPool};
use crate::error::Result;
use crate::lease::{FreeList, Lease};
use crate::quota::{QuotaDirPool, QuotaLease};
use zerofeed_pypi::PypiClient;

/// All three pools behind one handle.
///
/// Workers lease what they need for the duration of one step: a PyPI client
/// for index calls, a quota directory for extraction, cgroups for a
/// sandboxed subprocess.
pub struct CombinedPool {
    cgroups: CgroupPool,
    quota: QuotaDirPool,
    pypi: FreeList<PypiClient>,
}

impl CombinedPool {
    /// Create a pool; `make_client` builds a fresh index client whenever the
    /// client free list runs dry.
    pub fn new(make_client: impl Fn() -> PypiClient + 'static) -> Self {
        Self {
            cgroups: CgroupPool::new(),
            quota: QuotaDirPool::new(),
            pypi: FreeList::new(move || Ok(make_client())),
        }
    }

    /// A pool that needs no superuser assistance: plain directories instead
    /// of quota mounts, cgroups under a private root. For tests and dry
    /// runs; nothing is actually resource-limited.
    pub fn unprivileged(
        cgroup_root: impl Into<std::path::PathBuf>,
        make_client: impl Fn() -> PypiClient + 'static,
    ) -> Self {
        Self {
            cgroups: CgroupPool::with_root(cgroup_root),
            quota: QuotaDirPool::plain(),
            pypi: FreeList::new(move || Ok(make_client())),
        }
    }

    /// Prepare the parts that need superuser assistance.
    pub async fn setup(&self) -> Result<()> {
        self.cgroups.setup().await
    }

    /// Lease a cgroup set.
    pub async fn cgroups(&self) -> Result<CgroupLease<'_>> {
        self.cgroups.acquire().await
    }

    /// Lease a quota directory.
    pub async fn quota_directory(&self) -> Result<QuotaLease<'_>> {
        self.quota.acquire().await
    }

    /// Lease a PyPI client.
    pub fn pypi(&self) -> Result<Lease<'_, PypiClient>> {
        self.pypi.acquire()
    }

    /// Release everything: drain and remove cgroups, unmount quota
    /// directories.
    pub async fn teardown(&self) {
        self.cgroups.teardown().await;
        self.quota.teardown().await;
    }
}
