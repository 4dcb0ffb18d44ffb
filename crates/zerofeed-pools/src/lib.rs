//! Resource pools for zerofeed workers.
//!
//! Sandboxed metadata extraction needs three kinds of scarce resources:
//! cgroups that cap memory and disk IO of untrusted subprocesses, mounted
//! quota directories that cap their disk usage, and XML-RPC client handles
//! onto the index. All three follow the same lease discipline: a borrower
//! acquires a resource for the duration of a scope and the resource returns
//! to the pool's free list afterwards; pools grow on demand and a leased
//! resource is never shared.
//!
//! Pools run on the single-threaded scheduler, so free lists are plain
//! `RefCell`s; nothing here is `Send`.

pub mod cgroup;
pub mod combined;
pub mod error;
pub mod lease;
pub mod process;
pub mod quota;

pub use cgroup::{Cgroup, CgroupLease, CgroupPool};
pub use combined::CombinedPool;
pub use error::{PoolError, Result};
pub use lease::{FreeList, Lease};
pub use process::kill_pids;
pub use quota::{QuotaDirPool, QuotaLease};
