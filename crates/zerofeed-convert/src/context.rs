//! Per-worker context.

use crate::logging::FeedLogger;
use crate::sandbox::Sandbox;
use std::rc::Rc;
use zerofeed_pools::CombinedPool;

/// Everything one worker needs while converting a single package.
///
/// The feed logger is scoped to the package; the pool, sandbox and HTTP
/// client are shared across workers.
pub struct WorkerContext {
    /// Base URI where all generated files will be hosted.
    pub base_uri: String,

    /// PyPI mirror to download artifacts from, if any.
    pub pypi_mirror: Option<String>,

    pub feed_logger: FeedLogger,
    pub pool: Rc<CombinedPool>,
    pub sandbox: Rc<Sandbox>,
    pub http: reqwest::Client,
}

impl WorkerContext {
    /// URI of the feed for a canonical package name.
    pub fn feed_uri(&self, zi_name: &str) -> String {
        format!("{}/feeds/{}.xml", self.base_uri, zi_name)
    }

    /// URI of one of our tool feeds, e.g. the `convert_sdist` compile
    /// runner.
    pub fn script_uri(&self, name: &str) -> String {
        format!("{}/zerofeed/{}.xml", self.base_uri, name)
    }
}
