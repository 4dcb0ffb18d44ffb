//! The per-package worker loop.

use crate::sign::Signer;
use crate::state::State;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;
use zerofeed_convert::{
    ConvertError, Element, FeedLogger, Package, Sandbox, WorkerContext, convert_package,
};
use zerofeed_pools::CombinedPool;
use zerofeed_pypi::{PypiError, canonical_name};

/// Errors that abort the whole run, not just one package.
#[derive(Debug)]
pub enum WorkerFatal {
    /// The index kept timing out; exit 1.
    PypiTimeout,
}

/// Everything the workers share. The queue and the state are only touched
/// between awaits, never across them, which is all the synchronization a
/// cooperative scheduler needs.
pub struct RunContext {
    pub base_uri: String,
    pub pypi_mirror: Option<String>,
    pub feeds_dir: PathBuf,
    pub pool: Rc<CombinedPool>,
    pub sandbox: Rc<Sandbox>,
    pub http: reqwest::Client,
    pub signer: Signer,
    pub state: Rc<RefCell<State>>,
    pub queue: Rc<RefCell<VecDeque<String>>>,
    pub errored: Rc<Cell<bool>>,
}

/// One worker: take packages off the queue until it is empty.
///
/// Each finished package is removed from the changed set; a package that
/// ran into transient trouble stays and is retried on the next run.
pub async fn update_feeds(ctx: Rc<RunContext>) -> Result<(), WorkerFatal> {
    loop {
        let name = ctx.queue.borrow_mut().pop_front();
        let Some(name) = name else {
            return Ok(());
        };

        // The worker owns this package until it writes it back; nothing
        // else mutates it in between.
        let Some(mut package) = ctx.state.borrow().packages.get(&name).cloned() else {
            tracing::warn!("changed package {name:?} is unknown, skipping");
            continue;
        };

        let finished = update_feed(&ctx, &mut package).await?;

        let mut state = ctx.state.borrow_mut();
        state.packages.insert(name.clone(), package);
        if finished {
            state.changed.remove(&name);
        }
    }
}

/// Update one package's feed. Returns whether the package is finished.
async fn update_feed(ctx: &RunContext, package: &mut Package) -> Result<bool, WorkerFatal> {
    let zi_name = canonical_name(&package.name);
    let feed_file = ctx.feeds_dir.join(format!("{zi_name}.xml"));

    let feed_logger = match FeedLogger::open(&zi_name, &ctx.feeds_dir.join(format!("{zi_name}.log")))
    {
        Ok(feed_logger) => feed_logger,
        Err(error) => {
            tracing::error!("cannot open feed log for {zi_name}: {error}");
            ctx.errored.set(true);
            return Ok(false);
        }
    };
    feed_logger.info(format!("Updating (PyPI name: '{}')", package.name));

    let worker_context = WorkerContext {
        base_uri: ctx.base_uri.clone(),
        pypi_mirror: ctx.pypi_mirror.clone(),
        feed_logger: feed_logger.clone(),
        pool: Rc::clone(&ctx.pool),
        sandbox: Rc::clone(&ctx.sandbox),
        http: ctx.http.clone(),
    };

    // Read the feed of the previous run, if any, for verbatim reuse.
    let old_feed = match std::fs::read_to_string(&feed_file) {
        Ok(content) => match Element::parse(&content) {
            Ok(feed) => feed,
            Err(error) => {
                feed_logger.warn(format!("Existing feed is unreadable, rebuilding: {error}"));
                Element::new("interface")
            }
        },
        Err(_) => Element::new("interface"),
    };

    match convert_package(&worker_context, package, &zi_name, &old_feed).await {
        Ok((feed, finished)) => {
            if let Err(error) = write_feed(ctx, &feed_file, &feed).await {
                feed_logger.error(format!("Could not write feed: {error}"));
                ctx.errored.set(true);
                return Ok(false);
            }
            feed_logger.info("Feed written");
            if finished {
                feed_logger.info("Fully updated");
            } else {
                feed_logger.warn("Partially updated, will retry failed parts on next run");
            }
            Ok(finished)
        }
        Err(ConvertError::NoValidRelease) => {
            if feed_file.exists() {
                feed_logger.info("Package has no valid release, removing its feed file");
                if let Err(error) = std::fs::remove_file(&feed_file) {
                    feed_logger.error(format!("Could not remove feed file: {error}"));
                    ctx.errored.set(true);
                    return Ok(false);
                }
            } else {
                feed_logger.info("Package has no valid release, not generating a feed file");
            }
            Ok(true)
        }
        Err(ConvertError::Pypi(PypiError::TimeoutExhausted { strikes })) => {
            feed_logger.error(format!(
                "PyPI timed out {strikes} times in a row. PyPI may be having issues \
                 or may be blocking us. Giving up"
            ));
            Err(WorkerFatal::PypiTimeout)
        }
        Err(error) if error.is_transient() => {
            feed_logger.warn(format!("Will retry on next run: {error}"));
            Ok(false)
        }
        Err(error) => {
            feed_logger.error(format!("Unhandled error occurred: {error}"));
            ctx.errored.set(true);
            Ok(false)
        }
    }
}

/// Write the feed atomically: into a temp file, signed there, then renamed
/// over the previous feed. A crash never exposes a partial or unsigned
/// document.
async fn write_feed(
    ctx: &RunContext,
    feed_file: &std::path::Path,
    feed: &Element,
) -> std::io::Result<()> {
    let file = tempfile::NamedTempFile::new_in(&ctx.feeds_dir)?;
    std::fs::write(file.path(), feed.to_document())?;
    ctx.signer
        .sign(file.path())
        .await
        .map_err(std::io::Error::other)?;
    file.persist(feed_file).map_err(|error| error.error)?;
    Ok(())
}
