//! Per-package conversion: releases in, one feed document out.

use crate::context::WorkerContext;
use crate::error::{ConvertError, Result};
use crate::general::convert_general;
use crate::package::Package;
use crate::sdist::convert_sdist;
use crate::xml::Element;
use zerofeed_version::Version;

/// Convert one package into its feed.
///
/// Implementations already present in `old_feed` are reused verbatim
/// (artifacts can be deleted upstream, but not changed or re-uploaded).
/// Returns the new feed and whether the package is finished: `false` means
/// a transient error left work for the next run.
///
/// # Errors
///
/// [`ConvertError::NoValidRelease`] when the package converges to a feed
/// without a single implementation; index errors and unclassified failures
/// bubble up to the worker.
pub async fn convert_package(
    ctx: &WorkerContext,
    package: &mut Package,
    zi_name: &str,
    old_feed: &Element,
) -> Result<(Element, bool)> {
    let mut pypi = ctx.pool.pypi()?;

    // Pair every known version string with its parsed form; versions that
    // do not parse are blacklisted permanently.
    let mut versions: Vec<(String, Version)> = Vec::new();
    for version_string in pypi.package_releases(&package.name).await? {
        if package.blacklisted_versions.contains(&version_string) {
            continue;
        }
        match Version::parse(&version_string) {
            Ok(version) => versions.push((version_string, version)),
            Err(error) => {
                ctx.feed_logger
                    .warn(format!("Blacklisting version '{version_string}': {error}"));
                package.blacklisted_versions.insert(version_string);
            }
        }
    }

    // The newest release drives the general metadata.
    let newest = versions
        .iter()
        .max_by(|a, b| a.1.cmp(&b.1))
        .ok_or(ConvertError::NoValidRelease)?;
    let release_data = pypi.release_data(&package.name, &newest.0).await?;
    let mut feed = convert_general(ctx, zi_name, &release_data).await;

    let mut finished = true;
    for (version_string, version) in &versions {
        for release_url in pypi.release_urls(&package.name, version_string).await? {
            if package.blacklisted_distributions.contains(&release_url.url) {
                continue;
            }

            // Distributions can be deleted upstream, but not changed or
            // re-uploaded, so the old feed's implementation is still good.
            if let Some(existing) = old_feed.find_implementation(&release_url.path) {
                ctx.feed_logger.debug(format!(
                    "Reusing implementation of {} from old feed",
                    release_url.filename
                ));
                feed.push(existing.clone());
                continue;
            }

            if release_url.packagetype != "sdist" {
                ctx.feed_logger.warn(format!(
                    "Blacklisting {}: unsupported distribution type '{}'",
                    release_url.url, release_url.packagetype
                ));
                package.blacklisted_distributions.insert(release_url.url);
                continue;
            }

            ctx.feed_logger
                .info(format!("Converting sdist distribution: {}", release_url.filename));
            match convert_sdist(ctx, version, &mut feed, &release_url).await {
                Ok(()) => {}
                Err(error) if error.blacklists_distribution() => {
                    ctx.feed_logger
                        .warn(format!("Blacklisting {}: {error}", release_url.url));
                    package.blacklisted_distributions.insert(release_url.url);
                }
                Err(error) if error.is_transient() => {
                    ctx.feed_logger.warn(format!(
                        "Failed to convert {}, will retry next run: {error}",
                        release_url.url
                    ));
                    finished = false;
                }
                Err(error) => return Err(error),
            }
        }
    }

    let has_implementations = feed.find("implementation").is_some();
    if !has_implementations && finished {
        return Err(ConvertError::NoValidRelease);
    }
    Ok((feed, finished))
}
