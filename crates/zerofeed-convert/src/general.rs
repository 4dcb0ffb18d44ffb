//! General (per-package) feed metadata.

use crate::context::WorkerContext;
use crate::xml::{Element, XMLNS, XMLNS_COMPILE};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use zerofeed_pypi::ReleaseData;

/// Summary used when the upstream metadata has none; the element is
/// mandatory in a feed.
const SUMMARY_PLACEHOLDER: &str = "Python package converted from PyPI";

/// Feeds must work with injectors from this version on.
const MIN_INJECTOR_VERSION: &str = "0.48";

/// Wall-clock limit for the reStructuredText conversion.
const RST_TIMEOUT: Duration = Duration::from_secs(1);

/// Build the feed root with the general metadata of the newest release.
pub async fn convert_general(
    ctx: &WorkerContext,
    zi_name: &str,
    release_data: &ReleaseData,
) -> Element {
    let mut interface = Element::new("interface")
        .attr("xmlns", XMLNS)
        .attr("xmlns:compile", XMLNS_COMPILE)
        .attr("uri", ctx.feed_uri(zi_name))
        .attr("min-injector-version", MIN_INJECTOR_VERSION);

    interface.push(Element::new("name").text(zi_name));

    let summary = release_data
        .summary
        .as_deref()
        .filter(|summary| !summary.trim().is_empty())
        .unwrap_or(SUMMARY_PLACEHOLDER);
    interface.push(Element::new("summary").text(summary));

    if let Some(homepage) = &release_data.home_page {
        interface.push(Element::new("homepage").text(homepage));
    }

    if let Some(description) = &release_data.description {
        let plain = rst_to_plain(description).await;
        interface.push(Element::new("description").text(plain));
    }

    if release_data
        .classifiers
        .iter()
        .any(|classifier| classifier == "Environment :: Console")
    {
        interface.push(Element::new("needs-terminal"));
    }

    interface
}

/// Convert reStructuredText to plain text with the external converter.
///
/// Descriptions are arbitrary user input and the converter occasionally
/// hangs on them, hence the timeout; on any failure the raw text is kept.
async fn rst_to_plain(text: &str) -> String {
    match try_rst_to_plain(text).await {
        Some(plain) => plain,
        None => {
            tracing::debug!("rst conversion failed, keeping raw description");
            text.to_owned()
        }
    }
}

async fn try_rst_to_plain(text: &str) -> Option<String> {
    let mut child = Command::new("pandoc")
        .args(["--from", "rst", "--to", "plain"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let mut stdin = child.stdin.take()?;
    let input = text.as_bytes().to_vec();
    let write = async move {
        stdin.write_all(&input).await.ok()?;
        stdin.shutdown().await.ok()?;
        drop(stdin);
        Some(())
    };

    let output = tokio::time::timeout(RST_TIMEOUT, async {
        write.await?;
        child.wait_with_output().await.ok()
    })
    .await
    .ok()??;

    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}
