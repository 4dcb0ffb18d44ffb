//! Convert one source distribution into an `<implementation>`.

use crate::context::WorkerContext;
use crate::dependencies::convert_dependencies;
use crate::digest::{self, DigestError};
use crate::error::{ConvertError, Result};
use crate::extract::{ExtractError, extract_archive};
use crate::languages::language_code;
use crate::metadata::read_pkg_info;
use crate::sandbox::find_existing_egg_info;
use crate::xml::Element;
use md5::{Digest, Md5};
use std::io::Write;
use std::path::{Path, PathBuf};
use zerofeed_pypi::ReleaseUrl;
use zerofeed_version::Version;

/// Largest artifact we are willing to download.
const MAX_SDIST_BYTES: u64 = 50 * 1024 * 1024;

/// Quota filesystems with less than this much space left count as full,
/// which classifies an extraction failure as an oversized distribution.
const FULL_THRESHOLD_BYTES: u64 = 5 * 1024 * 1024;

/// Convert the sdist at `release_url` and append its `<implementation>` to
/// `feed`. `version` is the parsed Python version of the release the
/// artifact belongs to.
pub async fn convert_sdist(
    ctx: &WorkerContext,
    version: &Version,
    feed: &mut Element,
    release_url: &ReleaseUrl,
) -> Result<()> {
    if release_url.size > MAX_SDIST_BYTES {
        return Err(ConvertError::UnsupportedDistribution(format!(
            "sdist is {} bytes, larger than the {} MB limit",
            release_url.size,
            MAX_SDIST_BYTES / (1024 * 1024)
        )));
    }

    let archive = download(ctx, release_url).await?;

    // Unpack into a leased quota directory.
    let quota = ctx.pool.quota_directory().await?;
    let unpack_dir = quota.work_dir().to_path_buf();
    ctx.feed_logger.debug("Unpacking");
    let outcome = {
        let archive_path = archive.path().to_path_buf();
        let filename = release_url.filename.clone();
        let destination = unpack_dir.clone();
        tokio::task::spawn_blocking(move || {
            extract_archive(&archive_path, &filename, &destination)
        })
        .await
        .map_err(|e| ConvertError::Io(std::io::Error::other(e)))?
    };
    match outcome {
        Ok(()) => {}
        Err(ExtractError::UnknownFormat) => {
            return Err(ConvertError::InvalidDistribution(
                "invalid archive or unknown archive format".into(),
            ));
        }
        Err(ExtractError::Failed(reason)) => {
            // Discern between quota exhausted and a broken archive.
            let free = quota.free_bytes().unwrap_or(u64::MAX);
            if free < FULL_THRESHOLD_BYTES {
                let total_mb = quota.total_bytes().unwrap_or(0) / (1024 * 1024);
                return Err(ConvertError::UnsupportedDistribution(format!(
                    "unpacked distribution exceeds disk quota of {total_mb}MB"
                )));
            }
            return Err(ConvertError::InvalidDistribution(format!(
                "cannot unpack distribution: {reason}"
            )));
        }
    }

    let dist_dir = find_distribution_directory(&unpack_dir)?;
    ctx.feed_logger.debug("Generating <implementation>");

    // Digest the pristine tree before egg-info generation can place its
    // scratch directories next to the distribution.
    let manifest_digest = {
        let tree = unpack_dir.clone();
        tokio::task::spawn_blocking(move || digest::digest_of(&tree))
            .await
            .map_err(|e| ConvertError::Io(std::io::Error::other(e)))?
            .map_err(classify_digest_error)?
    };

    // Get egg-info and convert dependencies to requirements.
    let egg_info = match find_existing_egg_info(&dist_dir) {
        Some(egg_info) => egg_info,
        None => {
            ctx.sandbox
                .generate_egg_info(&ctx.pool, &ctx.feed_logger, &dist_dir)
                .await?
        }
    };
    let pkg_info = read_pkg_info(&egg_info)?;
    let requirements = convert_dependencies(ctx, &egg_info)?;

    let released = release_url
        .upload_time
        .ok_or_else(|| {
            ConvertError::InvalidDistribution("release artifact has no upload time".into())
        })?
        .format("%Y-%m-%d")
        .to_string();

    let langs = pkg_info
        .classifiers
        .iter()
        .filter_map(|classifier| language_code(classifier))
        .collect::<Vec<_>>()
        .join(" ");
    let license = pkg_info
        .classifiers
        .iter()
        .filter(|classifier| classifier.starts_with("License ::"))
        .min()
        .cloned();

    // The same attributes, with and without the id, for the outer
    // implementation and the nested compile one.
    let attrs = |element: Element| {
        let mut element = element
            .attr("arch", "*-src")
            .attr("version", version.format_zi())
            .attr("released", &released)
            .attr("stability", stability(version))
            .attr("langs", &langs);
        if let Some(license) = &license {
            element.set_attr("license", license);
        }
        element
    };

    let mut compile_implementation = attrs(Element::new("compile:implementation"))
        .child(
            Element::new("environment")
                .attr("name", "PYTHONPATH")
                .attr("insert", "$DISTDIR/lib"),
        )
        .child(
            Element::new("environment")
                .attr("name", "PATH")
                .attr("insert", "$DISTDIR/scripts"),
        )
        .child(
            Element::new("environment")
                .attr("name", "PYTHONDONTWRITEBYTECODE")
                .attr("value", "true")
                .attr("mode", "replace"),
        );
    for requires in &requirements {
        compile_implementation.push(requires.clone());
    }

    let mut implementation = attrs(Element::new("implementation").attr("id", &release_url.path))
        .child(Element::new("manifest-digest").attr("sha256new", manifest_digest))
        .child(
            Element::new("archive")
                .attr("href", &release_url.url)
                .attr("size", release_url.size.to_string()),
        )
        .child(
            Element::new("command")
                .attr("name", "compile")
                .child(
                    Element::new("runner")
                        .attr("interface", ctx.script_uri("convert_sdist")),
                )
                .child(compile_implementation),
        );
    for requires in requirements {
        implementation.push(requires);
    }

    feed.push(implementation);
    Ok(())
}

/// Stability of a release artifact, derived from its version: `developer`
/// for dev releases, `testing` for pre-releases, `stable` otherwise.
pub(crate) fn stability(version: &Version) -> &'static str {
    if version.is_dev() {
        "developer"
    } else if version.is_prerelease() {
        "testing"
    } else {
        "stable"
    }
}

/// Download the artifact, from the mirror when configured, verifying the
/// advertised MD5 digest.
async fn download(ctx: &WorkerContext, release_url: &ReleaseUrl) -> Result<tempfile::NamedTempFile> {
    let url = match &ctx.pypi_mirror {
        Some(mirror) => format!("{mirror}packages/{}", release_url.path),
        None => release_url.url.clone(),
    };
    ctx.feed_logger.debug(format!("Downloading {url}"));

    let download_failed =
        |error: reqwest::Error| ConvertError::InvalidDownload(format!("download failed: {error}"));
    let mut response = ctx
        .http
        .get(&url)
        .send()
        .await
        .map_err(download_failed)?
        .error_for_status()
        .map_err(download_failed)?;

    let mut file = tempfile::NamedTempFile::new()?;
    let mut hasher = Md5::new();
    while let Some(chunk) = response.chunk().await.map_err(download_failed)? {
        hasher.update(&chunk);
        file.write_all(&chunk)?;
    }
    file.flush()?;

    if let Some(expected) = &release_url.md5_digest {
        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ConvertError::InvalidDownload(format!(
                "MD5 digest differs. Got '{actual}', expected '{expected}'"
            )));
        }
    }
    Ok(file)
}

/// The single top-level directory of the unpacked tree, which must contain
/// `setup.py`.
fn find_distribution_directory(unpack_dir: &Path) -> Result<PathBuf> {
    let mut children: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(unpack_dir)? {
        children.push(entry?.path());
    }
    match children.as_slice() {
        [single] => match single.join("setup.py").try_exists() {
            Ok(true) => Ok(single.clone()),
            Ok(false) => Err(ConvertError::InvalidDistribution(
                "could not find setup.py".into(),
            )),
            Err(_) => Err(ConvertError::InvalidDistribution(
                "no read permission on setup.py".into(),
            )),
        },
        [] => Err(ConvertError::InvalidDistribution("sdist is empty".into())),
        _ => Err(ConvertError::InvalidDistribution(
            "sdist is a tar bomb".into(),
        )),
    }
}

fn classify_digest_error(error: DigestError) -> ConvertError {
    match error {
        DigestError::Unsupported(reason) => ConvertError::UnsupportedDistribution(format!(
            "distribution triggers error in the digest algorithm: {reason}"
        )),
        DigestError::Io(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
            ConvertError::InvalidDistribution(
                "distribution contains files/directories without read permission".into(),
            )
        }
        DigestError::Io(error) => ConvertError::InvalidDistribution(format!(
            "cannot digest distribution: {error}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::FeedLogger;
    use crate::sandbox::Sandbox;
    use chrono::NaiveDate;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::rc::Rc;
    use zerofeed_pools::CombinedPool;
    use zerofeed_pypi::PypiClient;

    fn context(dir: &tempfile::TempDir) -> WorkerContext {
        let cgroup_root = dir.path().join("cgroups");
        for subsystem in ["memory", "blkio"] {
            std::fs::create_dir_all(cgroup_root.join(subsystem).join("zerofeed")).unwrap();
        }
        WorkerContext {
            base_uri: "https://example.org/zf".into(),
            pypi_mirror: None,
            feed_logger: FeedLogger::open("foo", &dir.path().join("foo.log")).unwrap(),
            pool: Rc::new(CombinedPool::unprivileged(cgroup_root, || {
                PypiClient::new(reqwest::Client::new(), "http://localhost/pypi")
            })),
            sandbox: Rc::new(Sandbox::materialize().unwrap()),
            http: reqwest::Client::new(),
        }
    }

    /// A tar.gz sdist with the given entries.
    fn sdist_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let encoder = GzEncoder::new(&mut out, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            for (name, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, name, content.as_bytes())
                    .unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }
        out
    }

    fn release_url(server: &mockito::ServerGuard, body: &[u8]) -> ReleaseUrl {
        ReleaseUrl {
            url: format!("{}/packages/so/me/foo-1.tar.gz", server.url()),
            path: "so/me/foo-1.tar.gz".into(),
            filename: "foo-1.tar.gz".into(),
            packagetype: "sdist".into(),
            size: body.len() as u64,
            md5_digest: Some(hex::encode(Md5::digest(body))),
            upload_time: Some(
                NaiveDate::from_ymd_opt(2000, 2, 3)
                    .unwrap()
                    .and_hms_opt(12, 30, 30)
                    .unwrap(),
            ),
        }
    }

    async fn serve(server: &mut mockito::ServerGuard, body: &[u8]) {
        server
            .mock("GET", "/packages/so/me/foo-1.tar.gz")
            .with_body(body)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn converts_a_single_release_sdist() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut server = mockito::Server::new_async().await;
        let body = sdist_bytes(&[
            ("foo-1/setup.py", "from setuptools import setup\nsetup()\n"),
            (
                "foo-1/foo.egg-info/PKG-INFO",
                "Metadata-Version: 1.1\nName: foo\nVersion: 1\n\
                 Classifier: License :: OSI Approved :: MIT License\n\
                 Classifier: Natural Language :: English\n",
            ),
        ]);
        serve(&mut server, &body).await;

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        convert_sdist(&ctx, &version, &mut feed, &release_url(&server, &body))
            .await
            .unwrap();

        let implementation = feed.find("implementation").unwrap();
        assert_eq!(implementation.get_attr("id"), Some("so/me/foo-1.tar.gz"));
        assert_eq!(implementation.get_attr("arch"), Some("*-src"));
        assert_eq!(implementation.get_attr("version"), Some("0-1-4"));
        assert_eq!(implementation.get_attr("released"), Some("2000-02-03"));
        assert_eq!(implementation.get_attr("stability"), Some("stable"));
        assert_eq!(implementation.get_attr("langs"), Some("en"));
        assert_eq!(
            implementation.get_attr("license"),
            Some("License :: OSI Approved :: MIT License")
        );

        let digest = implementation.find("manifest-digest").unwrap();
        assert!(!digest.get_attr("sha256new").unwrap().is_empty());
        let archive = implementation.find("archive").unwrap();
        assert_eq!(archive.get_attr("size"), Some(body.len().to_string().as_str()));

        let command = implementation.find("command").unwrap();
        assert_eq!(command.get_attr("name"), Some("compile"));
        let runner = command.find("runner").unwrap();
        assert_eq!(
            runner.get_attr("interface"),
            Some("https://example.org/zf/zerofeed/convert_sdist.xml")
        );
        let nested = command.find("compile:implementation").unwrap();
        assert_eq!(nested.get_attr("id"), None);
        assert_eq!(nested.get_attr("version"), Some("0-1-4"));
        assert_eq!(nested.child_elements().filter(|e| e.tag == "environment").count(), 3);
    }

    #[tokio::test]
    async fn requirements_appear_twice() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut server = mockito::Server::new_async().await;
        let body = sdist_bytes(&[
            ("dependent-1/setup.py", "from setuptools import setup\nsetup()\n"),
            (
                "dependent-1/dependent.egg-info/PKG-INFO",
                "Name: Dependent\nVersion: 1\n",
            ),
            ("dependent-1/dependent.egg-info/requires.txt", "Dependency\n"),
        ]);
        serve(&mut server, &body).await;

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        convert_sdist(&ctx, &version, &mut feed, &release_url(&server, &body))
            .await
            .unwrap();

        let implementation = feed.find("implementation").unwrap();
        let requires = implementation.find("requires").unwrap();
        assert_eq!(
            requires.get_attr("interface"),
            Some("https://example.org/zf/feeds/dependency.xml")
        );
        assert_eq!(requires.get_attr("importance"), Some("essential"));

        // The compile subtree carries its own copy.
        let nested_requires = implementation
            .find("command")
            .unwrap()
            .find("compile:implementation")
            .unwrap()
            .find("requires")
            .unwrap();
        assert_eq!(nested_requires, requires);
    }

    #[tokio::test]
    async fn oversized_artifact_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let server = mockito::Server::new_async().await;
        let mut url = release_url(&server, b"");
        url.size = 60 * 1024 * 1024;

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        let error = convert_sdist(&ctx, &version, &mut feed, &url).await.unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedDistribution(_)));
    }

    #[tokio::test]
    async fn md5_mismatch_is_invalid_download() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut server = mockito::Server::new_async().await;
        let body = sdist_bytes(&[("foo-1/setup.py", "setup()\n")]);
        serve(&mut server, &body).await;
        let mut url = release_url(&server, &body);
        url.md5_digest = Some("0".repeat(32));

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        let error = convert_sdist(&ctx, &version, &mut feed, &url).await.unwrap_err();
        assert!(matches!(error, ConvertError::InvalidDownload(_)));
    }

    #[tokio::test]
    async fn tar_bomb_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut server = mockito::Server::new_async().await;
        let body = sdist_bytes(&[("a/setup.py", "x"), ("b/setup.py", "y")]);
        serve(&mut server, &body).await;

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        let error = convert_sdist(
            &ctx,
            &version,
            &mut feed,
            &release_url(&server, &body),
        )
        .await
        .unwrap_err();
        match error {
            ConvertError::InvalidDistribution(reason) => {
                assert_eq!(reason, "sdist is a tar bomb");
            }
            other => panic!("expected InvalidDistribution, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_archive_format_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let mut server = mockito::Server::new_async().await;
        let body = b"not an archive".to_vec();
        server
            .mock("GET", "/packages/so/me/foo-1.rar")
            .with_body(&body)
            .create_async()
            .await;
        let mut url = release_url(&server, &body);
        url.url = format!("{}/packages/so/me/foo-1.rar", server.url());
        url.path = "so/me/foo-1.rar".into();
        url.filename = "foo-1.rar".into();

        let version = Version::parse("1").unwrap();
        let mut feed = Element::new("interface");
        let error = convert_sdist(&ctx, &version, &mut feed, &url).await.unwrap_err();
        assert!(matches!(error, ConvertError::InvalidDistribution(_)));
    }

    #[test]
    fn stability_table() {
        let stability_of = |text: &str| stability(&Version::parse(text).unwrap());
        assert_eq!(stability_of("1"), "stable");
        assert_eq!(stability_of("1.dev1"), "developer");
        assert_eq!(stability_of("1a1"), "testing");
        assert_eq!(stability_of("1rc1.dev1"), "developer");
        // Only the modifiers decide: a bare post release is stable.
        assert_eq!(stability_of("1.post1"), "stable");
    }
}
