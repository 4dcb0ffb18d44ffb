//! Sandboxed `setup.py egg_info` execution.
//!
//! Most sdists ship their egg-info; the rest have to generate it by running
//! their untrusted `setup.py`. That run is fenced in three ways: a firejail
//! profile (no network, no privileges), a memory+swap limited cgroup the
//! process attaches itself to, and the quota filesystem the distribution
//! already lives on. A hard 10 second wall-clock timeout bounds every
//! attempt.

use crate::error::{ConvertError, Result};
use crate::logging::FeedLogger;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use zerofeed_pools::CombinedPool;

/// Wall-clock limit for one `setup.py egg_info` attempt.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Python interpreters to try, in order.
const PYTHONS: &[&str] = &["python2", "python3"];

const FIREJAIL_SH: &str = include_str!("../resources/setup_py_firejail.sh");
const FIREJAIL_PROFILE: &str = include_str!("../resources/setup_py_firejail.profile");
const SETUP_HELPER: &str = include_str!("../resources/setuptools_setup.py");

/// The sandbox launcher files, materialized once per run.
pub struct Sandbox {
    script: PathBuf,
    profile: PathBuf,
    _dir: TempDir,
}

impl Sandbox {
    /// Write the bundled launcher script and profile to disk.
    pub fn materialize() -> std::io::Result<Self> {
        let dir = TempDir::new()?;
        let script = dir.path().join("setup_py_firejail.sh");
        let profile = dir.path().join("setup_py_firejail.profile");
        std::fs::write(&script, FIREJAIL_SH)?;
        std::fs::write(&profile, FIREJAIL_PROFILE)?;
        Ok(Self {
            script,
            profile,
            _dir: dir,
        })
    }

    /// Generate the egg-info of the distribution at `dist_dir`.
    ///
    /// `dist_dir` must live on a quota filesystem; output and scratch
    /// directories are created as siblings of it. Returns the path of the
    /// generated egg-info directory, valid while the caller holds the quota
    /// lease.
    pub async fn generate_egg_info(
        &self,
        pool: &CombinedPool,
        logger: &FeedLogger,
        dist_dir: &Path,
    ) -> Result<PathBuf> {
        let dist_name = dist_dir
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ConvertError::InvalidDistribution("distribution directory has no name".into())
            })?;
        let parent = dist_dir
            .parent()
            .ok_or_else(|| {
                ConvertError::InvalidDistribution("distribution directory has no parent".into())
            })?;

        // setup.py runs with the output and scratch directories as siblings,
        // so nothing it produces ends up inside the distribution tree.
        let output_dir = parent.join(format!("{dist_name}.out"));
        let scratch_dir = parent.join(format!("{dist_name}.tmp"));
        tokio::fs::create_dir(&output_dir).await?;
        tokio::fs::create_dir(&scratch_dir).await?;

        // The helper setup.py is written into the distribution directory so
        // relative imports inside the real setup.py keep working.
        let setup_file = tempfile::Builder::new()
            .prefix(".egg-info-")
            .suffix(".py")
            .tempfile_in(dist_dir)?;
        std::fs::write(setup_file.path(), SETUP_HELPER)?;

        for python in PYTHONS {
            logger.debug(format!("Generating egg-info with {python}"));
            let cgroups = pool.cgroups().await?;
            let outcome = self
                .run_sandboxed(dist_dir, setup_file.path(), python, cgroups.cgroup())
                .await;
            // Kills whatever the sandboxed process left behind.
            cgroups.release().await;
            outcome?;

            if let Some(egg_info) = valid_egg_info(&output_dir).await {
                return Ok(egg_info);
            }
            // Leftovers of a failed attempt would make the next one
            // ambiguous.
            clear_directory(&output_dir).await?;
        }
        Err(ConvertError::InvalidDistribution(
            "no valid *.egg-info directory and setup.py egg_info failed or timed out".into(),
        ))
    }

    async fn run_sandboxed(
        &self,
        dist_dir: &Path,
        setup_file: &Path,
        python: &str,
        cgroup: &zerofeed_pools::Cgroup,
    ) -> Result<()> {
        let mut command = Command::new("sh");
        command
            .arg(&self.script)
            .arg(dist_dir)
            .arg(&self.profile)
            .arg(python)
            .arg(setup_file)
            .args(cgroup.tasks_files())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        match tokio::time::timeout(TIMEOUT, child.wait()).await {
            Ok(status) => {
                // Exit status is advisory only: what counts is whether a
                // valid egg-info appeared in the output directory.
                let _ = status?;
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        Ok(())
    }
}

async fn clear_directory(directory: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
        } else {
            tokio::fs::remove_file(&path).await?;
        }
    }
    Ok(())
}

/// The single egg-info directory below `output_dir`, if it is validly
/// shaped (contains `PKG-INFO`).
async fn valid_egg_info(output_dir: &Path) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(output_dir).await.ok()?;
    let first = entries.next_entry().await.ok()??;
    if entries.next_entry().await.ok()?.is_some() {
        return None;
    }
    let path = first.path();
    if path.join("PKG-INFO").exists() {
        Some(path)
    } else {
        None
    }
}

/// Find an existing, validly shaped `*.egg-info` in a distribution
/// directory: exactly one, containing `PKG-INFO`.
pub(crate) fn find_existing_egg_info(dist_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dist_dir).ok()?;
    let mut egg_infos = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".egg-info") && entry.path().is_dir() {
            egg_infos.push(entry.path());
        }
    }
    match egg_infos.as_slice() {
        [single] if single.join("PKG-INFO").exists() => Some(single.clone()),
        _ => None,
    }
}
