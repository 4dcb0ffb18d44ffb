//! Feed signing via the external publishing tool.

use std::path::Path;
use zerofeed_pools::PoolError;
use zerofeed_pools::process::run_command;

/// Feed of the publishing tool that carries the signer.
const PUBLISH_FEED: &str = "http://0install.net/2006/interfaces/0publish";

/// An inert but well-formed feed, used to check that signing works at all
/// before any real work is queued.
const STUB_FEED: &str = "<?xml version='1.0'?>
<interface xmlns='http://zero-install.sourceforge.net/2004/injector/interface'>
  <name>dummy</name>
  <summary>dummy</summary>
</interface>
";

/// The external signing command.
#[derive(Clone, Debug)]
pub struct Signer {
    command: Vec<String>,
}

impl Default for Signer {
    fn default() -> Self {
        Self {
            command: vec![
                "0launch".to_owned(),
                PUBLISH_FEED.to_owned(),
                "--xmlsign".to_owned(),
            ],
        }
    }
}

impl Signer {
    /// Use a different signing command line; the feed path is appended.
    pub fn with_command(command: Vec<String>) -> Self {
        Self { command }
    }

    /// Sign a feed file in place.
    pub async fn sign(&self, path: &Path) -> Result<(), PoolError> {
        let path = path.to_string_lossy().into_owned();
        let mut args: Vec<&str> = self.command.iter().skip(1).map(String::as_str).collect();
        args.push(&path);
        run_command(&self.command[0], &args).await
    }

    /// Sign a throwaway stub feed.
    ///
    /// Signing an inert stub succeeds iff signing a real feed would, so a
    /// missing secret key aborts the run before any work is done.
    pub async fn check(&self) -> Result<(), PoolError> {
        let file = tempfile::NamedTempFile::new()
            .map_err(|e| PoolError::io("signing stub", e))?;
        std::fs::write(file.path(), STUB_FEED).map_err(|e| PoolError::io(file.path(), e))?;
        self.sign(file.path()).await
    }
}
