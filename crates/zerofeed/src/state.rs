//! Durable state across runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use zerofeed_convert::Package;

/// Everything a run needs to continue where the previous one stopped.
///
/// Invariant: `changed` is a subset of `packages`' keys. The file on disk is
/// replaced atomically, so an interrupted run always leaves a valid snapshot
/// of some prefix of the work performed.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Changelog position consumed so far; `None` on the very first run.
    pub last_serial: Option<i64>,

    /// Names of packages that still need (re)conversion.
    pub changed: BTreeSet<String>,

    /// Every package ever observed.
    pub packages: BTreeMap<String, Package>,
}

impl State {
    /// Load the state file; a missing file is a fresh start.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(std::io::Error::other),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error),
        }
    }

    /// Write the state file atomically (write-temp-then-rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        tracing::info!("Saving state");
        let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut file = match directory {
            Some(directory) => tempfile::NamedTempFile::new_in(directory)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        serde_json::to_writer(&mut file, self).map_err(std::io::Error::other)?;
        file.flush()?;
        file.persist(path).map_err(|error| error.error)?;
        tracing::info!("Saved state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let state = State::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state, State::default());
        assert_eq!(state.last_serial, None);
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = State::default();
        state.last_serial = Some(42);
        state.packages.insert("Foo".into(), Package::new("Foo"));
        state
            .packages
            .get_mut("Foo")
            .unwrap()
            .blacklisted_versions
            .insert("bogus".into());
        state.changed.insert("Foo".into());

        state.save(&path).unwrap();
        let loaded = State::load(&path).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = State::default();
        state.last_serial = Some(1);
        state.save(&path).unwrap();
        state.last_serial = Some(2);
        state.save(&path).unwrap();

        assert_eq!(State::load(&path).unwrap().last_serial, Some(2));
        // Exactly one file: the temp was renamed, not left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(State::load(&path).is_err());
    }
}
