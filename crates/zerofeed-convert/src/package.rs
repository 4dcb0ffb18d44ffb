//! Durable per-package bookkeeping.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A PyPI package and what we have permanently given up on.
///
/// Both blacklists are append-only: entries record decisions that transient
/// retries must never revisit. A package is mutated only by the single
/// worker currently converting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Upstream (PyPI) name, not canonicalized.
    pub name: String,

    /// Release artifact URLs never to try converting again.
    #[serde(default)]
    pub blacklisted_distributions: BTreeSet<String>,

    /// Upstream version strings that failed parsing.
    #[serde(default)]
    pub blacklisted_versions: BTreeSet<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blacklisted_distributions: BTreeSet::new(),
            blacklisted_versions: BTreeSet::new(),
        }
    }
}
