//! Client for the PyPI XML-RPC interface.
//!
//! The index exposes the incremental-synchronization surface zerofeed
//! consumes: a monotonic changelog serial, the full package list, changelog
//! deltas, and per-package release metadata. See
//! <https://warehouse.pypa.io/api-reference/xml-rpc.html> for the method
//! surface.
//!
//! The index intermittently answers with faults complaining about timeouts;
//! [`PypiClient`] backs those off per client and gives up after a bounded
//! number of consecutive strikes, which aborts the whole run.

pub mod client;
pub mod error;
pub mod types;
pub mod xmlrpc;

pub use client::PypiClient;
pub use error::{PypiError, Result};
pub use types::{ChangelogEntry, ReleaseData, ReleaseUrl};
pub use xmlrpc::Value;

/// Normalize a PyPI package name to its canonical feed name: lowercase,
/// with every run of `-`, `_` and `.` collapsed to a single `-`.
pub fn canonical_name(pypi_name: &str) -> String {
    let mut out = String::with_capacity(pypi_name.len());
    let mut in_separator = false;
    for ch in pypi_name.chars() {
        if matches!(ch, '-' | '_' | '.') {
            in_separator = true;
        } else {
            if in_separator {
                out.push('-');
                in_separator = false;
            }
            out.extend(ch.to_lowercase());
        }
    }
    if in_separator {
        out.push('-');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_lowercases_and_collapses() {
        assert_eq!(canonical_name("Flask"), "flask");
        assert_eq!(canonical_name("django_rest_framework"), "django-rest-framework");
        assert_eq!(canonical_name("Pillow.Image"), "pillow-image");
        assert_eq!(canonical_name("my__package"), "my-package");
        assert_eq!(canonical_name("a-_.b"), "a-b");
    }

    #[test]
    fn canonical_name_is_idempotent() {
        for name in ["Flask", "zope.interface", "A_-_B", "chicken_turtle_util"] {
            let once = canonical_name(name);
            assert_eq!(canonical_name(&once), once);
        }
    }
}
