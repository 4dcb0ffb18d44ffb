use thiserror::Error;
use zerofeed_pools::PoolError;
use zerofeed_pypi::PypiError;

/// Errors of the conversion engine.
///
/// The first four variants carry the per-release and per-package policy:
/// invalid and unsupported distributions are blacklisted permanently,
/// invalid downloads are retried on the next run, and a package without a
/// single valid release has its feed removed. Everything else is either
/// transient index trouble or a bug surfacing.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The package has not a single valid release.
    #[error("package has no valid release")]
    NoValidRelease,

    /// Broken beyond repair; never retried.
    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    /// Valid but outside what we convert (wrong type, too large, ...);
    /// never retried.
    #[error("unsupported distribution: {0}")]
    UnsupportedDistribution(String),

    /// The downloaded artifact was wrong or did not arrive; retried on the
    /// next run.
    #[error("invalid download: {0}")]
    InvalidDownload(String),

    #[error(transparent)]
    Pypi(#[from] PypiError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),
}

impl ConvertError {
    /// Whether this error permanently blacklists the release artifact.
    pub fn blacklists_distribution(&self) -> bool {
        matches!(
            self,
            Self::InvalidDistribution(_) | Self::UnsupportedDistribution(_)
        )
    }

    /// Whether this error is transient: the artifact is left alone and the
    /// package is retried on the next run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::InvalidDownload(_) | Self::Pypi(PypiError::Transport(_))
        )
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ConvertError>;
