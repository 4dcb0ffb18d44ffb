use thiserror::Error;

/// Errors produced while parsing and converting versions and specifiers.
#[derive(Error, Debug)]
pub enum VersionError {
    /// The input is not a valid public PEP 440 version.
    #[error("got {version:?}, should be valid (public) PEP 440 version")]
    InvalidVersion { version: String },

    /// A Zero Install version string failed to parse.
    #[error("invalid Zero Install version {version:?}: {reason}")]
    InvalidZiVersion { version: String, reason: String },

    /// A specifier set constrains to the empty range: no version can satisfy
    /// it. The caller treats the distribution carrying it as invalid.
    #[error("specifier set constrains to an empty range and can never be satisfied")]
    EmptyRange,

    /// A version has no modifiers to increment.
    #[error("cannot increment last modifier of a version without modifiers")]
    NoModifiers,

    /// An after-version has no Python rendering.
    #[error("cannot format an after-version as a Python version")]
    AfterNotPython,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, VersionError>;
