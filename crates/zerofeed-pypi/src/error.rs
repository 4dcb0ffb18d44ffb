use thiserror::Error;

/// Errors from the PyPI XML-RPC surface.
#[derive(Error, Debug)]
pub enum PypiError {
    /// The HTTP request itself failed. Transient; the affected package is
    /// retried on the next run.
    #[error("PyPI request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The index answered with an XML-RPC fault.
    #[error("PyPI fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The index kept answering timeout faults; the run gives up.
    #[error("PyPI timed out {strikes} times in a row")]
    TimeoutExhausted { strikes: u32 },

    /// The response was not the XML-RPC shape we expected.
    #[error("unexpected PyPI response: {0}")]
    UnexpectedResponse(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PypiError>;
