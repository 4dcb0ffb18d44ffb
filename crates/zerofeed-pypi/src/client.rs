//! The PyPI XML-RPC client.

use crate::error::{PypiError, Result};
use crate::types::{ChangelogEntry, ReleaseData, ReleaseUrl};
use crate::xmlrpc::{self, Value};
use std::time::Duration;

/// How long to back off after a timeout fault before retrying.
const TIMEOUT_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// How many consecutive timeout faults to tolerate before giving up.
const MAX_TIMEOUT_STRIKES: u32 = 5;

/// One handle onto the index's XML-RPC interface.
///
/// Handles are pooled and leased to one worker at a time; the timeout strike
/// counter is per handle, which makes it per worker.
pub struct PypiClient {
    http: reqwest::Client,
    uri: String,
    backoff: Duration,
    strikes: u32,
}

impl PypiClient {
    pub fn new(http: reqwest::Client, uri: impl Into<String>) -> Self {
        Self {
            http,
            uri: uri.into(),
            backoff: TIMEOUT_BACKOFF,
            strikes: 0,
        }
    }

    /// Override the timeout back-off, for tests.
    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Serial of the most recent changelog event.
    pub async fn changelog_last_serial(&mut self) -> Result<i64> {
        let value = self.call("changelog_last_serial", vec![]).await?;
        value
            .as_i64()
            .ok_or_else(|| unexpected("changelog_last_serial is not an integer"))
    }

    /// Names of all packages known to the index.
    pub async fn list_packages(&mut self) -> Result<Vec<String>> {
        let value = self.call("list_packages", vec![]).await?;
        string_array(&value, "list_packages")
    }

    /// Changelog events strictly after `serial`.
    pub async fn changelog_since_serial(&mut self, serial: i64) -> Result<Vec<ChangelogEntry>> {
        let value = self
            .call("changelog_since_serial", vec![Value::Int(serial)])
            .await?;
        value
            .as_array()
            .ok_or_else(|| unexpected("changelog_since_serial is not an array"))?
            .iter()
            .map(ChangelogEntry::from_value)
            .collect()
    }

    /// All release versions of a package, hidden ones included.
    pub async fn package_releases(&mut self, name: &str) -> Result<Vec<String>> {
        let value = self
            .call(
                "package_releases",
                vec![Value::Str(name.to_owned()), Value::Bool(true)],
            )
            .await?;
        string_array(&value, "package_releases")
    }

    /// Metadata of one release.
    pub async fn release_data(&mut self, name: &str, version: &str) -> Result<ReleaseData> {
        let value = self
            .call(
                "release_data",
                vec![Value::Str(name.to_owned()), Value::Str(version.to_owned())],
            )
            .await?;
        ReleaseData::from_value(&value)
    }

    /// Artifacts of one release.
    pub async fn release_urls(&mut self, name: &str, version: &str) -> Result<Vec<ReleaseUrl>> {
        let value = self
            .call(
                "release_urls",
                vec![Value::Str(name.to_owned()), Value::Str(version.to_owned())],
            )
            .await?;
        value
            .as_array()
            .ok_or_else(|| unexpected("release_urls is not an array"))?
            .iter()
            .map(ReleaseUrl::from_value)
            .collect()
    }

    /// Perform one call, backing off on timeout faults.
    ///
    /// The index intermittently reports "timeout talking to the database"
    /// style faults when overloaded. Those are retried after a long pause;
    /// more than [`MAX_TIMEOUT_STRIKES`] in a row means PyPI is having
    /// issues or is blocking us, and the whole run gives up.
    async fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value> {
        loop {
            match self.call_once(method, &params).await {
                Err(PypiError::Fault { code, message })
                    if message.to_lowercase().contains("timeout") =>
                {
                    self.strikes += 1;
                    if self.strikes > MAX_TIMEOUT_STRIKES {
                        return Err(PypiError::TimeoutExhausted {
                            strikes: self.strikes,
                        });
                    }
                    tracing::warn!(
                        method,
                        code,
                        strikes = self.strikes,
                        "PyPI timed out, backing off for {}s",
                        self.backoff.as_secs()
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                result => {
                    if result.is_ok() {
                        self.strikes = 0;
                    }
                    return result;
                }
            }
        }
    }

    async fn call_once(&self, method: &str, params: &[Value]) -> Result<Value> {
        tracing::debug!(method, "calling PyPI");
        let body = xmlrpc::format_method_call(method, params);
        let response = self
            .http
            .post(&self.uri)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        xmlrpc::parse_method_response(&text)
    }
}

fn unexpected(message: &str) -> PypiError {
    PypiError::UnexpectedResponse(message.to_owned())
}

fn string_array(value: &Value, what: &str) -> Result<Vec<String>> {
    value
        .as_array()
        .ok_or_else(|| unexpected(&format!("{what} is not an array")))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_owned)
                .ok_or_else(|| unexpected(&format!("{what} item is not a string")))
        })
        .collect()
}
