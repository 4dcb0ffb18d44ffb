//! Typed views of the XML-RPC structures the index returns.

use crate::error::{PypiError, Result};
use crate::xmlrpc::Value;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// One changelog event `(name, version, timestamp, action, serial)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub name: String,
    pub version: Option<String>,
    pub timestamp: i64,
    pub action: String,
    pub serial: i64,
}

impl ChangelogEntry {
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| unexpected("changelog entry is not an array"))?;
        if items.len() < 5 {
            return Err(unexpected("changelog entry has fewer than five items"));
        }
        Ok(Self {
            name: required_str(&items[0], "changelog name")?,
            version: optional_str(&items[1]),
            timestamp: items[2]
                .as_i64()
                .ok_or_else(|| unexpected("changelog timestamp is not an integer"))?,
            action: required_str(&items[3], "changelog action")?,
            serial: items[4]
                .as_i64()
                .ok_or_else(|| unexpected("changelog serial is not an integer"))?,
        })
    }
}

/// Metadata of one release, as returned by `release_data`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseData {
    pub name: String,
    pub version: String,
    pub summary: Option<String>,
    pub home_page: Option<String>,
    pub description: Option<String>,
    pub classifiers: Vec<String>,
}

impl ReleaseData {
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let members = value
            .as_struct()
            .ok_or_else(|| unexpected("release data is not a struct"))?;
        Ok(Self {
            name: member_str(members, "name").unwrap_or_default(),
            version: member_str(members, "version").unwrap_or_default(),
            summary: member_str(members, "summary"),
            home_page: member_str(members, "home_page"),
            description: member_str(members, "description"),
            classifiers: members
                .get("classifiers")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(optional_str).collect())
                .unwrap_or_default(),
        })
    }
}

/// One release artifact, as returned by `release_urls`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseUrl {
    pub url: String,
    /// Path of the artifact below the index's `packages/` tree; doubles as
    /// the implementation id in feeds.
    pub path: String,
    pub filename: String,
    pub packagetype: String,
    pub size: u64,
    pub md5_digest: Option<String>,
    pub upload_time: Option<NaiveDateTime>,
}

impl ReleaseUrl {
    pub(crate) fn from_value(value: &Value) -> Result<Self> {
        let members = value
            .as_struct()
            .ok_or_else(|| unexpected("release url is not a struct"))?;
        let url =
            member_str(members, "url").ok_or_else(|| unexpected("release url without url"))?;
        // Older index entries carry no explicit path; it is the part of the
        // URL below packages/.
        let path = member_str(members, "path")
            .or_else(|| {
                url.split_once("/packages/")
                    .map(|(_, path)| path.to_owned())
            })
            .ok_or_else(|| unexpected("release url without path"))?;
        let filename = member_str(members, "filename")
            .or_else(|| path.rsplit('/').next().map(str::to_owned))
            .unwrap_or_default();
        Ok(Self {
            url,
            path,
            filename,
            packagetype: member_str(members, "packagetype").unwrap_or_default(),
            size: members
                .get("size")
                .and_then(Value::as_i64)
                .map(|size| u64::try_from(size).unwrap_or(0))
                .unwrap_or(0),
            md5_digest: member_str(members, "md5_digest"),
            upload_time: match members.get("upload_time") {
                Some(Value::DateTime(at)) => Some(*at),
                _ => None,
            },
        })
    }
}

fn unexpected(message: &str) -> PypiError {
    PypiError::UnexpectedResponse(message.to_owned())
}

fn member_str(members: &BTreeMap<String, Value>, name: &str) -> Option<String> {
    members.get(name).and_then(optional_str)
}

fn optional_str(value: &Value) -> Option<String> {
    match value {
        Value::Str(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn required_str(value: &Value, what: &str) -> Result<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| unexpected(&format!("{what} is not a string")))
}
