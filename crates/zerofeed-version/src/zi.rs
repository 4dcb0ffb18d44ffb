//! The Zero Install version grammar and comparator.
//!
//! A Zero Install version is an alternation of dotted integer lists and
//! (possibly empty) alphabetic modifiers: `DottedList ("-" Modifier?
//! DottedList?)*`. Modifiers order as `pre < rc < "" < post`. Comparison is
//! part-by-part; a version that runs out of parts is padded with the empty
//! modifier, and an absent dotted list sorts before any present one, giving
//! the documented ordering `1.0-pre1 < 1.0 < 1.0-0 < 1.0-post`.
//!
//! [`crate::Version::format_zi`] only ever emits fully numeric segments, but
//! the parser accepts the complete grammar so that feed expressions written
//! by hand compare the same way the target ecosystem compares them.

use crate::error::{Result, VersionError};
use std::cmp::Ordering;

/// One part of a parsed version: dotted lists at even positions, modifier
/// values at odd positions.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Dotted(Vec<u64>),
    Modifier(i8),
}

/// A parsed Zero Install version, ordered the way the injector orders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZiVersion {
    parts: Vec<Part>,
}

impl ZiVersion {
    /// Parse a Zero Install version string.
    pub fn parse(version: &str) -> Result<Self> {
        let invalid = |reason: &str| VersionError::InvalidZiVersion {
            version: version.to_owned(),
            reason: reason.to_owned(),
        };

        let mut parts = Vec::new();
        let mut rest = version;
        loop {
            let end = rest.find('-').unwrap_or(rest.len());
            parts.push(Part::Dotted(
                parse_dotted(&rest[..end]).map_err(|reason| invalid(&reason))?,
            ));
            if end == rest.len() {
                break;
            }
            rest = &rest[end + 1..];

            let alpha_len = rest.chars().take_while(char::is_ascii_lowercase).count();
            parts.push(Part::Modifier(
                modifier_value(&rest[..alpha_len]).ok_or_else(|| invalid("unknown modifier"))?,
            ));
            rest = &rest[alpha_len..];
            // A trailing modifier ends the version ("1-pre").
            if rest.is_empty() {
                break;
            }
        }
        // A trailing empty modifier compares as padding anyway; trim it so
        // structural equality matches comparison equality.
        if parts.last() == Some(&Part::Modifier(0)) {
            parts.pop();
        }
        Ok(Self { parts })
    }

    /// Build a version from fully numeric dash-separated segments, the form
    /// [`crate::Version::format_zi`] emits. Equivalent to parsing the joined
    /// string.
    pub(crate) fn from_segments(segments: Vec<Vec<u64>>) -> Self {
        let mut parts = Vec::with_capacity(segments.len() * 2);
        for (index, segment) in segments.into_iter().enumerate() {
            if index > 0 {
                parts.push(Part::Modifier(0));
            }
            parts.push(Part::Dotted(segment));
        }
        Self { parts }
    }
}

impl Ord for ZiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for index in 0..len {
            let ordering = match (self.parts.get(index), other.parts.get(index)) {
                (Some(Part::Dotted(a)), Some(Part::Dotted(b))) => a.cmp(b),
                (Some(Part::Modifier(a)), Some(Part::Modifier(b))) => a.cmp(b),
                // Pad a missing modifier with the empty modifier.
                (Some(Part::Modifier(a)), None) => a.cmp(&0),
                (None, Some(Part::Modifier(b))) => 0.cmp(b),
                // An absent dotted list sorts before any present one.
                (Some(Part::Dotted(_)), None) => Ordering::Greater,
                (None, Some(Part::Dotted(_))) => Ordering::Less,
                // Parts alternate identically in both versions, so mixed
                // kinds can only pair up through a malformed constructor.
                (Some(Part::Dotted(_)), Some(Part::Modifier(_))) => Ordering::Greater,
                (Some(Part::Modifier(_)), Some(Part::Dotted(_))) => Ordering::Less,
                (None, None) => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for ZiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn parse_dotted(text: &str) -> std::result::Result<Vec<u64>, String> {
    let mut numbers = Vec::new();
    for piece in text.split('.') {
        numbers.push(
            piece
                .parse()
                .map_err(|_| format!("invalid dotted list {text:?}"))?,
        );
    }
    Ok(numbers)
}

fn modifier_value(label: &str) -> Option<i8> {
    match label {
        "pre" => Some(-2),
        "rc" => Some(-1),
        "" => Some(0),
        "post" => Some(1),
        _ => None,
    }
}
