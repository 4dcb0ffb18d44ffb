//! PEP 440 version model.
//!
//! Versions are parsed with the grammar published at the bottom of PEP 440
//! (the same regex `packaging` uses), normalized (`alpha` -> `a`,
//! `preview` -> `rc`, implicit numbers -> 0, ...) and rendered as Zero
//! Install versions of the shape `epoch-release-modifiers[-after]`.
//!
//! The rendering is designed so that the Zero Install comparator applied to
//! the rendered strings agrees with the Python ordering of the originals.
//! Each modifier renders as `priority.number` with priorities dev=0, a=1,
//! b=2, rc=3, post=5; a bare `4` (the priority of "no modifier") terminates
//! the modifier list whenever fewer than three modifiers exist, so that
//! `1 < 1.post1` and `1.dev1 < 1` fall out of plain segment comparison.

use crate::error::{Result, VersionError};
use crate::zi::ZiVersion;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The version grammar from the bottom of PEP 440, anchored, with named
/// groups for each component. Case-insensitive; release labels may use any
/// of the spellings PEP 440 normalizes away.
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?xi)
^\s*v?
(?:
    (?:(?P<epoch>[0-9]+)!)?                           # epoch
    (?P<release>[0-9]+(?:\.[0-9]+)*)                  # release segment
    (?P<pre>                                          # pre-release
        [-_\.]?
        (?P<pre_l>a|b|c|rc|alpha|beta|pre|preview)
        [-_\.]?
        (?P<pre_n>[0-9]+)?
    )?
    (?P<post>                                         # post release
        (?:-(?P<post_n1>[0-9]+))
        |
        (?:
            [-_\.]?
            (?P<post_l>post|rev|r)
            [-_\.]?
            (?P<post_n2>[0-9]+)?
        )
    )?
    (?P<dev>                                          # dev release
        [-_\.]?
        (?P<dev_l>dev)
        [-_\.]?
        (?P<dev_n>[0-9]+)?
    )?
)
(?:\+(?P<local>[a-z0-9]+(?:[-_\.][a-z0-9]+)*))?       # local version
\s*$"#,
    )
    .expect("version regex is valid")
});

static MIN: Lazy<Version> = Lazy::new(|| {
    Version::parse("0.dev").expect("the minimum version parses")
});

/// Kind of a version modifier, ordered by Zero Install priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Dev,
    Alpha,
    Beta,
    Rc,
    Post,
}

impl ModifierKind {
    /// Priority used in the Zero Install rendering. The gap at 4 is the
    /// priority of "no modifier", appended as a terminal segment.
    pub(crate) fn zi_priority(self) -> u64 {
        match self {
            Self::Dev => 0,
            Self::Alpha => 1,
            Self::Beta => 2,
            Self::Rc => 3,
            Self::Post => 5,
        }
    }

    fn py_label(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Alpha => "a",
            Self::Beta => "b",
            Self::Rc => "rc",
            Self::Post => "post",
        }
    }
}

/// One `(kind, number)` modifier, e.g. `a1`, `post0`, `dev4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Modifier {
    pub kind: ModifierKind,
    pub number: u64,
}

impl Modifier {
    pub fn new(kind: ModifierKind, number: u64) -> Self {
        Self { kind, number }
    }
}

/// A normalized public PEP 440 version.
///
/// `after` supports constructing a version strictly greater than a given one
/// with no real Python version in between: it renders as one extra trailing
/// numeric segment, which the Zero Install comparator sorts directly after
/// the unmodified version.
#[derive(Debug, Clone)]
pub struct Version {
    pub(crate) epoch: u64,
    pub(crate) release: Vec<u64>,
    pub(crate) modifiers: Vec<Modifier>,
    pub(crate) after: u64,
    /// The raw string this version was parsed from, if any. Ignored by
    /// equality and ordering; kept so `~=` can re-parse without zero
    /// trimming.
    pub(crate) raw: Option<String>,
}

impl Version {
    /// Parse a Python version string, trimming trailing zeros of the release
    /// segment. A `.*` suffix is not allowed here.
    pub fn parse(version: &str) -> Result<Self> {
        Self::parse_with(version, true)
    }

    /// Parse a Python version string.
    ///
    /// `trim_zeros` controls whether trailing `.0`s of the release segment
    /// are removed (at least one component always remains).
    pub fn parse_with(version: &str, trim_zeros: bool) -> Result<Self> {
        let invalid = || VersionError::InvalidVersion {
            version: version.to_owned(),
        };
        let captures = VERSION_RE.captures(version).ok_or_else(invalid)?;
        if captures.name("local").is_some() {
            // Local versions are not public and have no feed representation.
            return Err(invalid());
        }

        let epoch = match captures.name("epoch") {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };

        let mut release = Vec::new();
        for part in captures["release"].split('.') {
            release.push(part.parse().map_err(|_| invalid())?);
        }
        if trim_zeros {
            while release.len() > 1 && release.last() == Some(&0) {
                release.pop();
            }
        }

        let number = |name: &str| -> Result<u64> {
            match captures.name(name) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };

        let mut modifiers = Vec::new();
        if let Some(label) = captures.name("pre_l") {
            let kind = match label.as_str().to_ascii_lowercase().as_str() {
                "a" | "alpha" => ModifierKind::Alpha,
                "b" | "beta" => ModifierKind::Beta,
                _ => ModifierKind::Rc, // c, rc, pre, preview
            };
            modifiers.push(Modifier::new(kind, number("pre_n")?));
        }
        if captures.name("post").is_some() {
            let n = match captures.name("post_n1") {
                Some(m) => m.as_str().parse().map_err(|_| invalid())?,
                None => number("post_n2")?,
            };
            modifiers.push(Modifier::new(ModifierKind::Post, n));
        }
        if captures.name("dev").is_some() {
            modifiers.push(Modifier::new(ModifierKind::Dev, number("dev_n")?));
        }

        Ok(Self {
            epoch,
            release,
            modifiers,
            after: 0,
            raw: Some(version.trim().to_owned()),
        })
    }

    /// The smallest version: `0.dev0`, less than or equal to every public
    /// PEP 440 version.
    pub fn min() -> &'static Self {
        &MIN
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// The raw string this version was parsed from, if it was parsed.
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// Whether this is a pre-release (first modifier is a, b or rc).
    pub fn is_prerelease(&self) -> bool {
        matches!(
            self.modifiers.first(),
            Some(Modifier {
                kind: ModifierKind::Alpha | ModifierKind::Beta | ModifierKind::Rc,
                ..
            })
        )
    }

    /// Whether the last modifier is a dev modifier.
    pub fn is_dev(&self) -> bool {
        matches!(
            self.modifiers.last(),
            Some(Modifier {
                kind: ModifierKind::Dev,
                ..
            })
        )
    }

    /// Version with the last modifier's number raised by one.
    pub fn increment_last_modifier(&self) -> Result<Self> {
        let mut version = self.cleared();
        let last = version.modifiers.last_mut().ok_or(VersionError::NoModifiers)?;
        last.number += 1;
        Ok(version)
    }

    /// Version with the last release component raised by one.
    pub fn increment_release(&self) -> Self {
        let mut version = self.cleared();
        if let Some(last) = version.release.last_mut() {
            *last += 1;
        }
        version
    }

    /// Version with an extra `.1` release component appended, the first
    /// release strictly after `self` and all its post releases.
    pub fn append_release_component(&self, component: u64) -> Self {
        let mut version = self.cleared();
        version.release.push(component);
        version
    }

    /// Version with `modifier` appended.
    pub fn append_modifier(&self, modifier: Modifier) -> Self {
        let mut version = self.cleared();
        version.modifiers.push(modifier);
        version
    }

    /// A version such that `self..!after_version` contains `self` and
    /// nothing else: no real Python version fits in between.
    pub fn after_version(&self) -> Self {
        let mut version = self.cleared();
        version.after = self.after + 1;
        version
    }

    /// Version with the release truncated to its first `len` components and
    /// all modifiers dropped. Used for `~=` prefix matching.
    pub(crate) fn release_prefix(&self, len: usize) -> Self {
        let mut version = self.cleared();
        version.release.truncate(len);
        version.modifiers.clear();
        version
    }

    fn cleared(&self) -> Self {
        let mut version = self.clone();
        version.raw = None;
        version
    }

    /// Render as a Zero Install version string.
    pub fn format_zi(&self) -> String {
        let segments: Vec<String> = self
            .zi_segments()
            .into_iter()
            .map(|segment| {
                segment
                    .iter()
                    .map(u64::to_string)
                    .collect::<Vec<_>>()
                    .join(".")
            })
            .collect();
        segments.join("-")
    }

    /// Render as a normalized Python version string.
    pub fn format_py(&self) -> Result<String> {
        if self.after > 0 {
            return Err(VersionError::AfterNotPython);
        }
        let release = self
            .release
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        let mut out = format!("{}!{}", self.epoch, release);
        for modifier in &self.modifiers {
            out.push('.');
            out.push_str(modifier.kind.py_label());
            out.push_str(&modifier.number.to_string());
        }
        Ok(out)
    }

    /// The dash-separated dotted-integer segments of the Zero Install
    /// rendering. Identical to what [`ZiVersion::parse`] recovers from
    /// [`Self::format_zi`].
    fn zi_segments(&self) -> Vec<Vec<u64>> {
        let mut segments = vec![vec![self.epoch], self.release.clone()];
        for modifier in &self.modifiers {
            segments.push(vec![modifier.kind.zi_priority(), modifier.number]);
        }
        if self.modifiers.len() < 3 {
            segments.push(vec![4]);
        }
        if self.after > 0 {
            segments.push(vec![self.after]);
        }
        segments
    }

    /// The Zero Install value of this version, used for all comparisons.
    pub fn zi_version(&self) -> ZiVersion {
        ZiVersion::from_segments(self.zi_segments())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        (self.epoch, &self.release, &self.modifiers, self.after)
            == (other.epoch, &other.release, &other.modifiers, other.after)
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.release.hash(state);
        self.modifiers.hash(state);
        self.after.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.zi_version().cmp(&other.zi_version())
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_zi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(version: &str) -> String {
        Version::parse(version).unwrap().format_zi()
    }

    #[test]
    fn conversion_matches_target_grammar() {
        assert_eq!(convert("1!1"), "1-1-4"); // trivial case
        assert_eq!(convert("1!1.0"), "1-1-4"); // trim zeros of release segment
        assert_eq!(convert("0.0"), "0-0-4"); // all-zero release keeps one zero
        assert_eq!(convert("0.1"), "0-0.1-4");
        assert_eq!(convert("1.dev"), "0-1-0.0-4"); // dev priority is 0
        assert_eq!(convert("1.a"), "0-1-1.0-4");
        assert_eq!(convert("1.b"), "0-1-2.0-4");
        assert_eq!(convert("1.rc"), "0-1-3.0-4");
        assert_eq!(convert("1.post"), "0-1-5.0-4");
        assert_eq!(convert("1.a2.post3.dev4"), "0-1-1.2-5.3-0.4");
        assert_eq!(convert("1.b2"), "0-1-2.2-4");
        assert_eq!(convert("1.rc2"), "0-1-3.2-4");

        // append -4 when fewer than 3 modifiers
        assert_eq!(convert("1"), "0-1-4");
        assert_eq!(convert("1.a.post"), "0-1-1.0-5.0-4");
    }

    #[test]
    fn normalization() {
        assert_eq!(convert("v1.0"), "0-1-4");
        assert_eq!(convert("1.0alpha2"), convert("1.0a2"));
        assert_eq!(convert("1.0beta2"), convert("1.0b2"));
        assert_eq!(convert("1.0preview2"), convert("1.0rc2"));
        assert_eq!(convert("1.0c2"), convert("1.0rc2"));
        assert_eq!(convert("1.0rev3"), convert("1.0.post3"));
        assert_eq!(convert("1.0-2"), convert("1.0.post2")); // implicit post
        assert_eq!(convert("1.0.DEV1"), convert("1.0.dev1"));
        assert_eq!(convert(" 1.0 "), convert("1.0"));
    }

    #[test]
    fn local_version_rejected() {
        let err = Version::parse("1+local").unwrap_err();
        assert!(matches!(err, VersionError::InvalidVersion { .. }));
    }

    #[test]
    fn invalid_versions_rejected() {
        for input in ["foobar", "", "1.", "1.0.*", "1..2", "1.0-"] {
            assert!(Version::parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn trim_zeros_can_be_disabled() {
        let version = Version::parse_with("1.10.0", false).unwrap();
        assert_eq!(version.release(), &[1, 10, 0]);
        assert_eq!(Version::parse("1.10.0").unwrap().release(), &[1, 10]);
    }

    /// A corpus in strictly increasing Python order. Shared by the ordering
    /// and after-version tests.
    fn ordered_corpus() -> Vec<Version> {
        [
            "0.dev", "0", "0.post1", "0.1", "1.dev1", "1a1.dev1", "1a1", "1a1.post1.dev1",
            "1a1.post1", "1b2", "1rc1", "1rc1.post0", "1", "1.post1.dev2", "1.post1", "1.0.1",
            "1.1.dev1", "1.1", "1.2", "2", "10", "1!0.1",
        ]
        .iter()
        .map(|v| Version::parse(v).unwrap())
        .collect()
    }

    #[test]
    fn ordering_agrees_with_python_ordering() {
        let corpus = ordered_corpus();
        for window in corpus.windows(2) {
            assert!(
                window[0] < window[1],
                "{} should sort before {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn ordering_via_rendered_strings() {
        // The comparison key is exactly what the target parser recovers from
        // the rendered string.
        for version in ordered_corpus() {
            let reparsed = ZiVersion::parse(&version.format_zi()).unwrap();
            assert_eq!(reparsed, version.zi_version());
        }
    }

    #[test]
    fn after_version_slots_directly_after() {
        let corpus = ordered_corpus();
        let mut interleaved = Vec::new();
        for version in corpus {
            interleaved.push(version.clone());
            interleaved.push(version.after_version());
        }
        let mut sorted = interleaved.clone();
        sorted.sort();
        assert_eq!(sorted, interleaved);
    }

    #[test]
    fn after_chain_is_increasing() {
        let version = Version::parse("1.2").unwrap();
        let after = version.after_version();
        let after_after = after.after_version();
        assert!(version < after);
        assert!(after < after_after);
        assert_eq!(after.format_zi(), "0-1.2-4-1");
        assert_eq!(after_after.format_zi(), "0-1.2-4-2");
    }

    #[test]
    fn min_is_least() {
        for version in ordered_corpus() {
            assert!(*Version::min() <= version);
        }
    }

    #[test]
    fn mutations() {
        let version = Version::parse("1.2a3").unwrap();
        assert_eq!(version.increment_last_modifier().unwrap().format_zi(), "0-1.2-1.4-4");
        assert_eq!(version.increment_release().format_zi(), "0-1.3-1.3-4");
        assert_eq!(version.append_release_component(1).format_zi(), "0-1.2.1-1.3-4");
        assert_eq!(
            version
                .append_modifier(Modifier::new(ModifierKind::Dev, 0))
                .format_zi(),
            "0-1.2-1.3-0.0-4"
        );
        assert!(Version::parse("1").unwrap().increment_last_modifier().is_err());
    }

    #[test]
    fn format_py_round_trip() {
        let version = Version::parse("1!1.2rc3.post4.dev5").unwrap();
        assert_eq!(version.format_py().unwrap(), "1!1.2.rc3.post4.dev5");
        assert_eq!(Version::parse(&version.format_py().unwrap()).unwrap(), version);
        assert!(version.after_version().format_py().is_err());
    }

    #[test]
    fn equality_ignores_raw() {
        let a = Version::parse("1.0").unwrap();
        let b = Version::parse("1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a.raw(), b.raw());
    }

    #[test]
    fn prerelease_and_dev_detection() {
        assert!(Version::parse("1a1").unwrap().is_prerelease());
        assert!(Version::parse("1rc1.post2").unwrap().is_prerelease());
        assert!(!Version::parse("1.post1").unwrap().is_prerelease());
        assert!(!Version::parse("1.dev1").unwrap().is_prerelease());
        assert!(Version::parse("1.dev1").unwrap().is_dev());
        assert!(Version::parse("1a1.dev1").unwrap().is_dev());
        assert!(!Version::parse("1a1").unwrap().is_dev());
    }
}
