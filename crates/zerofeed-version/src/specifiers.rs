//! Compile PEP 440 specifier sets into Zero Install version expressions.
//!
//! Each specifier becomes a small AST of half-open ranges over [`Version`],
//! the conjunction is distributed into a single disjunction by pairwise
//! range intersection, and the result is simplified (sort, merge touching
//! ranges, collapse "everything but one version" to `!version`) before
//! rendering as `range | range | ...`.
//!
//! Invalid specifiers are reported through the caller's warning sink and
//! skipped; a set that constrains to the empty range is an error, because a
//! dependency carrying it can never be satisfied.

use crate::error::{Result, VersionError};
use crate::version::{Modifier, ModifierKind, Version};
use std::cmp::Ordering;
use std::fmt;

/// A PEP 440 comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
    Ne,
    ArbitraryEq,
    Compatible,
}

impl Operator {
    /// Parse an operator token. Longest match wins, so `===` is not `==`.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            ">=" => Some(Self::Ge),
            ">" => Some(Self::Gt),
            "<=" => Some(Self::Le),
            "<" => Some(Self::Lt),
            "===" => Some(Self::ArbitraryEq),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "~=" => Some(Self::Compatible),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::ArbitraryEq => "===",
            Self::Compatible => "~=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a specifier like `>=1.2` into operator and version text.
pub fn parse_specifier(text: &str) -> Option<(Operator, String)> {
    let text = text.trim();
    for token in ["===", "==", "!=", "~=", ">=", "<=", ">", "<"] {
        if let Some(version) = text.strip_prefix(token) {
            let version = version.trim();
            if version.is_empty() {
                return None;
            }
            let operator = Operator::parse(token)?;
            return Some((operator, version.to_owned()));
        }
    }
    None
}

/// Upper bound of a range: a version, or the maximum greater than every
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    Version(Version),
    Max,
}

impl Ord for Bound {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Max, Self::Max) => Ordering::Equal,
            (Self::Max, Self::Version(_)) => Ordering::Greater,
            (Self::Version(_), Self::Max) => Ordering::Less,
            (Self::Version(a), Self::Version(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Bound {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Bound {
    fn cmp_version(&self, version: &Version) -> Ordering {
        match self {
            Self::Max => Ordering::Greater,
            Self::Version(bound) => bound.cmp(version),
        }
    }
}

/// A non-empty half-open range `[start, end)` over versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    start: Version,
    end: Bound,
}

impl Range {
    /// Create a range; `start` must be strictly below `end`.
    pub fn new(start: Version, end: Bound) -> Result<Self> {
        if end.cmp_version(&start) != Ordering::Greater {
            return Err(VersionError::EmptyRange);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> &Version {
        &self.start
    }

    pub fn end(&self) -> &Bound {
        &self.end
    }

    /// Intersect with another range; `None` when the ranges are disjoint.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = if self.start >= other.start {
            self.start.clone()
        } else {
            other.start.clone()
        };
        let end = if self.end <= other.end {
            self.end.clone()
        } else {
            other.end.clone()
        };
        Self::new(start, end).ok()
    }

    /// Render as a Zero Install range. A range that spans exactly one
    /// version renders as that bare version.
    pub fn format_zi(&self) -> String {
        if self.end == Bound::Version(self.start.after_version()) {
            return self.start.format_zi();
        }
        let start = if self.start == *Version::min() {
            String::new()
        } else {
            self.start.format_zi()
        };
        let end = match &self.end {
            Bound::Max => String::new(),
            Bound::Version(version) => format!("!{}", version.format_zi()),
        };
        format!("{start}..{end}")
    }
}

/// What became of a single specifier: a conjunction of disjunctions of
/// ranges, or a reason to skip it.
enum Converted {
    Constraint(Vec<Vec<Range>>),
    Skip(String),
}

/// Convert Python version specifiers to a Zero Install version expression.
///
/// Returns `None` when the specifiers do not actually constrain anything
/// (including when every specifier was invalid and skipped). Invalid
/// specifiers are passed to `warn` and ignored; the remaining ones are
/// ANDed.
///
/// # Errors
///
/// [`VersionError::EmptyRange`] when the conjunction admits no version at
/// all.
pub fn convert_specifiers(
    specifiers: &[(Operator, String)],
    mut warn: impl FnMut(String),
) -> Result<Option<String>> {
    // Convert each specifier to ranges, skipping invalid ones.
    let mut conjuncts: Vec<Vec<Range>> = Vec::new();
    for (operator, version) in specifiers {
        match convert_one(*operator, version)? {
            Converted::Constraint(mut parts) => conjuncts.append(&mut parts),
            Converted::Skip(reason) => {
                warn(format!(
                    "Ignoring invalid specifier: '{operator}{version}'. {reason}"
                ));
            }
        }
    }
    if conjuncts.is_empty() {
        return Ok(None);
    }

    // Distribute the conjunction over the disjunctions: intersecting two
    // disjunctions yields the disjunction of pairwise intersections.
    let mut ranges = conjuncts.remove(0);
    for right in conjuncts {
        ranges = ranges
            .iter()
            .flat_map(|a| right.iter().filter_map(|b| a.intersect(b)))
            .collect();
        if ranges.is_empty() {
            return Err(VersionError::EmptyRange);
        }
    }

    Ok(Some(render(simplify(ranges))))
}

/// Simplified form of a compiled specifier set.
enum Simplified {
    Ranges(Vec<Range>),
    /// Everything except one version.
    NotVersion(Version),
}

fn simplify(mut ranges: Vec<Range>) -> Simplified {
    ranges.sort_by(|a, b| a.start.cmp(&b.start));

    // Join touching or overlapping ranges.
    let mut merged: Vec<Range> = Vec::new();
    for range in ranges {
        if let Some(last) = merged.last_mut() {
            if last.end.cmp_version(&range.start) != Ordering::Less {
                if range.end > last.end {
                    last.end = range.end;
                }
                continue;
            }
        }
        merged.push(range);
    }

    // If the ranges cover all but one version, return !version.
    if let [first, second] = merged.as_slice() {
        if first.start == *Version::min() && second.end == Bound::Max {
            if let Bound::Version(gap) = &first.end {
                if gap.after_version() == second.start {
                    return Simplified::NotVersion(gap.clone());
                }
            }
        }
    }

    Simplified::Ranges(merged)
}

fn render(simplified: Simplified) -> String {
    match simplified {
        Simplified::NotVersion(version) => format!("!{}", version.format_zi()),
        Simplified::Ranges(ranges) => ranges
            .iter()
            .map(Range::format_zi)
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

fn convert_one(operator: Operator, version_text: &str) -> Result<Converted> {
    if let Some(prefix) = version_text.strip_suffix(".*") {
        if !matches!(operator, Operator::Eq | Operator::Ne) {
            return Ok(Converted::Skip(format!(
                "{operator} does not allow prefix match suffix (.*)"
            )));
        }
        let version = match Version::parse(prefix) {
            Ok(version) => version,
            Err(error) => return Ok(Converted::Skip(format!("Invalid version: {error}"))),
        };
        return convert_prefix_match(&version, operator == Operator::Eq);
    }

    let version = match Version::parse(version_text) {
        Ok(version) => version,
        Err(error) => return Ok(Converted::Skip(format!("Invalid version: {error}"))),
    };

    let dev0 = Modifier::new(ModifierKind::Dev, 0);
    let constraint = |ranges: Vec<Range>| Ok(Converted::Constraint(vec![ranges]));
    match operator {
        Operator::Ge => constraint(vec![Range::new(version, Bound::Max)?]),
        Operator::Le => constraint(vec![Range::new(
            Version::min().clone(),
            Bound::Version(version.after_version()),
        )?]),
        Operator::Gt => {
            // ">V must not allow a post-release of V unless V itself is a
            // post-release" (PEP 440), so jump past all of V's posts unless
            // V already carries a post or dev modifier.
            let can_append_post = !matches!(
                version.modifiers().last(),
                Some(Modifier {
                    kind: ModifierKind::Post | ModifierKind::Dev,
                    ..
                })
            );
            let start = if can_append_post {
                let bumped = if version.modifiers().is_empty() {
                    version.append_release_component(1)
                } else {
                    version.increment_last_modifier()?
                };
                bumped.append_modifier(dev0)
            } else {
                version.after_version()
            };
            constraint(vec![Range::new(start, Bound::Max)?])
        }
        Operator::Lt => {
            // "<V must not allow a pre-release of V unless V itself is a
            // pre-release": v.dev0..!v are all pre-releases of v.
            let end = if version.is_prerelease() {
                version
            } else {
                version.append_modifier(dev0)
            };
            constraint(vec![Range::new(
                Version::min().clone(),
                Bound::Version(end),
            )?])
        }
        // Only valid public PEP 440 versions are supported, so the legacy
        // arbitrary equality degenerates to plain equality.
        Operator::Eq | Operator::ArbitraryEq => {
            let end = version.after_version();
            constraint(vec![Range::new(version, Bound::Version(end))?])
        }
        Operator::Ne => constraint(not_version_ranges(&version)?),
        Operator::Compatible => {
            // ~=v is >=v combined with ==prefix.*, where the prefix drops
            // the last component of the untrimmed release segment.
            let ge = Range::new(version.clone(), Bound::Max)?;
            let raw = version.raw().unwrap_or(version_text);
            let untrimmed = match Version::parse_with(raw, false) {
                Ok(untrimmed) => untrimmed,
                Err(error) => return Ok(Converted::Skip(format!("Invalid version: {error}"))),
            };
            if untrimmed.release().len() < 2 {
                return Ok(Converted::Skip(
                    "Compatible release clause requires multi-part release segment (e.g. ~=1.1)"
                        .to_owned(),
                ));
            }
            let prefix = untrimmed.release_prefix(untrimmed.release().len() - 1);
            match convert_prefix_match(&prefix, true)? {
                Converted::Constraint(mut parts) => {
                    parts.push(vec![ge]);
                    Ok(Converted::Constraint(parts))
                }
                skip @ Converted::Skip(_) => Ok(skip),
            }
        }
    }
}

/// `..!v | v+..`, dropping a side that is empty.
fn not_version_ranges(version: &Version) -> Result<Vec<Range>> {
    let ranges: Vec<Range> = [
        Range::new(Version::min().clone(), Bound::Version(version.clone())),
        Range::new(version.after_version(), Bound::Max),
    ]
    .into_iter()
    .filter_map(std::result::Result::ok)
    .collect();
    if ranges.is_empty() {
        return Err(VersionError::EmptyRange);
    }
    Ok(ranges)
}

/// `==version.*` or `!=version.*`.
fn convert_prefix_match(version: &Version, is_eq: bool) -> Result<Converted> {
    // Everything the prefix covers starts at version.dev0 ...
    let dev0 = Modifier::new(ModifierKind::Dev, 0);
    let start = version.append_modifier(dev0);

    // ... and ends right before the bumped prefix: increment the last
    // modifier if there is one, the last release component otherwise.
    let bumped = if version.modifiers().is_empty() {
        version.increment_release()
    } else {
        if version.is_dev() {
            return Ok(Converted::Skip(
                "Prefix match must not end with .dev.*".to_owned(),
            ));
        }
        version.increment_last_modifier()?
    };
    let end = bumped.append_modifier(dev0);

    let ranges = if is_eq {
        vec![Range::new(start, Bound::Version(end))?]
    } else {
        let ranges: Vec<Range> = [
            Range::new(Version::min().clone(), Bound::Version(start)),
            Range::new(end, Bound::Max),
        ]
        .into_iter()
        .filter_map(std::result::Result::ok)
        .collect();
        if ranges.is_empty() {
            return Err(VersionError::EmptyRange);
        }
        ranges
    };
    Ok(Converted::Constraint(vec![ranges]))
}
