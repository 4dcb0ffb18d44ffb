//! Convert egg-info dependency manifests into `<requires>` elements.
//!
//! The egg-info carries either `requires.txt` or `depends.txt` in the
//! "sections" format: an unnamed top section with the required
//! dependencies, and one `[extra]` section per group of optional ones
//! (section names may carry an environment marker after a `:`).
//!
//! Extras are flattened: their dependencies are included at `recommended`
//! importance regardless of which extra they belong to, with a warning. A
//! dependency that is both required and optional is required, and its
//! specifier sets are unioned.

use crate::context::WorkerContext;
use crate::error::{ConvertError, Result};
use crate::xml::Element;
use std::collections::BTreeMap;
use std::path::Path;
use zerofeed_pypi::canonical_name;
use zerofeed_version::{Operator, VersionError, convert_specifiers, parse_specifier};

/// One requirement line: `name[extras]specifiers;marker`.
#[derive(Debug, Clone, PartialEq)]
struct Requirement {
    name: String,
    specifiers: Vec<(Operator, String)>,
    marker: Option<String>,
}

/// Merged view of one dependency across all sections.
#[derive(Debug, Default)]
struct MergedRequirement {
    required: bool,
    specifiers: Vec<(Operator, String)>,
}

/// Convert the dependencies of an egg-info directory into `<requires>`
/// elements, sorted by canonical dependency name.
pub fn convert_dependencies(ctx: &WorkerContext, egg_info_dir: &Path) -> Result<Vec<Element>> {
    let sections = parse_requirement_files(egg_info_dir)?;

    // Warn about extras and any environment markers on their names.
    let extras: Vec<&str> = sections
        .iter()
        .filter_map(|(extra, _)| extra.as_deref())
        .collect();
    if !extras.is_empty() {
        ctx.feed_logger.warn(format!(
            "Has extras. Each extra requirement item will be selected when possible \
             with disregard of which extra the requirement belongs to. Extras: {}",
            extras
                .iter()
                .map(|extra| format!("'{extra}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ));
        if extras.iter().any(|extra| extra.contains(':')) {
            ctx.feed_logger
                .warn("Some extras have environment markers. Environment markers are ignored.");
        }
    }

    // Merge into one entry per canonical name.
    let mut merged: BTreeMap<String, MergedRequirement> = BTreeMap::new();
    for (extra, requirements) in &sections {
        for requirement in requirements {
            if let Some(marker) = &requirement.marker {
                ctx.feed_logger
                    .warn(format!("Marker ignored: {};{marker}", requirement.name));
                continue;
            }
            let entry = merged.entry(canonical_name(&requirement.name)).or_default();
            if extra.is_none() {
                entry.required = true;
            }
            entry.specifiers.extend(requirement.specifiers.clone());
        }
    }

    // Convert each merged dependency.
    let mut elements = Vec::new();
    for (name, requirement) in merged {
        let version_expression =
            convert_specifiers(&requirement.specifiers, |warning| {
                ctx.feed_logger.warn(warning);
            })
            .map_err(|error| match error {
                VersionError::EmptyRange => ConvertError::InvalidDistribution(format!(
                    "requirement '{name}' constrains to an empty range \
                     and can never be satisfied"
                )),
                other => ConvertError::InvalidDistribution(other.to_string()),
            })?;

        let mut requires = Element::new("requires")
            .attr("interface", ctx.feed_uri(&name))
            .attr(
                "importance",
                if requirement.required {
                    "essential"
                } else {
                    "recommended"
                },
            );
        if let Some(expression) = version_expression {
            requires.set_attr("version", expression);
        }
        elements.push(requires);
    }
    Ok(elements)
}

/// Read `requires.txt` / `depends.txt`. Having both is unsupported.
fn parse_requirement_files(
    egg_info_dir: &Path,
) -> Result<Vec<(Option<String>, Vec<Requirement>)>> {
    let requires = egg_info_dir.join("requires.txt");
    let depends = egg_info_dir.join("depends.txt");
    if requires.exists() && depends.exists() {
        return Err(ConvertError::UnsupportedDistribution(
            "egg-info has both a requires.txt and depends.txt file".into(),
        ));
    }

    let mut sections = Vec::new();
    for path in [requires, depends] {
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        let name = path.file_name().map(|name| name.to_string_lossy().into_owned());
        sections.extend(parse_sections(&content).map_err(|reason| {
            ConvertError::InvalidDistribution(format!(
                "{} failed to parse: {reason}",
                name.as_deref().unwrap_or("requirements")
            ))
        })?);
    }
    Ok(sections)
}

/// The pkg_resources "sections" format: blank lines and comments skipped,
/// `[name]` switches sections, everything else is a requirement line.
fn parse_sections(
    content: &str,
) -> std::result::Result<Vec<(Option<String>, Vec<Requirement>)>, String> {
    let mut sections: Vec<(Option<String>, Vec<Requirement>)> = vec![(None, Vec::new())];
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('[') {
            let name = rest
                .strip_suffix(']')
                .ok_or_else(|| format!("invalid section heading {line:?}"))?;
            sections.push((Some(name.trim().to_owned()), Vec::new()));
        } else {
            let requirement = parse_requirement(line)?;
            sections
                .last_mut()
                .expect("sections always has a head")
                .1
                .push(requirement);
        }
    }
    Ok(sections)
}

/// Parse one requirement line.
fn parse_requirement(line: &str) -> std::result::Result<Requirement, String> {
    let (spec_part, marker) = match line.split_once(';') {
        Some((head, marker)) => (head.trim(), Some(marker.trim().to_owned())),
        None => (line, None),
    };

    let name_end = spec_part
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')))
        .unwrap_or(spec_part.len());
    let name = &spec_part[..name_end];
    if name.is_empty() {
        return Err(format!("requirement {line:?} has no name"));
    }
    let mut rest = spec_part[name_end..].trim();

    // Optional extras bracket; the converter ignores its content.
    if let Some(after) = rest.strip_prefix('[') {
        let close = after.find(']').ok_or_else(|| {
            format!("requirement {line:?} has an unterminated extras bracket")
        })?;
        rest = after[close + 1..].trim();
    }

    // pkg_resources also accepts "name (>=1.0)".
    if let Some(inner) = rest.strip_prefix('(') {
        rest = inner
            .strip_suffix(')')
            .ok_or_else(|| format!("requirement {line:?} has unbalanced parentheses"))?
            .trim();
    }

    let mut specifiers = Vec::new();
    if !rest.is_empty() {
        for piece in rest.split(',') {
            let specifier = parse_specifier(piece)
                .ok_or_else(|| format!("invalid specifier {piece:?} in {line:?}"))?;
            specifiers.push(specifier);
        }
    }

    Ok(Requirement {
        name: name.to_owned(),
        specifiers,
        marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::FeedLogger;
    use crate::sandbox::Sandbox;
    use std::rc::Rc;
    use zerofeed_pools::CombinedPool;
    use zerofeed_pypi::PypiClient;

    fn context(dir: &tempfile::TempDir) -> WorkerContext {
        WorkerContext {
            base_uri: "https://example.org/zf".into(),
            pypi_mirror: None,
            feed_logger: FeedLogger::open("foo", &dir.path().join("foo.log")).unwrap(),
            pool: Rc::new(CombinedPool::new(|| {
                PypiClient::new(reqwest::Client::new(), "http://localhost/pypi")
            })),
            sandbox: Rc::new(Sandbox::materialize().unwrap()),
            http: reqwest::Client::new(),
        }
    }

    fn egg_info(dir: &tempfile::TempDir, requires: &str) -> std::path::PathBuf {
        let egg_info = dir.path().join("foo.egg-info");
        std::fs::create_dir_all(&egg_info).unwrap();
        std::fs::write(egg_info.join("PKG-INFO"), "Name: foo\n").unwrap();
        std::fs::write(egg_info.join("requires.txt"), requires).unwrap();
        egg_info
    }

    #[test]
    fn required_dependency_is_essential() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "Dependency\n");

        let requires = convert_dependencies(&ctx, &egg_info).unwrap();
        assert_eq!(requires.len(), 1);
        assert_eq!(
            requires[0].get_attr("interface"),
            Some("https://example.org/zf/feeds/dependency.xml")
        );
        assert_eq!(requires[0].get_attr("importance"), Some("essential"));
        assert_eq!(requires[0].get_attr("version"), None);
    }

    #[test]
    fn extras_are_recommended() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "base>=1\n\n[fancy]\nExtraDep==2\n");

        let requires = convert_dependencies(&ctx, &egg_info).unwrap();
        assert_eq!(requires.len(), 2);
        assert_eq!(requires[0].get_attr("importance"), Some("essential"));
        assert_eq!(requires[0].get_attr("version"), Some("0-1-4.."));
        assert_eq!(
            requires[1].get_attr("interface"),
            Some("https://example.org/zf/feeds/extradep.xml")
        );
        assert_eq!(requires[1].get_attr("importance"), Some("recommended"));
        assert_eq!(requires[1].get_attr("version"), Some("0-2-4"));
    }

    #[test]
    fn required_wins_and_specifiers_union() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "dep>=1\n\n[extra]\ndep<3\n");

        let requires = convert_dependencies(&ctx, &egg_info).unwrap();
        assert_eq!(requires.len(), 1);
        assert_eq!(requires[0].get_attr("importance"), Some("essential"));
        // >=1 and <3 intersected.
        assert_eq!(requires[0].get_attr("version"), Some("0-1-4..!0-3-0.0-4"));
    }

    #[test]
    fn markers_are_warned_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "plain\nconditional; python_version < \"3\"\n");

        let requires = convert_dependencies(&ctx, &egg_info).unwrap();
        assert_eq!(requires.len(), 1);
        assert_eq!(
            requires[0].get_attr("interface"),
            Some("https://example.org/zf/feeds/plain.xml")
        );

        let log = std::fs::read_to_string(dir.path().join("foo.log")).unwrap();
        assert!(log.contains("Marker ignored: conditional;python_version < \"3\""));
    }

    #[test]
    fn empty_range_is_invalid_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "dep>=2,<1\n");

        let error = convert_dependencies(&ctx, &egg_info).unwrap_err();
        assert!(matches!(error, ConvertError::InvalidDistribution(_)));
    }

    #[test]
    fn both_manifests_are_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "dep\n");
        std::fs::write(egg_info.join("depends.txt"), "other\n").unwrap();

        let error = convert_dependencies(&ctx, &egg_info).unwrap_err();
        assert!(matches!(error, ConvertError::UnsupportedDistribution(_)));
    }

    #[test]
    fn names_are_canonicalized_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        let egg_info = egg_info(&dir, "Zope.Interface\nAAA_bbb\n");

        let requires = convert_dependencies(&ctx, &egg_info).unwrap();
        let interfaces: Vec<_> = requires
            .iter()
            .map(|r| r.get_attr("interface").unwrap())
            .collect();
        assert_eq!(
            interfaces,
            vec![
                "https://example.org/zf/feeds/aaa-bbb.xml",
                "https://example.org/zf/feeds/zope-interface.xml",
            ]
        );
    }

    #[test]
    fn requirement_line_grammar() {
        let req = parse_requirement("foo[extra1,extra2] (>=1.0, <2) ; os_name == 'nt'").unwrap();
        assert_eq!(req.name, "foo");
        assert_eq!(req.specifiers.len(), 2);
        assert_eq!(req.marker.as_deref(), Some("os_name == 'nt'"));

        assert!(parse_requirement(">=1.0").is_err());
        assert!(parse_requirement("foo >= ").is_err());
    }
}
