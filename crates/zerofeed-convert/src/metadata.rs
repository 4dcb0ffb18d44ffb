//! Reading `PKG-INFO` out of an egg-info directory.

use crate::error::{ConvertError, Result};
use std::path::Path;

/// The slice of distribution metadata the converter uses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PkgInfo {
    pub name: Option<String>,
    pub version: Option<String>,
    pub classifiers: Vec<String>,
}

/// Read and parse `{egg_info}/PKG-INFO`.
///
/// The file is an RFC 822 style header block (metadata version 1.x/2.x);
/// repeated `Classifier:` headers accumulate. A missing or unreadable file
/// makes the distribution invalid.
pub fn read_pkg_info(egg_info_dir: &Path) -> Result<PkgInfo> {
    let path = egg_info_dir.join("PKG-INFO");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| ConvertError::InvalidDistribution(format!("invalid egg-info: {e}")))?;
    Ok(parse_pkg_info(&content))
}

fn parse_pkg_info(content: &str) -> PkgInfo {
    let mut info = PkgInfo::default();
    for line in content.lines() {
        // The header block ends at the first blank line; the rest is the
        // long description.
        if line.is_empty() {
            break;
        }
        // Continuation lines belong to headers we do not use.
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => info.name = Some(value.to_owned()),
            "Version" => info.version = Some(value.to_owned()),
            "Classifier" | "Classifiers" => info.classifiers.push(value.to_owned()),
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers_and_classifiers() {
        let info = parse_pkg_info(
            "Metadata-Version: 1.1\n\
             Name: foo\n\
             Version: 1.0\n\
             Summary: Test package\n\
             Classifier: Environment :: Console\n\
             Classifier: License :: OSI Approved :: MIT License\n\
             Classifier: Natural Language :: English\n\
             \n\
             The long description starts here.\n\
             Classifier: Not :: A :: Header\n",
        );
        assert_eq!(info.name.as_deref(), Some("foo"));
        assert_eq!(info.version.as_deref(), Some("1.0"));
        assert_eq!(
            info.classifiers,
            vec![
                "Environment :: Console",
                "License :: OSI Approved :: MIT License",
                "Natural Language :: English",
            ]
        );
    }

    #[test]
    fn missing_file_is_invalid_distribution() {
        let dir = tempfile::tempdir().unwrap();
        let error = read_pkg_info(dir.path()).unwrap_err();
        assert!(matches!(error, ConvertError::InvalidDistribution(_)));
    }
}
