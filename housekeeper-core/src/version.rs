use std::{borrow::Cow, cmp::Ordering};

use semver::{BuildMetadata, Prerelease, Version};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Couldn't parse '{raw}' as a version: {reason}")]
pub struct VersionParseError {
    pub raw: String,
    pub reason: Cow<'static, str>,
}

impl VersionParseError {
    fn new(raw: &str, reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            raw: raw.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Parses versions the way nodes and tooling report them: `v1.28.0`, `"5.2"`, `22.03`,
/// `1.28.0-rc.1+build`. Two-component versions get a zero patch, leading zeros are ignored.
pub fn parse_version(raw: &str) -> Result<Version, VersionParseError> {
    let trimmed = raw.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(VersionParseError::new(raw, "version is empty"));
    }

    let (rest, build) = match trimmed.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (trimmed, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let components = core
        .split('.')
        .map(|component| {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::new(
                    raw,
                    format!("'{component}' is not a numeric version component"),
                ));
            }

            component
                .parse::<u64>()
                .map_err(|err| VersionParseError::new(raw, err.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut version = match components.as_slice() {
        [major, minor] => Version::new(*major, *minor, 0),
        [major, minor, patch] => Version::new(*major, *minor, *patch),
        _ => {
            return Err(VersionParseError::new(
                raw,
                "expected two or three version components",
            ))
        }
    };

    if pre.is_some_and(str::is_empty) || build.is_some_and(str::is_empty) {
        return Err(VersionParseError::new(raw, "empty pre-release or build suffix"));
    }

    if let Some(pre) = pre {
        version.pre =
            Prerelease::new(pre).map_err(|err| VersionParseError::new(raw, err.to_string()))?;
    }

    if let Some(build) = build {
        version.build = BuildMetadata::new(build)
            .map_err(|err| VersionParseError::new(raw, err.to_string()))?;
    }

    Ok(version)
}

pub fn compare_versions(left: &str, right: &str) -> Result<Ordering, VersionParseError> {
    let left = parse_version(left)?;
    let right = parse_version(right)?;

    Ok(left.cmp_precedence(&right))
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use semver::Version;

    use super::{compare_versions, parse_version};

    #[test]
    fn parses_tooling_and_os_release_formats() {
        assert_eq!(parse_version("v1.28.0\n").unwrap(), Version::new(1, 28, 0));
        assert_eq!(parse_version("\"5.2\"").unwrap(), Version::new(5, 2, 0));
        assert_eq!(parse_version("22.03").unwrap(), Version::new(22, 3, 0));
        assert_eq!(parse_version("1.28.0").unwrap(), Version::new(1, 28, 0));

        let pre = parse_version("v1.29.0-rc.1+abc").unwrap();
        assert_eq!(pre.pre.as_str(), "rc.1");
        assert_eq!(pre.build.as_str(), "abc");
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["", "   ", "v", "1", "1.2.3.4", "one.two", "1..2", "1.2-", "latest"] {
            assert!(parse_version(raw).is_err(), "'{raw}' should not parse");
        }
    }

    #[test]
    fn compares_by_precedence() {
        assert_eq!(compare_versions("v1.28.0", "1.28.0").unwrap(), Ordering::Equal);
        assert_eq!(compare_versions("1.28.1", "1.28.0").unwrap(), Ordering::Greater);
        assert_eq!(compare_versions("1.27.9", "1.28.0").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("1.28.0-rc.1", "1.28.0").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("5.2", "5.2.0").unwrap(), Ordering::Equal);
        assert_eq!(compare_versions("1.28.0+a", "1.28.0+b").unwrap(), Ordering::Equal);
    }

    #[test]
    fn comparison_fails_when_either_side_is_malformed() {
        let error = compare_versions("1.28.0", "garbage").unwrap_err();
        assert_eq!(error.raw, "garbage");
        assert!(compare_versions("garbage", "1.28.0").is_err());
    }
}
