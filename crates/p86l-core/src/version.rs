use std::cmp::Ordering;
use std::fmt;

use semver::{BuildMetadata, Prerelease};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version format: '{version}'")]
    InvalidFormat { version: String },
}

/// A release tag reduced to its numeric segments and pre-release label.
///
/// Any number of numeric segments is accepted; missing trailing segments
/// count as zero, so `1.2`, `1.2.0` and `1.2.0.0` are equal. Pre-release
/// labels order the SemVer way and build metadata is ignored.
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    segments: Vec<u64>,
    pre: Prerelease,
    build: BuildMetadata,
}

impl ReleaseVersion {
    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for idx in 0..len {
            let ours = self.segments.get(idx).copied().unwrap_or(0);
            let theirs = other.segments.get(idx).copied().unwrap_or(0);
            match ours.cmp(&theirs) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }

        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            if idx > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        if !self.pre.is_empty() {
            write!(f, "-{}", self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+{}", self.build)?;
        }
        Ok(())
    }
}

/// Returns `true` when `candidate` strictly orders after `current`.
///
/// Both tags go through [`parse_version`]; equal versions are not newer.
///
/// # Errors
/// Returns [`VersionError::InvalidFormat`] if either string is not a
/// recognizable version.
pub fn is_newer(current: &str, candidate: &str) -> Result<bool, VersionError> {
    let current = parse_version(current)?;
    let candidate = parse_version(candidate)?;
    Ok(candidate > current)
}

/// Parse a release tag.
///
/// Accepts an optional leading `v`, one or more dot-separated numeric
/// segments, then an optional `-pre.release` label and `+build` metadata.
/// Anything else is rejected rather than compared lexically.
///
/// # Errors
/// Returns [`VersionError::InvalidFormat`] when the tag cannot be parsed.
pub fn parse_version(version: &str) -> Result<ReleaseVersion, VersionError> {
    let invalid = || VersionError::InvalidFormat {
        version: version.to_string(),
    };

    let trimmed = version.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    let (rest, build) = match trimmed.split_once('+') {
        Some((rest, build)) if !build.is_empty() => {
            (rest, BuildMetadata::new(build).map_err(|_| invalid())?)
        }
        Some(_) => return Err(invalid()),
        None => (trimmed, BuildMetadata::EMPTY),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) if !pre.is_empty() => {
            (core, Prerelease::new(pre).map_err(|_| invalid())?)
        }
        Some(_) => return Err(invalid()),
        None => (rest, Prerelease::EMPTY),
    };

    let segments = core
        .split('.')
        .map(parse_segment)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(invalid)?;

    Ok(ReleaseVersion {
        segments,
        pre,
        build,
    })
}

fn parse_segment(part: &str) -> Option<u64> {
    if part.is_empty() || !part.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    part.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_comparison() {
        assert_eq!(is_newer("1.2.0", "1.3.0"), Ok(true));
        assert_eq!(is_newer("2.0.0", "1.9.9"), Ok(false));
        assert_eq!(is_newer("1.0.0-beta", "1.0.0"), Ok(true));
        assert_eq!(is_newer("1.0.0", "1.0.1"), Ok(true));
        assert_eq!(is_newer("1.0.0-beta.2", "1.0.0-beta.10"), Ok(true));
        assert_eq!(is_newer("0.99.0", "1"), Ok(true));
        assert_eq!(is_newer("1.1.9", "1.2"), Ok(true));
        assert_eq!(is_newer("1.2.0", "1.2"), Ok(false));
    }

    #[test]
    fn four_segment_tags_compare_segment_by_segment() {
        assert_eq!(is_newer("1.0.0", "1.0.0.1"), Ok(true));
        assert_eq!(is_newer("v1.0.0.1", "v1.0.0"), Ok(false));
        assert_eq!(is_newer("1.0.0.9", "1.0.0.10"), Ok(true));
        assert_eq!(is_newer("1.0.0.0", "1.0.0"), Ok(false));
        assert_eq!(is_newer("1.0.0.1-rc.1", "1.0.0.1"), Ok(true));
        assert_eq!(is_newer("1.2.3.4", "1.2.4"), Ok(true));
        assert_eq!(
            parse_version("v1.2.3.4").expect("tag should parse").segments(),
            &[1, 2, 3, 4]
        );
    }

    #[test]
    fn equal_versions_are_not_newer() {
        assert_eq!(is_newer("1.0.0", "1.0.0"), Ok(false));
        assert_eq!(is_newer("v0.4.2", "0.4.2"), Ok(false));
        assert_eq!(is_newer("1.0.0+build.1", "1.0.0+build.2"), Ok(false));
    }

    #[test]
    fn leading_v_is_accepted() {
        assert_eq!(is_newer("v1.0.0", "v1.0.1"), Ok(true));
        let parsed = parse_version("V2.1").expect("tag should parse");
        assert_eq!(parsed, parse_version("2.1.0").expect("tag should parse"));
        assert_eq!(parsed.to_string(), "2.1");
        assert!(!parsed.is_prerelease());
    }

    #[test]
    fn ordering_is_antisymmetric_for_distinct_versions() {
        let versions = [
            "0.1.0",
            "0.9.9",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-beta",
            "1.0.0",
            "1.0.0.1",
            "1.0.1",
            "1.2",
            "1.10.0",
            "2.0.0-rc.1",
            "v2.0.0",
        ];

        for a in versions {
            assert_eq!(is_newer(a, a), Ok(false), "{a} should not be newer than itself");
            for b in versions {
                let forward = is_newer(a, b).expect("well-formed versions should compare");
                let backward = is_newer(b, a).expect("well-formed versions should compare");
                let equal = parse_version(a) == parse_version(b);
                assert!(
                    forward == !backward || equal,
                    "ordering of {a} and {b} is not antisymmetric"
                );
            }
        }
    }

    #[test]
    fn invalid_versions_are_rejected() {
        for tag in [
            "", "latest", "1.x", "1.2.3.x", "..", "1..2", "v", "1.2.3-", "1.2.3+", "1.2.",
            "-beta",
        ] {
            assert!(
                matches!(parse_version(tag), Err(VersionError::InvalidFormat { .. })),
                "'{tag}' should be rejected"
            );
        }

        assert_eq!(
            is_newer("1.0.0", "nightly"),
            Err(VersionError::InvalidFormat {
                version: "nightly".to_string()
            })
        );
        assert!(is_newer("garbage", "1.0.0").is_err());
    }
}
