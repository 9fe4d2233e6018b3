//! Kubernetes version parsing and normalisation.

use semver::Version;

use crate::error::{Result, UpgradeError};

/// Parse a Kubernetes version string.
///
/// Accepts an optional leading `v` and the two-component form used by some
/// catalogs (`1.31` is read as `1.31.0`).
pub fn parse(version: &str) -> Result<Version> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let normalized = if trimmed.split('.').count() == 2 {
        format!("{trimmed}.0")
    } else {
        trimmed.to_string()
    };

    Version::parse(&normalized).map_err(|_| UpgradeError::InvalidVersion(version.to_string()))
}

/// Render a version the way kubelet, kube-proxy and the API server report it.
pub fn runtime_version(version: &str) -> Result<String> {
    Ok(format!("v{}", parse(version)?))
}

/// Returns true if `candidate` is exactly one minor release above `current`.
pub fn is_consecutive_minor(current: &Version, candidate: &Version) -> bool {
    candidate.major == current.major && current.minor.checked_add(1) == Some(candidate.minor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_version() {
        let v = parse("1.24.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 24, 3));
    }

    #[test]
    fn test_parse_strips_v_prefix() {
        assert_eq!(parse("v1.25.0").unwrap(), parse("1.25.0").unwrap());
    }

    #[test]
    fn test_parse_two_components() {
        assert_eq!(parse("1.31").unwrap(), Version::new(1, 31, 0));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            parse("invalid"),
            Err(UpgradeError::InvalidVersion(_))
        ));
        assert!(parse("").is_err());
        assert!(parse("1").is_err());
    }

    #[test]
    fn test_runtime_version() {
        assert_eq!(runtime_version("1.24").unwrap(), "v1.24.0");
        assert_eq!(runtime_version("v1.26.7").unwrap(), "v1.26.7");
    }

    #[test]
    fn test_is_consecutive_minor() {
        let current = Version::new(1, 24, 9);
        assert!(is_consecutive_minor(&current, &Version::new(1, 25, 0)));
        assert!(is_consecutive_minor(&current, &Version::new(1, 25, 4)));
        assert!(!is_consecutive_minor(&current, &Version::new(1, 26, 0)));
        assert!(!is_consecutive_minor(&current, &Version::new(1, 24, 10)));
        assert!(!is_consecutive_minor(&current, &Version::new(2, 25, 0)));
    }

    #[test]
    fn test_is_consecutive_minor_at_max_minor() {
        let current = Version::new(1, u64::MAX, 0);
        assert!(!is_consecutive_minor(&current, &Version::new(1, 0, 0)));
        assert!(!is_consecutive_minor(&current, &Version::new(1, u64::MAX, 1)));
    }
}
