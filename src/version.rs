//! Version-string helpers shared across the pipeline.
//!
//! The canonical version id is the `"go"`-prefixed form (`go1.21.5`); user
//! input may omit the prefix or the patch component.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::errors::{Error, ErrorKind, Result};

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(go)?\d+\.\d+(\.\d+)?$").unwrap())
}

/// Accepts `1.21.5`, `go1.21.5`, and `1.21`; rejects everything else.
pub fn validate(version: &str) -> Result<()> {
    if version.trim().is_empty() {
        return Err(Error::new(ErrorKind::InvalidInput).with_message("version cannot be empty"));
    }
    if !version_re().is_match(version) {
        return Err(Error::new(ErrorKind::InvalidVersion).with_message(version));
    }
    Ok(())
}

/// Canonical `"go"`-prefixed form, e.g. `1.21.5` -> `go1.21.5`.
pub fn canonicalize(version: &str) -> String {
    if version.starts_with("go") {
        version.to_string()
    } else {
        format!("go{version}")
    }
}

/// Bare semantic version, e.g. `go1.21.5` -> `1.21.5`.
pub fn bare(version: &str) -> &str {
    version.strip_prefix("go").unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_forms() {
        for v in ["1.21.5", "go1.21.5", "1.21", "go1.21"] {
            assert!(validate(v).is_ok(), "{v} should validate");
        }
    }

    #[test]
    fn rejects_malformed_versions() {
        for v in ["", "  ", "go", "1", "1.21.5.9", "v1.21.5", "go1.21.x"] {
            assert!(validate(v).is_err(), "{v} should not validate");
        }
    }

    #[test]
    fn canonical_and_bare_are_inverses() {
        assert_eq!(canonicalize("1.21.5"), "go1.21.5");
        assert_eq!(canonicalize("go1.21.5"), "go1.21.5");
        assert_eq!(bare("go1.21.5"), "1.21.5");
        assert_eq!(bare("1.21.5"), "1.21.5");
    }
}
