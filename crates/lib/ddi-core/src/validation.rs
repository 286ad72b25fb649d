//! Input checks applied before anything reaches the remote API.

use std::sync::LazyLock;
use std::{error::Error, fmt};

use ddi_store::schema::ATTRIBUTE_PREFIX;
use regex::{Regex, RegexBuilder};

pub const MAX_RESOURCE_TYPE_LEN: usize = 100;
pub const MAX_ATTRIBUTE_NAME_LEN: usize = 50;
pub const MAX_FILTER_VALUE_LEN: usize = 1000;

static RESOURCE_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_:]+$").expect("resource type pattern is valid"));

static ATTRIBUTE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("attribute name pattern is valid"));

static SHELL_METACHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;|&$()`]").expect("metacharacter pattern is valid"));

// Regex values need `$ | ( )`; command separators and substitution stay out.
static REGEX_VALUE_METACHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;&`]|\$\(").expect("regex value pattern is valid"));

static FORBIDDEN_MARKER_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\.\./\.\.", r"<script", r"javascript:", r"on\w+\s*="]
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("forbidden value pattern is valid")
        })
        .collect()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.message)
    }
}

impl Error for ValidationError {}

/// Checks a resource type name such as `network` or `record:a`.
///
/// # Errors
/// Returns `ValidationError` when the name is empty, too long, or has
/// characters outside `[a-z0-9_:]`.
pub fn validate_resource_type(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("resource type", "must not be empty"));
    }
    if name.len() > MAX_RESOURCE_TYPE_LEN {
        return Err(ValidationError::new(
            "resource type",
            format!("exceeds {MAX_RESOURCE_TYPE_LEN} characters"),
        ));
    }
    if !RESOURCE_TYPE_RE.is_match(name) {
        return Err(ValidationError::new(
            "resource type",
            format!("{name:?} may only contain lowercase letters, digits, '_' and ':'"),
        ));
    }
    Ok(())
}

/// Checks an attribute name, with or without its `*` prefix.
///
/// Returns the bare name.
///
/// # Errors
/// Returns `ValidationError` when the bare name is empty, too long, or has
/// disallowed characters.
pub fn validate_attribute_name(name: &str) -> Result<&str, ValidationError> {
    let bare = name.strip_prefix(ATTRIBUTE_PREFIX).unwrap_or(name);
    if bare.is_empty() {
        return Err(ValidationError::new("attribute name", "must not be empty"));
    }
    if bare.len() > MAX_ATTRIBUTE_NAME_LEN {
        return Err(ValidationError::new(
            "attribute name",
            format!("exceeds {MAX_ATTRIBUTE_NAME_LEN} characters"),
        ));
    }
    if !ATTRIBUTE_NAME_RE.is_match(bare) {
        return Err(ValidationError::new(
            "attribute name",
            format!("{bare:?} may only contain letters, digits, '_' and '-'"),
        ));
    }
    Ok(bare)
}

/// Rejects filter values that carry shell metacharacters, path traversal,
/// or script markers.
///
/// # Errors
/// Returns `ValidationError` naming `key` when the value is rejected.
pub fn validate_filter_value(key: &str, value: &str) -> Result<(), ValidationError> {
    check_value(key, value, &SHELL_METACHAR_RE)
}

/// Like [`validate_filter_value`], but admits the regex syntax `$`, `|`, `(`
/// and `)` so values such as `^(HQ|Lab)$` pass. `$(` is still rejected.
///
/// # Errors
/// Returns `ValidationError` naming `key` when the value is rejected.
pub fn validate_regex_filter_value(key: &str, value: &str) -> Result<(), ValidationError> {
    check_value(key, value, &REGEX_VALUE_METACHAR_RE)
}

fn check_value(key: &str, value: &str, metachars: &Regex) -> Result<(), ValidationError> {
    if value.len() > MAX_FILTER_VALUE_LEN {
        return Err(ValidationError::new(
            format!("filter {key}"),
            format!("exceeds {MAX_FILTER_VALUE_LEN} characters"),
        ));
    }
    if metachars.is_match(value) || FORBIDDEN_MARKER_RES.iter().any(|re| re.is_match(value)) {
        return Err(ValidationError::new(
            format!("filter {key}"),
            "contains forbidden characters or patterns",
        ));
    }
    Ok(())
}

/// Checks an opaque object reference.
///
/// # Errors
/// Returns `ValidationError` when the reference is blank or contains `..`.
pub fn validate_reference(reference: &str) -> Result<(), ValidationError> {
    if reference.trim().is_empty() {
        return Err(ValidationError::new("reference", "must not be empty"));
    }
    if reference.contains("..") {
        return Err(ValidationError::new("reference", "must not contain '..'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_types_allow_namespaced_names() {
        assert!(validate_resource_type("record:a").is_ok());
        assert!(validate_resource_type("zone_auth").is_ok());
        assert!(validate_resource_type("Network").is_err());
        assert!(validate_resource_type("network;rm").is_err());
        assert!(validate_resource_type(&"a".repeat(101)).is_err());
    }

    #[test]
    fn attribute_names_strip_prefix() {
        assert_eq!(validate_attribute_name("*MARSHA"), Ok("MARSHA"));
        assert_eq!(validate_attribute_name("Site-Code"), Ok("Site-Code"));
        assert!(validate_attribute_name("*").is_err());
        assert!(validate_attribute_name("bad name").is_err());
    }

    #[test]
    fn filter_values_reject_injection_markers() {
        assert!(validate_filter_value("name", "web01.example.com").is_ok());
        assert!(validate_filter_value("*Site", "^HQ.*").is_ok());
        for bad in [
            "a; rm -rf /",
            "$(whoami)",
            "../../etc/passwd",
            "<SCRIPT>alert(1)</script>",
            "JavaScript:alert(1)",
            "x onload = y",
        ] {
            assert!(validate_filter_value("name", bad).is_err(), "{bad} should be rejected");
        }
        assert!(validate_filter_value("name", &"x".repeat(1001)).is_err());
    }

    #[test]
    fn regex_values_admit_anchors_and_alternation() {
        assert!(validate_filter_value("*Site~", "^(HQ|Lab)$").is_err());
        assert!(validate_regex_filter_value("*Site~", "^(HQ|Lab)$").is_ok());
        assert!(validate_regex_filter_value("name~", "web[0-9]+$").is_ok());
        for bad in ["$(whoami)", "a; rm -rf /", "x && y", "`id`", "<script>"] {
            assert!(validate_regex_filter_value("name~", bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn references_reject_traversal() {
        assert!(validate_reference("network/ZG5zLm5ldHdvcmskMTAuMC4wLjAvMjQvMA:10.0.0.0/24/default").is_ok());
        assert!(validate_reference("  ").is_err());
        assert!(validate_reference("network/../grid").is_err());
    }
}
