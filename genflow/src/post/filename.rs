//! Download file naming.

use regex::Regex;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").expect("filename pattern is valid"));

/// Replaces every character that is not an ASCII letter or digit with `_`.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    UNSAFE_CHARS.replace_all(value, "_").into_owned()
}

/// Builds `{name}_{organization}_{role}_Resume.pdf` from sanitized parts.
#[must_use]
pub fn document_filename(name: &str, organization: &str, role: &str) -> String {
    format!(
        "{}_{}_{}_Resume.pdf",
        sanitize_component(name),
        sanitize_component(organization),
        sanitize_component(role)
    )
}
