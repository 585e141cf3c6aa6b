//! Credential redaction for logged SQL.

use regex::Regex;
use std::sync::OnceLock;

const REDACTED: &str = "'***'";

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(ACCESS_KEY_ID|SECRET_ACCESS_KEY|SESSION_TOKEN|CREDENTIALS)(\s+)'[^']*'")
            .unwrap_or_else(|e| unreachable!("credential pattern is valid: {e}"))
    })
}

/// Replaces quoted credential literals in a statement with `'***'`.
#[must_use]
pub fn redact_credentials(sql: &str) -> String {
    credential_pattern()
        .replace_all(sql, format!("${{1}}${{2}}{REDACTED}").as_str())
        .into_owned()
}
