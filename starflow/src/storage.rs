//! Object-storage source locations for bulk-copy loads.

use crate::errors::StarflowError;
use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

const PLACEHOLDERS: &[&str] = &["ds", "execution_date", "year", "month", "day"];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_]+)\}")
            .unwrap_or_else(|e| unreachable!("placeholder pattern is valid: {e}"))
    })
}

/// A bucket plus key prefix, rendered as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Location {
    /// Bucket name.
    pub bucket: String,
    /// Key or key prefix. May contain date placeholders, see [`S3Location::render`].
    pub key: String,
}

impl S3Location {
    /// Creates a location.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Checks the bucket is set and the key only uses known placeholders.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<(), StarflowError> {
        if self.bucket.trim().is_empty() {
            return Err(StarflowError::config("S3 bucket cannot be empty"));
        }
        if self.bucket.contains('/') {
            return Err(StarflowError::config(format!(
                "S3 bucket '{}' must not contain '/'",
                self.bucket
            )));
        }
        for caps in placeholder_pattern().captures_iter(&self.key) {
            let name = &caps[1];
            if !PLACEHOLDERS.contains(&name) {
                return Err(StarflowError::config(format!(
                    "Unknown placeholder '{{{name}}}' in S3 key '{}'; supported: {}",
                    self.key,
                    PLACEHOLDERS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Renders the key for a logical run date.
    ///
    /// Supported placeholders: `{ds}` (`YYYY-MM-DD`), `{execution_date}`
    /// (RFC 3339), `{year}`, `{month}` and `{day}` (zero padded).
    #[must_use]
    pub fn render(&self, logical_date: DateTime<Utc>) -> Self {
        let key = placeholder_pattern().replace_all(&self.key, |caps: &regex::Captures<'_>| {
            match &caps[1] {
                "ds" => logical_date.format("%Y-%m-%d").to_string(),
                "execution_date" => logical_date.to_rfc3339(),
                "year" => logical_date.year().to_string(),
                "month" => format!("{:02}", logical_date.month()),
                "day" => format!("{:02}", logical_date.day()),
                other => format!("{{{other}}}"),
            }
        });

        Self {
            bucket: self.bucket.clone(),
            key: key.into_owned(),
        }
    }

    /// Returns the `s3://bucket/key` form.
    #[must_use]
    pub fn uri(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for S3Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key.trim_start_matches('/'))
    }
}

/// How the warehouse should map JSON documents onto table columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JsonFormat {
    /// Match JSON keys to column names automatically.
    #[default]
    Auto,
    /// Use a JSONPaths mapping file at the given location.
    JsonPaths(String),
}

impl From<String> for JsonFormat {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("auto") {
            Self::Auto
        } else {
            Self::JsonPaths(value)
        }
    }
}

impl From<&str> for JsonFormat {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<JsonFormat> for String {
    fn from(value: JsonFormat) -> Self {
        value.to_string()
    }
}

impl fmt::Display for JsonFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::JsonPaths(path) => write!(f, "{path}"),
        }
    }
}
