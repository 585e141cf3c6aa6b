//! Deployment settings for the reference pipeline.
//!
//! Settings are plain JSON. Every field has a default that reproduces the
//! reference deployment, so an empty object is a valid configuration.

use crate::errors::StarflowError;
use crate::pipeline::DagDefaults;
use crate::storage::{JsonFormat, S3Location};
use crate::tasks::{QualityChecks, StagingConfig, DEFAULT_CONNECTION_ID, DEFAULT_CREDENTIALS_ID, DEFAULT_REGION};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One object-storage source and the staging table it lands in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    /// Staging table.
    pub table: String,
    /// Source bucket.
    pub s3_bucket: String,
    /// Key or prefix, may contain date placeholders.
    pub s3_key: String,
    /// JSON column mapping.
    #[serde(default)]
    pub json_format: JsonFormat,
}

impl SourceSettings {
    /// The reference event-log source.
    #[must_use]
    pub fn events() -> Self {
        Self {
            table: "staging_events".to_string(),
            s3_bucket: "udacity-dend".to_string(),
            s3_key: "log_data".to_string(),
            json_format: JsonFormat::JsonPaths("s3://udacity-dend/log_json_path.json".to_string()),
        }
    }

    /// The reference song-metadata source.
    #[must_use]
    pub fn songs() -> Self {
        Self {
            table: "staging_songs".to_string(),
            s3_bucket: "udacity-dend".to_string(),
            s3_key: "song_data".to_string(),
            json_format: JsonFormat::Auto,
        }
    }

    /// Returns the source location.
    #[must_use]
    pub fn location(&self) -> S3Location {
        S3Location::new(&self.s3_bucket, &self.s3_key)
    }
}

/// Everything needed to declare the reference pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// DAG id, attached to run identities.
    pub dag_id: String,
    /// Human-readable description.
    pub description: String,
    /// Warehouse connection id used by every task.
    pub connection_id: String,
    /// Credential id for the staging buckets.
    pub credentials_id: String,
    /// Region of the staging buckets.
    pub region: String,
    /// Event-log source.
    pub events: SourceSettings,
    /// Song-metadata source.
    pub songs: SourceSettings,
    /// `insert_mode` for every dimension loader (`true` appends).
    pub dimension_insert_mode: bool,
    /// Checks run after the dimension loads.
    pub quality_checks: QualityChecks,
    /// DAG-level defaults (retries, schedule, ...).
    pub defaults: DagDefaults,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            dag_id: "Sparkify airflow pipeline".to_string(),
            description: "Load and transform data in Redshift with Airflow".to_string(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            credentials_id: DEFAULT_CREDENTIALS_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            events: SourceSettings::events(),
            songs: SourceSettings::songs(),
            dimension_insert_mode: false,
            quality_checks: crate::sparkify::default_quality_checks(),
            defaults: DagDefaults::default(),
        }
    }
}

impl PipelineSettings {
    /// Parses and validates settings from JSON.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed JSON, unknown fields or
    /// invalid values.
    pub fn from_json_str(json: &str) -> Result<Self, StarflowError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| StarflowError::config(format!("Invalid pipeline settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise as
    /// [`PipelineSettings::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, StarflowError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded pipeline settings");
        Self::from_json_str(&raw)
    }

    /// Staging parameters for the event-log source.
    #[must_use]
    pub fn events_staging(&self) -> StagingConfig {
        self.staging_config(&self.events)
    }

    /// Staging parameters for the song-metadata source.
    #[must_use]
    pub fn songs_staging(&self) -> StagingConfig {
        self.staging_config(&self.songs)
    }

    fn staging_config(&self, source: &SourceSettings) -> StagingConfig {
        StagingConfig::new(&source.table, &source.s3_bucket, &source.s3_key)
            .with_json_format(source.json_format.clone())
            .with_region(&self.region)
            .with_connection_id(&self.connection_id)
            .with_credentials_id(&self.credentials_id)
    }

    /// Checks values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first invalid value.
    pub fn validate(&self) -> Result<(), StarflowError> {
        if self.dag_id.trim().is_empty() {
            return Err(StarflowError::config("dag_id cannot be empty"));
        }
        self.events_staging().validate()?;
        self.songs_staging().validate()?;
        if self.events.table == self.songs.table {
            return Err(StarflowError::config(format!(
                "events and songs cannot share staging table '{}'",
                self.events.table
            )));
        }
        Ok(())
    }
}
