//! Bulk-copy of raw JSON from object storage into a staging table.

use super::{delete_statement, require_non_empty, Task, DEFAULT_CONNECTION_ID, DEFAULT_CREDENTIALS_ID, DEFAULT_REGION};
use crate::context::{ExecutionContext, TaskContext};
use crate::core::{TaskKind, TaskOutput};
use crate::credentials::AwsCredentials;
use crate::errors::StarflowError;
use crate::observability::redact_credentials;
use crate::storage::{JsonFormat, S3Location};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

/// Parameters of a [`StagingLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingConfig {
    /// Destination staging table.
    pub table: String,
    /// Source bucket.
    pub s3_bucket: String,
    /// Source key or prefix; may contain date placeholders.
    pub s3_key: String,
    /// JSON column mapping.
    #[serde(default)]
    pub json_format: JsonFormat,
    /// Bucket region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Warehouse connection id.
    #[serde(default = "default_connection_id")]
    pub connection_id: String,
    /// Credential id for the bucket.
    #[serde(default = "default_credentials_id")]
    pub credentials_id: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_connection_id() -> String {
    DEFAULT_CONNECTION_ID.to_string()
}

fn default_credentials_id() -> String {
    DEFAULT_CREDENTIALS_ID.to_string()
}

impl StagingConfig {
    /// Creates a config with default format, region, connection and credentials.
    #[must_use]
    pub fn new(table: impl Into<String>, s3_bucket: impl Into<String>, s3_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            s3_bucket: s3_bucket.into(),
            s3_key: s3_key.into(),
            json_format: JsonFormat::Auto,
            region: default_region(),
            connection_id: default_connection_id(),
            credentials_id: default_credentials_id(),
        }
    }

    /// Sets the JSON format.
    #[must_use]
    pub fn with_json_format(mut self, json_format: impl Into<JsonFormat>) -> Self {
        self.json_format = json_format.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the connection id.
    #[must_use]
    pub fn with_connection_id(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Sets the credential id.
    #[must_use]
    pub fn with_credentials_id(mut self, credentials_id: impl Into<String>) -> Self {
        self.credentials_id = credentials_id.into();
        self
    }

    fn source(&self) -> S3Location {
        S3Location::new(&self.s3_bucket, &self.s3_key)
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty table, bucket or region,
    /// or an unsupported key placeholder.
    pub fn validate(&self) -> Result<(), StarflowError> {
        require_non_empty("Staging table", &self.table)?;
        require_non_empty("Region", &self.region)?;
        require_non_empty("Connection id", &self.connection_id)?;
        require_non_empty("Credentials id", &self.credentials_id)?;
        self.source().validate()
    }
}

/// Replaces a staging table's contents with the records under an
/// object-storage prefix.
///
/// Runs `DELETE FROM <table>` followed by a warehouse `COPY`. The two
/// statements are separate; a failed copy leaves the table empty until the
/// retry succeeds.
#[derive(Debug, Clone)]
pub struct StagingLoader {
    name: String,
    config: StagingConfig,
}

impl StagingLoader {
    /// Creates a loader.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    pub fn new(name: impl Into<String>, config: StagingConfig) -> Result<Self, StarflowError> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            config,
        })
    }

    /// Returns the loader's parameters.
    #[must_use]
    pub fn config(&self) -> &StagingConfig {
        &self.config
    }

    /// Returns the source location rendered for a logical date.
    #[must_use]
    pub fn source_for(&self, logical_date: chrono::DateTime<chrono::Utc>) -> S3Location {
        self.config.source().render(logical_date)
    }

    /// Builds the `COPY` statement for a rendered source.
    #[must_use]
    pub fn copy_statement(&self, source: &S3Location, credentials: &AwsCredentials) -> String {
        format!(
            "COPY {}\nFROM '{}'\nACCESS_KEY_ID '{}'\nSECRET_ACCESS_KEY '{}'\nREGION AS '{}'\nFORMAT AS json '{}';",
            self.config.table,
            source.uri(),
            credentials.access_key,
            credentials.secret_key,
            self.config.region,
            self.config.json_format,
        )
    }
}

#[async_trait]
impl Task for StagingLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Staging
    }

    fn connection_ids(&self) -> Vec<&str> {
        vec![self.config.connection_id.as_str()]
    }

    fn credential_ids(&self) -> Vec<&str> {
        vec![self.config.credentials_id.as_str()]
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, StarflowError> {
        let warehouse = ctx.warehouse(&self.config.connection_id)?;
        let credentials = ctx.credentials(&self.config.credentials_id).await?;
        let source = self.source_for(ctx.logical_date());

        info!(task = %self.name, table = %self.config.table, "Clearing data from destination table");
        let deleted = warehouse.run(&delete_statement(&self.config.table)).await?;

        info!(task = %self.name, table = %self.config.table, source = %source, "Copying data from object storage");
        let copy = self.copy_statement(&source, &credentials);
        debug!(statement = %redact_credentials(&copy), "Running COPY");
        let copied = warehouse.run(&copy).await?;

        info!(task = %self.name, table = %self.config.table, rows = copied, "Staging load complete");
        Ok(TaskOutput::ok_value("rows_loaded", json!(copied))
            .with_value("rows_deleted", json!(deleted))
            .with_value("source", json!(source.uri())))
    }
}
