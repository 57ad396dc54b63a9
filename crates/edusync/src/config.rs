//! Configuration management
//!
//! Built once when an invocation starts and handed to the source and sink by
//! reference. Nothing below the CLI reads the process environment.

use edusync_common::{Result, SyncError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Defaults
// ============================================================================

/// DynamoDB table holding the registrations.
pub const DEFAULT_SOURCE_TABLE: &str = "elsa-registrations-resources-prod-registrations-2019";

pub const DEFAULT_DB_PORT: u16 = 5432;

pub const DEFAULT_DB_NAME: &str = "postgres";

/// Destination table for structured mode.
pub const DEFAULT_STRUCTURED_TABLE: &str = "educator_signups";

/// Destination table for raw mode.
pub const DEFAULT_RAW_TABLE: &str = "educator_signups_raw";

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

/// Which pipeline shape a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    /// Keep only records last updated the day before the target date.
    #[default]
    Filtered,
    /// Load every scanned record.
    Full,
}

impl FromStr for PipelineVariant {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "filtered" | "a" => Ok(PipelineVariant::Filtered),
            "full" | "b" => Ok(PipelineVariant::Full),
            other => Err(SyncError::Config(format!("Invalid SYNC_VARIANT: {}", other))),
        }
    }
}

/// How a record becomes a relational row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Seven typed columns.
    Structured,
    /// One JSON text column.
    Raw,
}

impl WriteMode {
    pub fn default_table(self) -> &'static str {
        match self {
            WriteMode::Structured => DEFAULT_STRUCTURED_TABLE,
            WriteMode::Raw => DEFAULT_RAW_TABLE,
        }
    }
}

impl FromStr for WriteMode {
    type Err = SyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" | "columns" => Ok(WriteMode::Structured),
            "raw" | "json" => Ok(WriteMode::Raw),
            other => Err(SyncError::Config(format!("Invalid SYNC_WRITE_MODE: {}", other))),
        }
    }
}

/// Full job configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
    pub pipeline: PipelineOptions,
}

/// Document store connection settings
#[derive(Clone)]
pub struct SourceConfig {
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Endpoint override, e.g. a local DynamoDB
    pub endpoint: Option<String>,
    pub table: String,
}

/// Relational store connection settings
#[derive(Clone)]
pub struct SinkConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub table: String,
}

/// Per-deployment pipeline behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub variant: PipelineVariant,
    pub write_mode: WriteMode,
    /// Write all rows in one transaction instead of row by row
    pub atomic: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            variant: PipelineVariant::Filtered,
            write_mode: WriteMode::Structured,
            atomic: false,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("region", &self.region)
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("table", &self.table)
            .finish()
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("table", &self.table)
            .finish()
    }
}

/// Collects values and remembers which required ones were absent.
struct VarReader<F> {
    lookup: F,
    missing: Vec<&'static str>,
}

impl<F> VarReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|key| (self.lookup)(*key).filter(|v| !v.trim().is_empty()))
    }

    fn required(&mut self, keys: &[&'static str]) -> String {
        match self.optional(keys) {
            Some(value) => value,
            None => {
                self.missing.push(keys[0]);
                String::new()
            },
        }
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.optional(&[key]) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| SyncError::Config(format!("{} is not valid: {:?}", key, raw))),
            None => Ok(default),
        }
    }
}

impl SyncConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// Every absent credential is reported in one `Config` error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = VarReader {
            lookup,
            missing: Vec::new(),
        };

        let variant: PipelineVariant = vars
            .optional(&["SYNC_VARIANT"])
            .map(|v| v.parse::<PipelineVariant>())
            .transpose()?
            .unwrap_or_default();
        let write_mode = match vars.optional(&["SYNC_WRITE_MODE"]) {
            Some(mode) => mode.parse::<WriteMode>()?,
            None => match variant {
                PipelineVariant::Filtered => WriteMode::Structured,
                PipelineVariant::Full => WriteMode::Raw,
            },
        };
        let atomic = vars.parsed("SYNC_ATOMIC", false)?;

        let source = SourceConfig {
            region: vars.required(&["REGION_NAME", "AWS_REGION"]),
            access_key: vars.required(&["ACCESS_KEY", "AWS_ACCESS_KEY_ID"]),
            secret_key: vars.required(&["SECRET_KEY", "AWS_SECRET_ACCESS_KEY"]),
            endpoint: vars.optional(&["DYNAMODB_ENDPOINT"]),
            table: vars
                .optional(&["SOURCE_TABLE"])
                .unwrap_or_else(|| DEFAULT_SOURCE_TABLE.to_string()),
        };

        let sink = SinkConfig {
            host: vars.required(&["DB_HOST"]),
            port: vars.parsed("DB_PORT", DEFAULT_DB_PORT)?,
            database: vars
                .optional(&["DB_NAME"])
                .unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            user: vars.required(&["DB_USER"]),
            password: vars.required(&["DB_PASSWORD"]),
            table: vars
                .optional(&["SINK_TABLE"])
                .unwrap_or_else(|| write_mode.default_table().to_string()),
        };

        if !vars.missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing required variables: {}",
                vars.missing.join(", ")
            )));
        }

        let config = SyncConfig {
            source,
            sink,
            pipeline: PipelineOptions {
                variant,
                write_mode,
                atomic,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.sink.port == 0 {
            return Err(SyncError::Config("DB_PORT must be greater than 0".into()));
        }

        if self.source.table.trim().is_empty() {
            return Err(SyncError::Config("SOURCE_TABLE cannot be empty".into()));
        }

        validate_identifier(&self.sink.table)?;

        Ok(())
    }

    /// Effective configuration with secrets masked, for display.
    pub fn redacted(&self) -> serde_json::Value {
        json!({
            "source": {
                "region": self.source.region,
                "endpoint": self.source.endpoint,
                "table": self.source.table,
                "access_key": "***",
                "secret_key": "***",
            },
            "sink": {
                "host": self.sink.host,
                "port": self.sink.port,
                "database": self.sink.database,
                "user": self.sink.user,
                "password": "***",
                "table": self.sink.table,
            },
            "pipeline": self.pipeline,
        })
    }
}

/// Table names end up in statement text, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let pattern = Regex::new(IDENTIFIER_PATTERN)
        .map_err(|e| SyncError::Config(format!("identifier pattern: {}", e)))?;

    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(SyncError::Config(format!("SINK_TABLE is not a valid identifier: {:?}", name)))
    }
}
