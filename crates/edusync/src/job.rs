//! Orchestrator: one extract → filter → load cycle
//!
//! Steps run strictly in sequence and every error propagates. There is no
//! retry and no partial summary; a failed run is meant to be re-run whole.

use edusync_common::{Result, SyncError};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::clock::Clock;
use crate::config::{PipelineVariant, SyncConfig};
use crate::dates::resolve_target_date;
use crate::filter::filter_updated_day_before;
use crate::sink::{DryRunExecutor, PgExecutor, SinkWriter, StatementExecutor};
use crate::source::{DocumentSource, DynamoDbSource};

/// What a successful invocation reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Resolved target date, `YYYY-MM-DD`
    #[serde(rename = "executionDate")]
    pub execution_date: String,

    /// `rows inserted: <count>` with thousands separators
    pub message: String,

    /// Top-level keys of the invocation payload
    pub debug: Vec<String>,

    #[serde(skip)]
    pub rows_inserted: u64,
}

impl SyncSummary {
    fn new(execution_date: chrono::NaiveDate, rows_inserted: u64, keys: Vec<String>) -> Self {
        Self {
            execution_date: execution_date.to_string(),
            message: format!("rows inserted: {}", group_thousands(rows_inserted)),
            debug: keys,
            rows_inserted,
        }
    }
}

/// `1234567` → `1,234,567`
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// The pipeline with its collaborators injected.
pub struct SyncJob<'a> {
    source: &'a dyn DocumentSource,
    clock: &'a dyn Clock,
    writer: SinkWriter,
    variant: PipelineVariant,
}

impl<'a> SyncJob<'a> {
    pub fn new(
        source: &'a dyn DocumentSource,
        clock: &'a dyn Clock,
        writer: SinkWriter,
        variant: PipelineVariant,
    ) -> Self {
        Self {
            source,
            clock,
            writer,
            variant,
        }
    }

    /// Run one cycle for `payload`, writing through `executor`.
    #[instrument(skip_all, fields(variant = ?self.variant, mode = ?self.writer.mode()))]
    pub async fn run<E>(&self, payload: &Value, executor: &mut E) -> Result<SyncSummary>
    where
        E: StatementExecutor + ?Sized,
    {
        let payload = payload.as_object().ok_or_else(|| {
            SyncError::InvalidPayload(format!("expected a JSON object, got {}", payload))
        })?;
        let keys: Vec<String> = payload.keys().cloned().collect();
        let target = resolve_target_date(payload, self.clock);

        info!(target_date = %target, "Starting sync");

        let records = self.source.scan_all().await?;

        let rows = match self.variant {
            PipelineVariant::Filtered => {
                let (fresh, _) = filter_updated_day_before(records, target)?;
                self.writer.write(&fresh, executor).await?
            },
            PipelineVariant::Full => self.writer.write(&records, executor).await?,
        };

        let summary = SyncSummary::new(target, rows, keys);
        info!(
            execution_date = %summary.execution_date,
            message = %summary.message,
            "Sync finished"
        );

        Ok(summary)
    }
}

/// Production wiring: DynamoDB in, PostgreSQL out.
///
/// The connection is closed whether the run succeeds or fails.
pub async fn run_job(
    config: &SyncConfig,
    payload: &Value,
    clock: &dyn Clock,
) -> Result<SyncSummary> {
    let writer = SinkWriter::from_config(config)?;
    let source = DynamoDbSource::from_config(&config.source).await;
    let mut executor = PgExecutor::connect(&config.sink).await?;

    let job = SyncJob::new(&source, clock, writer, config.pipeline.variant);
    let result = job.run(payload, &mut executor).await;

    executor.close().await;
    result
}

/// Same as [`run_job`] but statements are rendered instead of executed.
pub async fn run_dry(
    config: &SyncConfig,
    payload: &Value,
    clock: &dyn Clock,
) -> Result<(SyncSummary, DryRunExecutor)> {
    let writer = SinkWriter::from_config(config)?;
    let source = DynamoDbSource::from_config(&config.source).await;
    let mut executor = DryRunExecutor::new();

    let summary = SyncJob::new(&source, clock, writer, config.pipeline.variant)
        .run(payload, &mut executor)
        .await?;

    Ok((summary, executor))
}
