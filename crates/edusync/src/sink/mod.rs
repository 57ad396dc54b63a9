//! Sink Writer: one relational row per record
//!
//! Records become [`InsertStatement`]s whose values travel as bound
//! parameters, so quotes in names or addresses never reach the statement
//! text. The dry-run executor is the one place values are spliced in as
//! literals, and it doubles every `'` when it does.
//!
//! Two write strategies:
//!
//! - **Row by row** (default): each insert is its own statement. A failure
//!   stops the loop; rows already written stay written and the error carries
//!   their count.
//! - **Atomic**: every statement is built first, then all are written in one
//!   transaction. A failure leaves nothing behind.

use async_trait::async_trait;
use chrono::NaiveDate;
use edusync_common::{Result, SyncError};
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::config::{validate_identifier, SyncConfig, WriteMode};
use crate::dates::date_from_value;
use crate::record::{fields, SinkRecord};

pub mod dry_run;
pub mod postgres;

pub use dry_run::{quote_literal, render_sql, DryRunExecutor};
pub use postgres::PgExecutor;

/// Structured-mode columns, in bind order.
pub const STRUCTURED_COLUMNS: &[&str] = &[
    "full_name",
    "phone",
    "address",
    "school",
    "status",
    "created_at",
    "updated_at",
];

/// Raw-mode column.
pub const RAW_COLUMNS: &[&str] = &["raw_data"];

/// A value bound to one placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

/// `INSERT INTO <table> (<columns>) VALUES ($1, ..)` plus its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: &'static [&'static str],
    pub params: Vec<SqlParam>,
}

impl InsertStatement {
    /// Statement text with numbered placeholders.
    pub fn sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len())
            .map(|i| format!("${}", i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders.join(", ")
        )
    }
}

/// Failures reported by a statement executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The connection itself is gone or unusable.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected this statement.
    #[error("statement error: {0}")]
    Statement(String),
}

/// Runs insert statements against the relational store.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Execute one statement on its own. Returns rows affected.
    async fn execute(
        &mut self,
        statement: &InsertStatement,
    ) -> std::result::Result<u64, ExecutorError>;

    /// Execute all statements in a single transaction.
    async fn execute_atomic(
        &mut self,
        statements: &[InsertStatement],
    ) -> std::result::Result<u64, ExecutorError>;
}

/// Turns records into rows for one destination table.
#[derive(Debug, Clone)]
pub struct SinkWriter {
    table: String,
    mode: WriteMode,
    atomic: bool,
}

impl SinkWriter {
    pub fn new(table: impl Into<String>, mode: WriteMode, atomic: bool) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self {
            table,
            mode,
            atomic,
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(
            config.sink.table.clone(),
            config.pipeline.write_mode,
            config.pipeline.atomic,
        )
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Build the insert for one record.
    pub fn statement_for<R: SinkRecord>(&self, record: &R) -> Result<InsertStatement> {
        let (columns, params) = match self.mode {
            WriteMode::Structured => (STRUCTURED_COLUMNS, structured_params(record)?),
            WriteMode::Raw => (RAW_COLUMNS, vec![SqlParam::Text(Some(record.raw().to_json()?))]),
        };

        Ok(InsertStatement {
            table: self.table.clone(),
            columns,
            params,
        })
    }

    /// Write every record and return how many rows were inserted.
    #[instrument(
        skip_all,
        fields(
            table = %self.table,
            mode = ?self.mode,
            atomic = self.atomic,
            records = records.len()
        )
    )]
    pub async fn write<R, E>(&self, records: &[R], executor: &mut E) -> Result<u64>
    where
        R: SinkRecord + Sync,
        E: StatementExecutor + ?Sized,
    {
        let written = if self.atomic {
            self.write_atomic(records, executor).await?
        } else {
            self.write_each(records, executor).await?
        };

        info!(rows_written = written, "Sink write complete");
        Ok(written)
    }

    async fn write_each<R, E>(&self, records: &[R], executor: &mut E) -> Result<u64>
    where
        R: SinkRecord + Sync,
        E: StatementExecutor + ?Sized,
    {
        let mut written = 0u64;

        for record in records {
            let statement = self.statement_for(record).map_err(|e| {
                error!(rows_written = written, error = %e, "Could not build insert, aborting");
                e.after_rows(written)
            })?;

            match executor.execute(&statement).await {
                Ok(_) => {
                    written += 1;
                    debug!(rows_written = written, "Row inserted");
                },
                Err(e) => {
                    error!(
                        rows_written = written,
                        error = %e,
                        "Insert failed, abandoning remaining rows"
                    );
                    return Err(executor_failure(e, written));
                },
            }
        }

        Ok(written)
    }

    async fn write_atomic<R, E>(&self, records: &[R], executor: &mut E) -> Result<u64>
    where
        R: SinkRecord + Sync,
        E: StatementExecutor + ?Sized,
    {
        let statements = records
            .iter()
            .map(|record| self.statement_for(record))
            .collect::<Result<Vec<_>>>()?;

        if statements.is_empty() {
            return Ok(0);
        }

        executor.execute_atomic(&statements).await.map_err(|e| {
            error!(error = %e, "Transaction failed, nothing committed");
            executor_failure(e, 0)
        })?;

        Ok(statements.len() as u64)
    }
}

fn executor_failure(err: ExecutorError, rows_written: u64) -> SyncError {
    match err {
        ExecutorError::Connection(reason) => SyncError::SinkUnavailable(format!(
            "connection lost after {} row(s): {}",
            rows_written, reason
        )),
        ExecutorError::Statement(reason) => SyncError::SinkWriteFailed {
            rows_written,
            reason,
        },
    }
}

/// Absent text fields bind NULL. `createdAt` is parsed here even when the
/// filter already parsed `lastUpdatedAt`.
fn structured_params<R: SinkRecord>(record: &R) -> Result<Vec<SqlParam>> {
    let raw = record.raw();

    let created_at = raw
        .get(fields::CREATED_AT)
        .map(|v| date_from_value(fields::CREATED_AT, v))
        .transpose()?;

    let updated_at = match record.updated_on() {
        Some(day) => Some(day),
        None => raw
            .get(fields::LAST_UPDATED_AT)
            .map(|v| date_from_value(fields::LAST_UPDATED_AT, v))
            .transpose()?,
    };

    Ok(vec![
        SqlParam::Text(raw.text(fields::NAME)),
        SqlParam::Text(raw.text(fields::PHONE)),
        SqlParam::Text(raw.text(fields::ADDRESS)),
        SqlParam::Text(raw.text(fields::PRESCHOOL_ID)),
        SqlParam::Text(raw.text(fields::STATUS)),
        SqlParam::Date(created_at),
        SqlParam::Date(updated_at),
    ])
}
