//! Shared fakes for the pipeline integration tests
//!
//! - [`PagedMemorySource`]: a document store that serves records in pages
//! - [`RecordingExecutor`]: a statement executor that keeps every statement
//!   and can be told to fail on a given call

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use edusync::clock::FixedClock;
use edusync::record::RawRecord;
use edusync::sink::{ExecutorError, InsertStatement, StatementExecutor};
use edusync::source::{PagedScan, ScanPage, SourceReader};
use edusync::{Result, SyncError};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,edusync=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn record(value: Value) -> RawRecord {
    RawRecord::new(value.as_object().cloned().expect("record fixture must be an object"))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Clock pinned to noon UTC on the given day.
pub fn clock_on(y: i32, m: u32, d: u32) -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap())
}

/// Serves fixed pages; page `i`'s cursor is `i`.
pub struct PagedMemorySource {
    pages: Vec<Vec<RawRecord>>,
    unavailable: bool,
    pages_served: AtomicUsize,
}

impl PagedMemorySource {
    pub fn new(pages: Vec<Vec<RawRecord>>) -> SourceReader<Self> {
        SourceReader::new(Self {
            pages,
            unavailable: false,
            pages_served: AtomicUsize::new(0),
        })
    }

    pub fn single_page(records: Vec<RawRecord>) -> SourceReader<Self> {
        Self::new(vec![records])
    }

    pub fn unavailable() -> SourceReader<Self> {
        SourceReader::new(Self {
            pages: Vec::new(),
            unavailable: true,
            pages_served: AtomicUsize::new(0),
        })
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PagedScan for PagedMemorySource {
    type Cursor = usize;

    fn collection(&self) -> &str {
        "registrations"
    }

    async fn scan_page(&self, cursor: Option<usize>) -> Result<ScanPage<usize>> {
        if self.unavailable {
            return Err(SyncError::SourceUnavailable(
                "table registrations does not exist".into(),
            ));
        }

        let index = cursor.unwrap_or(0);
        self.pages_served.fetch_add(1, Ordering::SeqCst);

        Ok(ScanPage {
            items: self.pages.get(index).cloned().unwrap_or_default(),
            next: (index + 1 < self.pages.len()).then_some(index + 1),
        })
    }
}

/// Records statements; optionally fails the n-th `execute` call (1-based).
#[derive(Default)]
pub struct RecordingExecutor {
    pub executed: Vec<InsertStatement>,
    pub attempts: usize,
    pub fail_on_call: Option<usize>,
    pub fail_atomic: bool,
    pub committed_batches: usize,
}

impl RecordingExecutor {
    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }
}

#[async_trait]
impl StatementExecutor for RecordingExecutor {
    async fn execute(
        &mut self,
        statement: &InsertStatement,
    ) -> std::result::Result<u64, ExecutorError> {
        self.attempts += 1;
        if self.fail_on_call == Some(self.attempts) {
            return Err(ExecutorError::Statement(
                "injected fault: value too long for type character varying(20)".into(),
            ));
        }
        self.executed.push(statement.clone());
        Ok(1)
    }

    async fn execute_atomic(
        &mut self,
        statements: &[InsertStatement],
    ) -> std::result::Result<u64, ExecutorError> {
        self.attempts += statements.len();
        if self.fail_atomic {
            return Err(ExecutorError::Statement("injected fault inside transaction".into()));
        }
        self.executed.extend(statements.iter().cloned());
        self.committed_batches += 1;
        Ok(statements.len() as u64)
    }
}
