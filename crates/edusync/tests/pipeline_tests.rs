//! End-to-end pipeline tests against in-memory collaborators
//!
//! Covers the full Reader -> Filter -> Writer -> summary path for both
//! variants, paging, and the failure modes that must abort a run.

mod common;

use common::{clock_on, date, init_tracing, record, PagedMemorySource, RecordingExecutor};
use edusync::config::{PipelineVariant, WriteMode};
use edusync::record::RawRecord;
use edusync::sink::{SinkWriter, SqlParam};
use edusync::{SyncError, SyncJob};
use serde_json::{json, Value};

fn structured_writer(atomic: bool) -> SinkWriter {
    SinkWriter::new("educator_signups", WriteMode::Structured, atomic).unwrap()
}

fn signup(name: &str, last_updated: &str) -> RawRecord {
    record(json!({
        "name": name,
        "phone": "555",
        "address": "1 St",
        "preschoolId": "P1",
        "status": "active",
        "createdAt": "2020-02-01T09:00:00Z",
        "lastUpdatedAt": last_updated,
    }))
}

#[tokio::test]
async fn test_single_matching_record_is_inserted() {
    init_tracing();

    let source = PagedMemorySource::single_page(vec![record(json!({
        "name": "A",
        "phone": "555",
        "address": "1 St",
        "preschoolId": "P1",
        "status": "active",
        "createdAt": "2020-03-15T10:00:00Z",
        "lastUpdatedAt": "2020-03-14T16:45:00Z",
    }))]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let job = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered);
    let summary = job
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 1);
    assert_eq!(summary.execution_date, "2020-03-15");
    assert_eq!(summary.message, "rows inserted: 1");
    assert_eq!(summary.debug, vec!["executionDate".to_string()]);

    assert_eq!(executor.executed.len(), 1);
    let params = &executor.executed[0].params;
    assert_eq!(params[0], SqlParam::Text(Some("A".into())));
    assert_eq!(params[3], SqlParam::Text(Some("P1".into())));
    assert_eq!(params[5], SqlParam::Date(Some(date(2020, 3, 15))));
    assert_eq!(params[6], SqlParam::Date(Some(date(2020, 3, 14))));
}

#[tokio::test]
async fn test_only_fresh_complete_records_survive() {
    init_tracing();

    let mut missing_address = signup("no-address", "2020-03-14T08:00:00Z");
    missing_address = record({
        let mut fields = Value::Object(missing_address.into_fields());
        fields.as_object_mut().unwrap().remove("address");
        fields
    });

    let source = PagedMemorySource::single_page(vec![
        missing_address,
        signup("stale", "2020-03-12T08:00:00Z"),
        signup("fresh", "2020-03-14T08:00:00Z"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let summary = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 1);
    assert_eq!(executor.executed.len(), 1);
    assert_eq!(executor.executed[0].params[0], SqlParam::Text(Some("fresh".into())));
}

#[tokio::test]
async fn test_records_on_every_page_reach_the_filter() {
    let source = PagedMemorySource::new(vec![
        vec![signup("p1-fresh", "2020-03-14T01:00:00Z"), signup("p1-stale", "2020-03-10")],
        vec![signup("p2-fresh", "2020-03-14T02:00:00Z")],
        vec![],
        vec![signup("p4-fresh", "2020-03-14T03:00:00Z")],
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let summary = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(source.inner().pages_served(), 4);
    assert_eq!(summary.rows_inserted, 3);
    let names: Vec<_> = executor
        .executed
        .iter()
        .map(|s| s.params[0].clone())
        .collect();
    assert_eq!(
        names,
        vec![
            SqlParam::Text(Some("p1-fresh".into())),
            SqlParam::Text(Some("p2-fresh".into())),
            SqlParam::Text(Some("p4-fresh".into())),
        ]
    );
}

#[tokio::test]
async fn test_target_date_defaults_to_clock_today() {
    let source = PagedMemorySource::single_page(vec![
        signup("yesterday", "2020-02-29T22:00:00Z"),
        signup("today", "2020-03-01T08:00:00Z"),
    ]);
    let clock = clock_on(2020, 3, 1);
    let mut executor = RecordingExecutor::default();

    let summary = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "requestId": "abc", "source": "aws.events" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.execution_date, "2020-03-01");
    assert_eq!(summary.rows_inserted, 1);
    assert_eq!(summary.debug, vec!["requestId".to_string(), "source".to_string()]);
}

#[tokio::test]
async fn test_partial_failure_keeps_count_and_stops() {
    let source = PagedMemorySource::single_page(vec![
        signup("first", "2020-03-14"),
        signup("second", "2020-03-14"),
        signup("third", "2020-03-14"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::failing_on(2);

    let err = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SinkWriteFailed { rows_written: 1, .. }));
    assert_eq!(err.rows_written(), Some(1));
    assert_eq!(executor.attempts, 2, "third row must never be attempted");
    assert_eq!(executor.executed.len(), 1);
}

#[tokio::test]
async fn test_bad_created_at_mid_run_reports_rows_already_written() {
    let mut bad_created = signup("bad", "2020-03-14");
    bad_created = record({
        let mut fields = Value::Object(bad_created.into_fields());
        fields["createdAt"] = json!("garbage");
        fields
    });
    let source = PagedMemorySource::single_page(vec![
        signup("good", "2020-03-14"),
        bad_created,
        signup("never", "2020-03-14"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let err = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::MalformedTimestamp { ref field, rows_written: 1, .. } if field == "createdAt"
    ));
    assert_eq!(err.rows_written(), Some(1));
    assert_eq!(executor.attempts, 1);
    assert_eq!(executor.executed.len(), 1);
}

#[tokio::test]
async fn test_atomic_mode_writes_nothing_on_failure() {
    let source = PagedMemorySource::single_page(vec![
        signup("first", "2020-03-14"),
        signup("second", "2020-03-14"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor {
        fail_atomic: true,
        ..RecordingExecutor::default()
    };

    let err = SyncJob::new(&source, &clock, structured_writer(true), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SinkWriteFailed { rows_written: 0, .. }));
    assert!(executor.executed.is_empty());
}

#[tokio::test]
async fn test_atomic_mode_builds_every_row_before_writing() {
    let mut bad_created = signup("bad", "2020-03-14");
    bad_created = record({
        let mut fields = Value::Object(bad_created.into_fields());
        fields["createdAt"] = json!("the other day");
        fields
    });
    let source = PagedMemorySource::single_page(vec![signup("good", "2020-03-14"), bad_created]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let err = SyncJob::new(&source, &clock, structured_writer(true), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MalformedTimestamp { ref field, .. } if field == "createdAt"));
    assert_eq!(executor.attempts, 0);
}

#[tokio::test]
async fn test_atomic_mode_commits_once() {
    let source = PagedMemorySource::single_page(vec![
        signup("first", "2020-03-14"),
        signup("second", "2020-03-14"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let summary = SyncJob::new(&source, &clock, structured_writer(true), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 2);
    assert_eq!(executor.committed_batches, 1);
}

#[tokio::test]
async fn test_malformed_last_updated_aborts_before_any_write() {
    let source = PagedMemorySource::single_page(vec![
        signup("good", "2020-03-14"),
        signup("corrupt", "14th of March"),
    ]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let err = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::MalformedTimestamp { .. }));
    assert_eq!(executor.attempts, 0);
}

#[tokio::test]
async fn test_unavailable_source_aborts_run() {
    let source = PagedMemorySource::unavailable();
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let err = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({}), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SourceUnavailable(_)));
    assert_eq!(executor.attempts, 0);
}

#[tokio::test]
async fn test_non_object_payload_is_rejected() {
    let source = PagedMemorySource::single_page(vec![]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let err = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!(["executionDate"]), &mut executor)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidPayload(_)));
}

#[tokio::test]
async fn test_full_variant_loads_every_record_as_json() {
    let records = vec![
        record(json!({ "name": "no dates at all" })),
        record(json!({ "name": "O'Brian", "address": "12 'Quoted' Rd", "tags": ["it's"] })),
        signup("stale", "2001-01-01"),
    ];
    let source = PagedMemorySource::new(vec![records[..2].to_vec(), records[2..].to_vec()]);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();
    let writer = SinkWriter::new("educator_signups_raw", WriteMode::Raw, false).unwrap();

    let summary = SyncJob::new(&source, &clock, writer, PipelineVariant::Full)
        .run(&json!({}), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.rows_inserted, 3);
    let stored: Vec<RawRecord> = executor
        .executed
        .iter()
        .map(|s| match &s.params[..] {
            [SqlParam::Text(Some(text))] => RawRecord::from_json(text).unwrap(),
            other => panic!("unexpected params {:?}", other),
        })
        .collect();
    assert_eq!(stored, records);
}

#[tokio::test]
async fn test_thousands_grouping_in_message() {
    let records: Vec<_> = (0..1234).map(|i| signup(&format!("n{}", i), "2020-03-14")).collect();
    let source = PagedMemorySource::single_page(records);
    let clock = clock_on(2024, 1, 1);
    let mut executor = RecordingExecutor::default();

    let summary = SyncJob::new(&source, &clock, structured_writer(false), PipelineVariant::Filtered)
        .run(&json!({ "executionDate": "2020-03-15" }), &mut executor)
        .await
        .unwrap();

    assert_eq!(summary.message, "rows inserted: 1,234");
}
