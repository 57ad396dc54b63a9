//! Educator registration sync
//!
//! A batch job that copies educator registrations from a DynamoDB table into
//! PostgreSQL for reporting. One invocation is one extract → filter → load
//! cycle:
//!
//! - [`source`]: full paged scan of the registration table
//! - [`filter`]: keep records last updated the day before the target date
//! - [`sink`]: insert one row per record, as typed columns or a JSON blob
//! - [`job`]: resolve the target date, run the steps, summarize
//!
//! Re-running a day inserts its rows again; the destination tables carry no
//! uniqueness constraint.
//!
//! # Example
//!
//! ```no_run
//! use edusync::{clock::SystemClock, config::SyncConfig, job::run_job};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let payload = serde_json::json!({ "executionDate": "2019-08-15" });
//!     let summary = run_job(&config, &payload, &SystemClock).await?;
//!     println!("{}", summary.message);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod clock;
pub mod config;
pub mod dates;
pub mod filter;
pub mod job;
pub mod record;
pub mod sink;
pub mod source;

pub use edusync_common::{Result, SyncError};
pub use job::{run_job, SyncJob, SyncSummary};
pub use record::{FilteredRecord, RawRecord};
