//! Record Filter: keep registrations last updated the day before the target
//!
//! Missing `lastUpdatedAt` or `address` drops the record quietly. A
//! `lastUpdatedAt` that is present but unparseable fails the whole run, since
//! it points at corrupted upstream data rather than an incomplete signup.

use chrono::NaiveDate;
use edusync_common::Result;
use tracing::{debug, info, instrument};

use crate::dates::{cutoff_for, date_from_value};
use crate::record::{fields, FilteredRecord, RawRecord};

/// Counters from one filter pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub scanned: usize,
    pub missing_fields: usize,
    pub other_days: usize,
    pub kept: usize,
}

/// Keep records whose `lastUpdatedAt` falls exactly on `target - 1 day`.
///
/// Every present timestamp is parsed before any record is kept, so one
/// malformed value fails the call regardless of where it sits in the list.
#[instrument(skip(records), fields(records = records.len()))]
pub fn filter_updated_day_before(
    records: Vec<RawRecord>,
    target: NaiveDate,
) -> Result<(Vec<FilteredRecord>, FilterStats)> {
    let cutoff = cutoff_for(target)?;
    let mut stats = FilterStats {
        scanned: records.len(),
        ..FilterStats::default()
    };

    let mut parsed = Vec::with_capacity(records.len());
    for record in records {
        let updated = match record.get(fields::LAST_UPDATED_AT) {
            Some(value) if record.has(fields::ADDRESS) => {
                date_from_value(fields::LAST_UPDATED_AT, value)?
            },
            _ => {
                stats.missing_fields += 1;
                continue;
            },
        };
        parsed.push((record, updated));
    }

    let kept: Vec<FilteredRecord> = parsed
        .into_iter()
        .filter_map(|(record, updated_on)| {
            if updated_on == cutoff {
                Some(FilteredRecord { record, updated_on })
            } else {
                stats.other_days += 1;
                None
            }
        })
        .collect();
    stats.kept = kept.len();

    debug!(?stats, "Filter counters");
    info!(%cutoff, kept = stats.kept, "Filtered records to cutoff day");

    Ok((kept, stats))
}
