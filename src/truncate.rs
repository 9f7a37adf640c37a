//! Temporal truncation of an aggregate to its full-participation window.
//!
//! Rows before the cutoff mix a subset of eligible sources that did not
//! all exist yet; they are dropped outright rather than zero-filled so
//! downstream consumers never see structurally incomplete rows.

use chrono::NaiveDate;

use crate::aggregate::AggregateTable;

/// Keep only rows dated on or after `cutoff`. The cutoff is supplied as
/// configuration, never derived from coverage statistics.
pub fn truncate_from(mut table: AggregateTable, cutoff: NaiveDate) -> AggregateTable {
    let keep = table
        .dates
        .iter()
        .position(|d| *d >= cutoff)
        .unwrap_or(table.dates.len());
    table.dates.drain(..keep);
    table.actual.drain(..keep);
    table.counts.drain(..keep);
    table
}
