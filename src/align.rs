//! Projection of source series onto the reference axis.

use chrono::NaiveDate;

use crate::axis::ReferenceAxis;
use crate::encode::{self, OutcomeVector};
use crate::series::SourceSeries;

/// One source's records restricted to axis dates, encoded and sorted.
/// A source that never intersects the axis yields an empty row set, not
/// an error.
#[derive(Debug, Clone)]
pub struct AlignedSeries {
    pub source_id: String,
    pub slot: String,
    pub rows: Vec<(NaiveDate, OutcomeVector)>,
    pub original_len: usize,
    pub skipped_records: u64,
}

impl AlignedSeries {
    /// Share of the source's records that landed on the axis. Diagnostic
    /// only, never control flow.
    pub fn coverage(&self) -> f64 {
        if self.original_len == 0 {
            0.0
        } else {
            self.rows.len() as f64 / self.original_len as f64
        }
    }
}

pub fn align(series: &SourceSeries, axis: &ReferenceAxis) -> AlignedSeries {
    let mut rows = Vec::new();
    let mut skipped_records = 0u64;
    for rec in series.records() {
        if !axis.contains(rec.date) {
            continue;
        }
        if rows.last().map(|(d, _)| *d == rec.date).unwrap_or(false) {
            continue;
        }
        match encode::encode(&rec.digits) {
            Ok(vector) => rows.push((rec.date, vector)),
            // invalid digits reject the record, not the series
            Err(_) => skipped_records += 1,
        }
    }
    AlignedSeries {
        source_id: series.source_id().to_string(),
        slot: series.slot().to_string(),
        rows,
        original_len: series.len(),
        skipped_records,
    }
}

/// Align every series, fanned out over a bounded thread pool. Summation
/// downstream is commutative, so worker scheduling cannot change the
/// result; output keeps input order for stable logs.
pub fn align_all(series: &[SourceSeries], axis: &ReferenceAxis) -> Vec<AlignedSeries> {
    let n_threads = num_cpus::get().min(8);
    if series.len() <= 1 || n_threads <= 1 {
        return series.iter().map(|s| align(s, axis)).collect();
    }
    let chunk = (series.len() + n_threads - 1) / n_threads;
    std::thread::scope(|scope| {
        let handles: Vec<_> = series
            .chunks(chunk)
            .map(|part| scope.spawn(move || part.iter().map(|s| align(s, axis)).collect::<Vec<_>>()))
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("alignment worker panicked"))
            .collect()
    })
}
