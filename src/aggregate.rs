//! Occurrence aggregation: sum aligned one-hot vectors per axis date and
//! annotate with the reference source's actual outcome.

use chrono::NaiveDate;

use crate::align::AlignedSeries;
use crate::axis::{ActualTable, ReferenceAxis};
use crate::encode::VECTOR_WIDTH;
use crate::policy::CohortSpec;

/// Date-indexed aggregate: one row per axis date, 4 actual-outcome
/// columns (None where the reference has no entry) and 40 summed
/// occurrence columns. Rows are parallel vectors over `dates`.
#[derive(Debug, Clone)]
pub struct AggregateTable {
    pub cohort: String,
    pub reference: String,
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<Option<[u8; 4]>>,
    pub counts: Vec<[u32; VECTOR_WIDTH]>,
}

impl AggregateTable {
    pub fn zeroed(cohort: impl Into<String>, reference: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        let n = dates.len();
        Self {
            cohort: cohort.into(),
            reference: reference.into(),
            dates,
            actual: vec![None; n],
            counts: vec![[0; VECTOR_WIDTH]; n],
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn find(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// Sum of all 40 occurrence columns for one row.
    pub fn row_sum(&self, row: usize) -> u32 {
        self.counts[row].iter().sum()
    }

    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.dates.first(), self.dates.last()) {
            (Some(a), Some(b)) => Some((*a, *b)),
            _ => None,
        }
    }
}

/// Per-cohort diagnostic counters. Occupancy shortfalls are expected
/// steady state (sources genuinely miss draws) and are counted, never
/// raised.
#[derive(Debug, Clone)]
pub struct CohortDiagnostics {
    pub cohort: String,
    pub source_count: usize,
    pub expected_occupancy: u32,
    pub full_rows: u64,
    pub short_rows: u64,
    pub over_rows: u64,
    pub skipped_records: u64,
}

/// Sum the aligned series of one cohort into an aggregate table over the
/// full axis. Pure transform; ordering of `aligned` cannot affect the
/// output.
pub fn aggregate(
    spec: &CohortSpec,
    aligned: &[AlignedSeries],
    axis: &ReferenceAxis,
    actuals: &ActualTable,
) -> (AggregateTable, CohortDiagnostics) {
    let mut table = AggregateTable::zeroed(spec.name.clone(), axis.source_id(), axis.dates().to_vec());

    for series in aligned {
        for (date, vector) in &series.rows {
            if let Some(row) = axis.row(*date) {
                for (cell, x) in table.counts[row].iter_mut().zip(vector.0.iter()) {
                    *cell += x;
                }
            }
        }
    }

    for (row, date) in axis.dates().iter().enumerate() {
        table.actual[row] = actuals.get(*date);
    }

    let mut full_rows = 0u64;
    let mut short_rows = 0u64;
    let mut over_rows = 0u64;
    for row in 0..table.len() {
        let sum = table.row_sum(row);
        if sum == spec.expected_occupancy {
            full_rows += 1;
        } else if sum < spec.expected_occupancy {
            short_rows += 1;
        } else {
            over_rows += 1;
        }
    }

    let diagnostics = CohortDiagnostics {
        cohort: spec.name.clone(),
        source_count: spec.sources.len(),
        expected_occupancy: spec.expected_occupancy,
        full_rows,
        short_rows,
        over_rows,
        skipped_records: aligned.iter().map(|s| s.skipped_records).sum(),
    };
    (table, diagnostics)
}
