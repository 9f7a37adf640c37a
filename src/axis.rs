//! Reference axis: the canonical date universe, taken verbatim from the
//! reference source's history. No gap-filling, no extrapolation.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::series::SourceSeries;

#[derive(Debug, Clone)]
pub struct ReferenceAxis {
    source_id: String,
    dates: Vec<NaiveDate>,
    index: HashMap<NaiveDate, usize>,
}

impl ReferenceAxis {
    pub fn build(reference: &SourceSeries) -> Result<Self, PipelineError> {
        if reference.is_empty() {
            return Err(PipelineError::EmptyReferenceAxis {
                source_id: reference.source_id().to_string(),
            });
        }
        let dates: Vec<NaiveDate> = reference.records().iter().map(|r| r.date).collect();
        let index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(Self {
            source_id: reference.source_id().to_string(),
            dates,
            index,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.index.contains_key(&date)
    }

    pub fn row(&self, date: NaiveDate) -> Option<usize> {
        self.index.get(&date).copied()
    }

    pub fn span(&self) -> (NaiveDate, NaiveDate) {
        (self.dates[0], self.dates[self.dates.len() - 1])
    }
}

/// The reference source's observed digits per axis date. Annotation only,
/// never part of the occurrence sums.
#[derive(Debug, Clone, Default)]
pub struct ActualTable {
    map: HashMap<NaiveDate, [u8; 4]>,
}

impl ActualTable {
    /// Off-axis dates are dropped silently; duplicates keep the first.
    pub fn build(reference: &SourceSeries, axis: &ReferenceAxis) -> Self {
        let mut map = HashMap::with_capacity(axis.len());
        for rec in reference.records() {
            if axis.contains(rec.date) {
                map.entry(rec.date).or_insert(rec.digits);
            }
        }
        Self { map }
    }

    pub fn get(&self, date: NaiveDate) -> Option<[u8; 4]> {
        self.map.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
