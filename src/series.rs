use chrono::NaiveDate;

/// One dated draw from one source: four digits, positions 1..4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRecord {
    pub date: NaiveDate,
    pub digits: [u8; 4],
}

/// A source's full draw history for one time slot, sorted by date with
/// the first record kept on duplicate dates. Immutable once built.
#[derive(Debug, Clone)]
pub struct SourceSeries {
    source_id: String,
    slot: String,
    records: Vec<DrawRecord>,
}

impl SourceSeries {
    pub fn new(source_id: impl Into<String>, slot: impl Into<String>, mut records: Vec<DrawRecord>) -> Self {
        // stable sort keeps input order within a date, so dedup is first-wins
        records.sort_by_key(|r| r.date);
        records.dedup_by_key(|r| r.date);
        Self {
            source_id: source_id.into(),
            slot: slot.into(),
            records,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn records(&self) -> &[DrawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// "SOURCE/slot" label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.source_id, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn sorts_and_keeps_first_on_duplicate_dates() {
        let series = SourceSeries::new(
            "NY",
            "eve",
            vec![
                DrawRecord { date: day("2020-01-03"), digits: [1, 1, 1, 1] },
                DrawRecord { date: day("2020-01-01"), digits: [2, 2, 2, 2] },
                DrawRecord { date: day("2020-01-03"), digits: [9, 9, 9, 9] },
            ],
        );
        assert_eq!(series.len(), 2);
        assert_eq!(series.records()[0].date, day("2020-01-01"));
        assert_eq!(series.records()[1].digits, [1, 1, 1, 1]);
        assert_eq!(series.last_date(), Some(day("2020-01-03")));
    }

    #[test]
    fn empty_series_has_no_last_date() {
        let series = SourceSeries::new("NY", "eve", Vec::new());
        assert!(series.is_empty());
        assert_eq!(series.last_date(), None);
    }
}
