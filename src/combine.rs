//! Union of two truncated cohort aggregates by element-wise addition.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::aggregate::AggregateTable;
use crate::encode::VECTOR_WIDTH;
use crate::error::PipelineError;

/// Combine two aggregates over the union of their date ranges. A date
/// absent on one side contributes zero from that side; the 4 actual
/// columns are carried from whichever side has them and must agree when
/// both do. Commutative on the occurrence columns.
pub fn combine(a: AggregateTable, b: AggregateTable) -> Result<AggregateTable, PipelineError> {
    let mut dates: Vec<NaiveDate> = a.dates.iter().chain(b.dates.iter()).copied().collect();
    dates.sort();
    dates.dedup();

    let index: HashMap<NaiveDate, usize> = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
    let mut actual: Vec<Option<[u8; 4]>> = vec![None; dates.len()];
    let mut counts: Vec<[u32; VECTOR_WIDTH]> = vec![[0; VECTOR_WIDTH]; dates.len()];

    for side in [&a, &b] {
        for i in 0..side.len() {
            let row = index[&side.dates[i]];
            for (cell, x) in counts[row].iter_mut().zip(side.counts[i].iter()) {
                *cell += x;
            }
            if let Some(digits) = side.actual[i] {
                match actual[row] {
                    None => actual[row] = Some(digits),
                    Some(existing) if existing == digits => {}
                    Some(existing) => {
                        return Err(PipelineError::ActualOutcomeConflict {
                            date: side.dates[i],
                            left: existing,
                            right: digits,
                        });
                    }
                }
            }
        }
    }

    Ok(AggregateTable {
        cohort: format!("{}+{}", a.cohort, b.cohort),
        reference: a.reference,
        dates,
        actual,
        counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn table(cohort: &str, entries: &[(&str, u32, Option<[u8; 4]>)]) -> AggregateTable {
        let mut t = AggregateTable::zeroed(
            cohort,
            "CA",
            entries.iter().map(|(d, _, _)| day(d)).collect(),
        );
        for (i, (_, count, actual)) in entries.iter().enumerate() {
            t.counts[i][0] = *count;
            t.actual[i] = *actual;
        }
        t
    }

    #[test]
    fn overlapping_ranges_sum_and_tails_pass_through() {
        let a = table(
            "eve",
            &[
                ("2020-01-01", 1, Some([1, 2, 3, 4])),
                ("2020-01-02", 2, None),
                ("2020-01-03", 3, None),
            ],
        );
        let b = table(
            "mid",
            &[
                ("2020-01-03", 30, Some([5, 6, 7, 8])),
                ("2020-01-04", 40, None),
            ],
        );
        let out = combine(a, b).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(out.counts[0][0], 1);
        assert_eq!(out.counts[1][0], 2);
        assert_eq!(out.counts[2][0], 33);
        assert_eq!(out.counts[3][0], 40);
        assert_eq!(out.actual[0], Some([1, 2, 3, 4]));
        assert_eq!(out.actual[2], Some([5, 6, 7, 8]));
        assert_eq!(out.actual[3], None);
    }

    #[test]
    fn occurrence_columns_commute() {
        let mk = || {
            (
                table("eve", &[("2020-01-01", 5, None), ("2020-01-02", 7, None)]),
                table("mid", &[("2020-01-02", 11, None)]),
            )
        };
        let (a1, b1) = mk();
        let (a2, b2) = mk();
        let ab = combine(a1, b1).unwrap();
        let ba = combine(b2, a2).unwrap();
        assert_eq!(ab.dates, ba.dates);
        assert_eq!(ab.counts, ba.counts);
    }

    #[test]
    fn disagreeing_actuals_are_a_conflict() {
        let a = table("eve", &[("2020-01-01", 1, Some([1, 1, 1, 1]))]);
        let b = table("mid", &[("2020-01-01", 1, Some([2, 2, 2, 2]))]);
        let err = combine(a, b).unwrap_err();
        assert!(matches!(err, PipelineError::ActualOutcomeConflict { .. }));
    }

    #[test]
    fn no_dates_are_invented() {
        let a = table("eve", &[("2020-01-01", 1, None)]);
        let b = table("mid", &[("2020-01-03", 1, None)]);
        let out = combine(a, b).unwrap();
        assert_eq!(out.dates, vec![day("2020-01-01"), day("2020-01-03")]);
    }
}
