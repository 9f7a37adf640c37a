use chrono::NaiveDate;
use std::fmt;

/// Failure kinds that abort a pipeline stage. Everything else (missing
/// dates, zero-coverage sources, occupancy shortfalls) is a diagnostic,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The reference source has no draws, so no date axis exists.
    EmptyReferenceAxis { source_id: String },
    /// A source id with no policy rule. Aborts cohort construction so a
    /// misconfigured source cannot vanish silently.
    UnknownSource { source_id: String, cohort: String },
    /// A draw digit outside 0..=9. Rejects only the offending record.
    InvalidDigit { position: usize, value: u8 },
    /// Two aggregates disagree on the reference outcome for a date.
    ActualOutcomeConflict {
        date: NaiveDate,
        left: [u8; 4],
        right: [u8; 4],
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EmptyReferenceAxis { source_id } => {
                write!(f, "reference source {} has no draws", source_id)
            }
            PipelineError::UnknownSource { source_id, cohort } => {
                write!(f, "source {} has no policy rule (cohort {})", source_id, cohort)
            }
            PipelineError::InvalidDigit { position, value } => {
                write!(f, "digit {} at position {} outside 0..=9", value, position)
            }
            PipelineError::ActualOutcomeConflict { date, left, right } => {
                write!(
                    f,
                    "actual outcomes disagree on {}: {:?} vs {:?}",
                    date, left, right
                )
            }
        }
    }
}

impl std::error::Error for PipelineError {}
