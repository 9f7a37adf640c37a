//! One-hot encoding of four-digit draw outcomes.
//!
//! A draw is four independent digit positions, each 0-9. The encoded form
//! is 40 columns in 4 blocks of 10: block p offset d is (position p+1,
//! digit d). A single record encodes to exactly 4 ones and 36 zeros.

use crate::error::PipelineError;

pub const POSITIONS: usize = 4;
pub const DIGITS: usize = 10;
pub const VECTOR_WIDTH: usize = POSITIONS * DIGITS;

/// Occurrence counts over the 40 (position, digit) slots. A freshly
/// encoded record holds only zeros and ones; aggregation sums these
/// element-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeVector(pub [u32; VECTOR_WIDTH]);

impl OutcomeVector {
    pub fn zero() -> Self {
        Self([0; VECTOR_WIDTH])
    }

    pub fn slot(position: usize, digit: u8) -> usize {
        position * DIGITS + digit as usize
    }

    pub fn add_assign(&mut self, other: &OutcomeVector) {
        for (acc, x) in self.0.iter_mut().zip(other.0.iter()) {
            *acc += x;
        }
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// Encode four drawn digits into a one-hot occurrence vector.
pub fn encode(digits: &[u8; POSITIONS]) -> Result<OutcomeVector, PipelineError> {
    let mut cells = [0u32; VECTOR_WIDTH];
    for (pos, &digit) in digits.iter().enumerate() {
        if digit as usize >= DIGITS {
            return Err(PipelineError::InvalidDigit {
                position: pos + 1,
                value: digit,
            });
        }
        cells[OutcomeVector::slot(pos, digit)] = 1;
    }
    Ok(OutcomeVector(cells))
}

/// Recover the drawn digit for one position from a single-record vector.
/// Returns None if the block does not hold exactly one hot cell, which
/// only happens on summed vectors.
pub fn decode_block(vector: &OutcomeVector, position: usize) -> Option<u8> {
    let start = position * DIGITS;
    let mut hot = None;
    for (digit, &cell) in vector.0[start..start + DIGITS].iter().enumerate() {
        match cell {
            0 => {}
            1 if hot.is_none() => hot = Some(digit as u8),
            _ => return None,
        }
    }
    hot
}

/// Occurrence column names in block order: QS1_0..QS1_9, .., QS4_9.
pub fn column_labels() -> Vec<String> {
    let mut labels = Vec::with_capacity(VECTOR_WIDTH);
    for pos in 1..=POSITIONS {
        for digit in 0..DIGITS {
            labels.push(format!("QS{}_{}", pos, digit));
        }
    }
    labels
}
