//! Length limiting for single sequences and pairs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::encoding::Encoding;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TruncationError {
    #[error("Truncation error: second sequence not provided")]
    SecondSequenceNotProvided,
    #[error("Truncation error: sequences of length {required} cannot fit in {max_length} tokens")]
    CannotFit { max_length: usize, required: usize },
    #[error("Truncation error: stride {stride} must be smaller than the window of {max_length} tokens")]
    StrideTooLarge { stride: usize, max_length: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncationStrategy {
    /// Remove from the longer sequence first, one token at a time.
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncationDirection {
    Left,
    #[default]
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationParams {
    pub max_length: usize,
    #[serde(default)]
    pub strategy: TruncationStrategy,
    #[serde(default)]
    pub stride: usize,
    #[serde(default)]
    pub direction: TruncationDirection,
}

impl Default for TruncationParams {
    fn default() -> Self {
        Self {
            max_length: 512,
            strategy: TruncationStrategy::default(),
            stride: 0,
            direction: TruncationDirection::default(),
        }
    }
}

impl TruncationParams {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            ..Self::default()
        }
    }

    pub fn with_strategy(mut self, strategy: TruncationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_direction(mut self, direction: TruncationDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// Truncate a single sequence to `params.max_length`.
pub fn truncate(encoding: &mut Encoding, params: &TruncationParams) -> Result<(), TruncationError> {
    truncate_encodings(encoding, None, params)
}

/// Truncate a pair so that together they hold at most `params.max_length`
/// tokens.
pub fn truncate_pair(
    first: &mut Encoding,
    second: &mut Encoding,
    params: &TruncationParams,
) -> Result<(), TruncationError> {
    truncate_encodings(first, Some(second), params)
}

/// Shared implementation of [`truncate`] and [`truncate_pair`]. The removed
/// tokens end up in the overflowing windows of the truncated sequence(s).
pub fn truncate_encodings(
    first: &mut Encoding,
    second: Option<&mut Encoding>,
    params: &TruncationParams,
) -> Result<(), TruncationError> {
    let max_length = params.max_length;
    let total = first.len() + second.as_ref().map_or(0, |s| s.len());
    if total <= max_length {
        return Ok(());
    }

    match params.strategy {
        TruncationStrategy::LongestFirst => match second {
            None => first.truncate(max_length, params.stride, params.direction),
            Some(second) => {
                let (n1, n2) = longest_first_split(first.len(), second.len(), max_length);
                first.truncate(n1, params.stride, params.direction)?;
                second.truncate(n2, params.stride, params.direction)
            }
        },
        TruncationStrategy::OnlyFirst => {
            let other = second.map_or(0, |s| s.len());
            let budget = remaining_budget(max_length, other)?;
            first.truncate(budget, params.stride, params.direction)
        }
        TruncationStrategy::OnlySecond => {
            let second = second.ok_or(TruncationError::SecondSequenceNotProvided)?;
            let budget = remaining_budget(max_length, first.len())?;
            second.truncate(budget, params.stride, params.direction)
        }
    }
}

fn remaining_budget(max_length: usize, other: usize) -> Result<usize, TruncationError> {
    max_length
        .checked_sub(other)
        .ok_or(TruncationError::CannotFit {
            max_length,
            required: other,
        })
}

/// Lengths that result from repeatedly removing one token from the longer
/// sequence (ties remove from the second) until the pair fits.
fn longest_first_split(len1: usize, len2: usize, max_length: usize) -> (usize, usize) {
    let half = max_length / 2;
    if len1.min(len2) > half {
        // Both shrink towards the middle; an odd budget leaves the extra
        // token to the first sequence since ties trim the second.
        (max_length - half, half)
    } else if len1 <= len2 {
        (len1, max_length - len1)
    } else {
        (max_length - len2, len2)
    }
}
