//! Control-plane errors.

use thiserror::Error;

/// Errors returned by [`crate::ControlHandle`] operations. The packet path
/// never produces these; a bad frame is a drop verdict, not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("too many signatures: {count} exceeds table cap {max}")]
    TooManySignatures { count: usize, max: usize },
    #[error("too many payload rules: {count} exceeds table cap {max}")]
    TooManyPayloadRules { count: usize, max: usize },
    #[error("payload pattern length {len} out of range 1..={max}")]
    BadPatternLength { len: usize, max: usize },
    #[error("mask length {mask_len} does not match pattern length {pattern_len}")]
    MaskLengthMismatch { pattern_len: usize, mask_len: usize },
}
