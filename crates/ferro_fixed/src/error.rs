//! Error types for fixed-point construction and conversion.

use crate::dynfix::MAX_LIMBS;

/// A fixed-point parameter outside the supported range.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// The word width must be at least 1.
    #[error("fixed-point word width must be at least 1, got {0}")]
    WordWidthTooSmall(i32),

    /// The word width exceeds the inline limb capacity.
    #[error(
        "fixed-point word width {0} exceeds the maximum supported width ({max} bits)",
        max = MAX_LIMBS * 32
    )]
    WordWidthTooLarge(i32),
}

/// A numeric conversion that cannot represent the value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    /// The value has a non-zero fraction or does not fit in an `i64`.
    #[error("fixed-point value of type {ty} is not representable as a 64-bit integer")]
    NotAnInt64 {
        /// Formatted type of the offending value.
        ty: String,
    },
}
