//! Fixed-point arithmetic kernel and signal type descriptors.
//!
//! This crate provides [`DynFix`], a variable-width signed/unsigned
//! two's-complement fixed-point value with inline limb storage, and
//! [`SignalType`], the runtime description of a signal's type. All
//! arithmetic is destination-shaped: the destination's word width and
//! fraction determine truncation and extension.

#![warn(missing_docs)]

pub mod dynfix;
pub mod error;
pub mod types;

pub use dynfix::{DynFix, MAX_LIMBS};
pub use error::{DomainError, RangeError};
pub use types::{common_representation, SignalType};
