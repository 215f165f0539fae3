//! Shared foundational types used across the Ferro hardware framework.
//!
//! This crate provides the error kinds raised while building and simulating
//! designs and the structural hasher used by module unification.

#![warn(missing_docs)]

pub mod error;
pub mod hash;

pub use error::{DesignError, DesignResult, RuntimeError};
pub use hash::StructuralHasher;
