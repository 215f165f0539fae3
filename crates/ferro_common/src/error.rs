//! Error kinds shared across the Ferro workspace.

/// The standard result type for design-construction operations.
pub type DesignResult<T> = Result<T, DesignError>;

/// A structural problem detected while building or elaborating a design.
///
/// Raised on type mismatches, bus-width mismatches, driving an
/// already-driven forward node, using an unbound placeholder with
/// consumers, impossible casts, and invalid bus indices. Construction
/// fails fast: a partial design should be discarded by dropping the
/// `Design`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("design error: {message}")]
pub struct DesignError {
    /// Description of the structural problem.
    pub message: String,
}

impl DesignError {
    /// Creates a new design error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for DesignError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// A violated invariant signalled by user code during simulation.
///
/// Produced by `Function` blocks and debug assertions. The simulator
/// aborts the current step; the design should not be reused afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("runtime error: {message}")]
pub struct RuntimeError {
    /// Description of the violated invariant.
    pub message: String,
}

impl RuntimeError {
    /// Creates a new runtime error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
