//! Elaboration error types.

use std::fmt;

/// An elaboration failure.
///
/// Passes collect as many problems as they can before failing; a failed
/// pass stops the pipeline before the next pass starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElabError {
    /// One pass reported problems.
    Pass {
        /// The pass name.
        pass: &'static str,
        /// The collected problem descriptions.
        problems: Vec<String>,
    },

    /// An internal invariant of the elaborated IR was violated.
    Internal(String),
}

impl fmt::Display for ElabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElabError::Pass { pass, problems } => {
                write!(
                    f,
                    "elaboration pass '{pass}' failed with {} problem(s): {}",
                    problems.len(),
                    problems.join("; ")
                )
            }
            ElabError::Internal(message) => write!(f, "internal elaboration error: {message}"),
        }
    }
}

impl std::error::Error for ElabError {}

impl ElabError {
    /// Builds a pass error unless the problem list is empty.
    pub fn from_problems(pass: &'static str, problems: Vec<String>) -> Result<(), ElabError> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ElabError::Pass { pass, problems })
        }
    }
}
