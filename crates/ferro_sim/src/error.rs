//! Simulation error types.

use ferro_common::RuntimeError;

/// Errors raised during simulator construction or execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimError {
    /// The combinational dependency graph has a cycle, usually a missing
    /// delay in a feedback path.
    #[error("combinational loop through block '{block}'")]
    CombinationalLoop {
        /// A block on the cycle.
        block: String,
    },

    /// A block input is undriven, or driven only by the placeholder of an
    /// unbound forward node.
    #[error("block '{block}' has an undriven input; did you forget to bind a forward node?")]
    UndrivenInput {
        /// The block with the undriven input.
        block: String,
    },

    /// User code signalled a violated invariant during a step. The state
    /// after an aborted step is undefined and the design should not be
    /// reused.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_display() {
        let e = SimError::CombinationalLoop {
            block: "plus1".into(),
        };
        assert_eq!(e.to_string(), "combinational loop through block 'plus1'");
    }

    #[test]
    fn undriven_display() {
        let e = SimError::UndrivenInput {
            block: "decide2".into(),
        };
        assert!(e.to_string().contains("decide2"));
    }

    #[test]
    fn runtime_wraps() {
        let e: SimError = RuntimeError::new("assertion failed").into();
        assert_eq!(e.to_string(), "runtime error: assertion failed");
    }
}
