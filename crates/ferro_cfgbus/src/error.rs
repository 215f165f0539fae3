//! Configuration bus error types.

use ferro_common::DesignError;
use ferro_sim::SimError;

/// Errors raised while building the bus or transacting on it.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// A read was not acknowledged within the configured window.
    #[error("configuration read at address {address} timed out after {timeout} cycles")]
    Timeout {
        /// The address of the unacknowledged read.
        address: u32,
        /// The configured time-out in cycles.
        timeout: u32,
    },

    /// The builder was used out of protocol or with bad parameters.
    #[error(transparent)]
    Design(#[from] DesignError),

    /// The simulation failed while driving the bus.
    #[error(transparent)]
    Sim(#[from] SimError),
}
