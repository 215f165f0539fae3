//! Cycle-accurate simulation of a Ferro design.
//!
//! The simulator derives a combinational evaluation order by topological
//! sort at start-up, then advances the design one clock step at a time:
//! evaluate every dirty block in topological order, then step every
//! clocked block. Register updates are simultaneous; no clocked block
//! observes another's new register value during the same step.

#![warn(missing_docs)]

pub mod error;
pub mod schedule;
pub mod simulator;

pub use error::SimError;
pub use simulator::Simulator;
