//! Peripheral modules composed from the core primitives: FIFO, logger,
//! recorder, and throttled source.

#![warn(missing_docs)]

pub mod fifo;
pub mod logger;
pub mod recorder;
pub mod throttle;

pub use fifo::Fifo;
pub use logger::Logger;
pub use recorder::{Recorder, RecorderError};
pub use throttle::ThrottledSource;
