//! Input and output pins and the id pairs that address them.

use crate::ids::{BlockId, SlotId};
use ferro_fixed::SignalType;
use serde::{Deserialize, Serialize};

/// Address of an output pin: the owning block and the pin's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPin {
    /// The owning block.
    pub block: BlockId,
    /// Index into the block's output-pin vector.
    pub index: u16,
}

/// Address of an input pin: the owning block and the pin's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InPin {
    /// The owning block.
    pub block: BlockId,
    /// Index into the block's input-pin vector.
    pub index: u16,
}

/// An input pin of a block.
///
/// Holds at most one back-reference to the output pin driving it. The
/// reciprocal link (this pin appearing exactly once in the driver's target
/// list) is maintained by the wiring operations on
/// [`Design`](crate::design::Design).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputPin {
    /// The driving output pin, if connected.
    pub driver: Option<OutPin>,
}

impl InputPin {
    /// Creates an unconnected input pin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a driver is attached.
    pub fn is_connected(&self) -> bool {
        self.driver.is_some()
    }
}

/// An output pin of a block.
///
/// Owns the declared type of the signal, the slot in the design's value
/// store holding its current simulated value, and the list of input pins
/// it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPin {
    /// The declared signal type.
    pub ty: SignalType,
    /// Slot holding the pin's current value.
    pub slot: SlotId,
    /// Input pins driven by this pin.
    pub targets: Vec<InPin>,
}

impl OutputPin {
    /// Creates an output pin of the given type backed by the given slot.
    pub fn new(ty: SignalType, slot: SlotId) -> Self {
        Self {
            ty,
            slot,
            targets: Vec::new(),
        }
    }

    /// Returns `true` if the pin drives at least one input.
    pub fn is_connected(&self) -> bool {
        !self.targets.is_empty()
    }
}
