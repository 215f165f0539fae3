//! Simulated signal values and the dense store the pins allocate from.

use crate::arena::ArenaId;
use crate::ids::SlotId;
use ferro_fixed::{DynFix, SignalType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The value carried by one signal during simulation.
///
/// Mirrors the five signal classes of [`SignalType`]. Doubles exist as a
/// simulation convenience only and are never emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A boolean signal.
    Bool(bool),
    /// A 32-bit integer signal.
    Int32(i32),
    /// A 64-bit integer signal.
    Int64(i64),
    /// A double-precision signal.
    Double(f64),
    /// A fixed-point signal.
    Fixed(DynFix),
}

impl Value {
    /// Returns the type describing this value.
    pub fn ty(&self) -> SignalType {
        match self {
            Value::Bool(_) => SignalType::Bool,
            Value::Int32(_) => SignalType::Int32,
            Value::Int64(_) => SignalType::Int64,
            Value::Double(_) => SignalType::Double,
            Value::Fixed(v) => v.ty(),
        }
    }

    /// Returns the zero value of the given type.
    ///
    /// For `Unknown` this is the uninitialised fixed-point placeholder.
    pub fn zero_of(ty: &SignalType) -> Value {
        match ty {
            SignalType::Bool => Value::Bool(false),
            SignalType::Int32 => Value::Int32(0),
            SignalType::Int64 => Value::Int64(0),
            SignalType::Double => Value::Double(0.0),
            SignalType::Fixed { .. } | SignalType::Unknown => Value::Fixed(DynFix::zero_of(ty)),
        }
    }

    /// Reads a boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Reads a fixed-point value, if this is one.
    pub fn as_fixed(&self) -> Option<&DynFix> {
        match self {
            Value::Fixed(v) => Some(v),
            _ => None,
        }
    }

    /// Converts to a double for logging and reference checks.
    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Int32(v) => *v as f64,
            Value::Int64(v) => *v as f64,
            Value::Double(v) => *v,
            Value::Fixed(v) => v.to_f64(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", u8::from(*b)),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Fixed(v) => write!(f, "{v}"),
        }
    }
}

/// Dense storage for the current value of every output pin in a design.
///
/// Each output pin allocates one slot at construction time; evaluation
/// reads driver slots and writes the evaluated block's own slots in
/// place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueStore {
    values: Vec<Value>,
}

impl ValueStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a slot holding the given initial value.
    pub fn alloc(&mut self, initial: Value) -> SlotId {
        let id = SlotId::from_raw(self.values.len() as u32);
        self.values.push(initial);
        id
    }

    /// Reads the value in a slot.
    pub fn get(&self, slot: SlotId) -> &Value {
        &self.values[slot.as_raw() as usize]
    }

    /// Overwrites the value in a slot.
    pub fn set(&mut self, slot: SlotId, value: Value) {
        self.values[slot.as_raw() as usize] = value;
    }

    /// Returns the number of allocated slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no slots have been allocated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
