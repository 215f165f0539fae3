//! Entities: the per-block records of the elaborated IR.

use ferro_fixed::SignalType;
use ferro_ir::{ArenaId, Properties};
use serde::{Deserialize, Serialize};

/// Opaque, copyable ID for an instance (one per hierarchy level, later
/// one per module).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct InstanceId(u32);

impl InstanceId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for InstanceId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// Opaque, copyable ID for an entity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates an ID from a raw `u32` index.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw `u32` index.
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl ArenaId for EntityId {
    fn from_raw(index: u32) -> Self {
        Self(index)
    }

    fn as_raw(self) -> u32 {
        self.0
    }
}

/// Address of an entity output pin.
pub type OutRef = (EntityId, u32);

/// Address of an entity input pin.
pub type InRef = (EntityId, u32);

/// An entity's input record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityInput {
    /// The pin name (used for port naming).
    pub name: String,
    /// The driving entity output, if connected.
    pub driver: Option<OutRef>,
}

/// An entity's output record, carrying the bus metadata the emitter
/// consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityOutput {
    /// The pin name.
    pub name: String,
    /// The signal type.
    pub ty: SignalType,
    /// Output pins with the same group index belong to one pin group.
    pub group_index: i32,
    /// Bus width; `None` marks a non-bus pin.
    pub bus_size: Option<u32>,
    /// Position within the bus.
    pub bus_index: u32,
    /// The entity inputs driven by this output.
    pub targets: Vec<InRef>,
}

impl Default for EntityOutput {
    fn default() -> Self {
        Self {
            name: String::new(),
            ty: SignalType::Unknown,
            group_index: 0,
            bus_size: None,
            bus_index: 0,
            targets: Vec::new(),
        }
    }
}

/// The elaborator's per-block record.
///
/// Entities of class `input_port` / `output_port` are synthesized at
/// hierarchy boundaries; `$input_connector` / `$output_connector` are the
/// parent-side stand-ins that instance lowering later replaces by
/// `instance` entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// The owning instance.
    pub instance: InstanceId,
    /// Creation index within the owning instance; stable across entity
    /// removal and used by structural comparison.
    pub index_in_instance: u32,
    /// The entity class (a block class name, a port class, or
    /// `instance`).
    pub class: String,
    /// The entity name.
    pub name: String,
    /// Ordered input records.
    pub inputs: Vec<EntityInput>,
    /// Ordered output records.
    pub outputs: Vec<EntityOutput>,
    /// Named properties copied from the block.
    pub properties: Properties,
    /// For `instance` entities, the instantiated module.
    pub target_module: Option<InstanceId>,
}

impl Entity {
    /// Creates an entity with unnamed pins.
    pub fn new(
        instance: InstanceId,
        index_in_instance: u32,
        class: impl Into<String>,
        name: impl Into<String>,
        input_count: usize,
        output_count: usize,
    ) -> Self {
        let outputs = (0..output_count)
            .map(|i| EntityOutput {
                group_index: i as i32,
                ..EntityOutput::default()
            })
            .collect();
        Self {
            instance,
            index_in_instance,
            class: class.into(),
            name: name.into(),
            inputs: vec![EntityInput::default(); input_count],
            outputs,
            properties: Properties::new(),
            target_module: None,
        }
    }

    /// Checks that the input and output records are internally
    /// consistent: monotone indices, contiguous bus groups, equal types
    /// and names within a bus.
    pub fn is_consistent(&self) -> bool {
        if let Some(first) = self.outputs.first() {
            if first.group_index != 0 || first.bus_index != 0 {
                return false;
            }
            if matches!(first.bus_size, Some(0)) {
                return false;
            }
            for i in 1..self.outputs.len() {
                let current = &self.outputs[i];
                let previous = &self.outputs[i - 1];
                if current.group_index == previous.group_index + 1 {
                    if current.bus_index != 0 {
                        return false;
                    }
                    if matches!(current.bus_size, Some(0)) {
                        return false;
                    }
                } else if current.group_index == previous.group_index {
                    if current.bus_index != previous.bus_index + 1 {
                        return false;
                    }
                    if current.bus_size != previous.bus_size {
                        return false;
                    }
                    match current.bus_size {
                        Some(size) if current.bus_index < size => {}
                        _ => return false,
                    }
                    if current.name != previous.name {
                        return false;
                    }
                    if current.ty != previous.ty {
                        return false;
                    }
                } else {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(outputs: Vec<EntityOutput>) -> Entity {
        Entity {
            instance: InstanceId::from_raw(0),
            index_in_instance: 0,
            class: "test".into(),
            name: "t".into(),
            inputs: Vec::new(),
            outputs,
            properties: Properties::new(),
            target_module: None,
        }
    }

    fn output(group: i32, bus_size: Option<u32>, bus_index: u32, name: &str) -> EntityOutput {
        EntityOutput {
            name: name.into(),
            ty: SignalType::Bool,
            group_index: group,
            bus_size,
            bus_index,
            targets: Vec::new(),
        }
    }

    #[test]
    fn empty_entity_is_consistent() {
        assert!(entity(Vec::new()).is_consistent());
    }

    #[test]
    fn scalar_outputs_are_consistent() {
        let e = entity(vec![
            output(0, None, 0, "a"),
            output(1, None, 0, "b"),
        ]);
        assert!(e.is_consistent());
    }

    #[test]
    fn bus_outputs_are_consistent() {
        let e = entity(vec![
            output(0, Some(3), 0, "bus"),
            output(0, Some(3), 1, "bus"),
            output(0, Some(3), 2, "bus"),
        ]);
        assert!(e.is_consistent());
    }

    #[test]
    fn bus_index_gap_is_inconsistent() {
        let e = entity(vec![
            output(0, Some(3), 0, "bus"),
            output(0, Some(3), 2, "bus"),
        ]);
        assert!(!e.is_consistent());
    }

    #[test]
    fn bus_name_mismatch_is_inconsistent() {
        let e = entity(vec![
            output(0, Some(2), 0, "a"),
            output(0, Some(2), 1, "b"),
        ]);
        assert!(!e.is_consistent());
    }

    #[test]
    fn group_jump_is_inconsistent() {
        let e = entity(vec![
            output(0, None, 0, "a"),
            output(2, None, 0, "b"),
        ]);
        assert!(!e.is_consistent());
    }

    #[test]
    fn bus_index_beyond_size_is_inconsistent() {
        let e = entity(vec![
            output(0, Some(1), 0, "bus"),
            output(0, Some(1), 1, "bus"),
        ]);
        assert!(!e.is_consistent());
    }

    #[test]
    fn entity_new_counts_pins() {
        let e = Entity::new(InstanceId::from_raw(0), 3, "delay", "delay1", 2, 2);
        assert_eq!(e.inputs.len(), 2);
        assert_eq!(e.outputs.len(), 2);
        assert_eq!(e.index_in_instance, 3);
        assert_eq!(e.outputs[1].group_index, 1);
    }
}
