//! Entity construction and connection mapping (the first two passes).

use crate::entity::{EntityId, InstanceId};
use crate::error::ElabError;
use crate::instance::Instance;
use crate::Elaboration;
use ferro_ir::{BlockId, Design, LevelId, Value};
use std::collections::HashMap;

/// An exact, deterministic literal for a constant output value.
///
/// Written into the property bag so that constants with different values
/// never unify, and so the emitter can reproduce the bit pattern.
pub fn value_literal(value: &Value) -> String {
    match value {
        Value::Bool(b) => format!("bool:{}", u8::from(*b)),
        Value::Int32(v) => format!("int32:{v}"),
        Value::Int64(v) => format!("int64:{v}"),
        Value::Double(v) => format!("double:{:016x}", v.to_bits()),
        Value::Fixed(v) => {
            let limbs = v.limbs();
            format!(
                "{}:{:08x}_{:08x}_{:08x}_{:08x}",
                v.ty(),
                limbs[3],
                limbs[2],
                limbs[1],
                limbs[0]
            )
        }
    }
}

impl Elaboration {
    fn to_instance(
        &mut self,
        design: &Design,
        level: LevelId,
        mapping: &mut HashMap<LevelId, InstanceId>,
    ) -> InstanceId {
        if let Some(id) = mapping.get(&level) {
            return *id;
        }
        let data = design.hierarchy.level(level);
        let parent = data
            .parent
            .map(|parent| self.to_instance(design, parent, mapping));
        let id = self.instances.alloc(Instance::new(
            data.sequence,
            data.name.clone(),
            data.module_name.clone(),
            parent,
        ));
        mapping.insert(level, id);
        id
    }

    /// Constructs one entity per non-removable block, attached to the
    /// instance of the block's hierarchy level.
    pub(crate) fn map_entities(
        &mut self,
        design: &Design,
    ) -> Result<HashMap<BlockId, EntityId>, ElabError> {
        let mut levels = HashMap::new();
        let mut mapping = HashMap::new();
        let mut problems = Vec::new();

        for (block_id, block) in design.blocks.iter() {
            if block.can_remove() {
                continue;
            }
            if block.is_temporary() {
                problems.push(format!(
                    "'{}' is driven by an unbound forward node",
                    design.full_block_name(block_id)
                ));
                continue;
            }

            let instance = self.to_instance(design, block.level, &mut levels);
            let entity_id = self.add_entity(
                instance,
                block.class_name(),
                block.name.clone(),
                block.inputs.len(),
                block.outputs.len(),
            );

            let entity = &mut self.entities[entity_id];
            for index in 0..block.inputs.len() {
                entity.inputs[index].name = block.input_pin_name(index);
            }
            for (index, pin) in block.outputs.iter().enumerate() {
                let (name, group_index, bus_size, bus_index) = block.output_pin_info(index);
                let output = &mut entity.outputs[index];
                output.name = name;
                output.ty = pin.ty;
                output.group_index = group_index;
                output.bus_size = bus_size;
                output.bus_index = bus_index;
            }
            entity.properties = block.properties();

            if matches!(block.kind, ferro_ir::BlockKind::Constant) {
                for (index, pin) in block.outputs.iter().enumerate() {
                    let literal = value_literal(design.values.get(pin.slot));
                    entity
                        .properties
                        .set_string_indexed("Value", index as i32, literal);
                }
            }

            mapping.insert(block_id, entity_id);
        }

        ElabError::from_problems("entities", problems)?;
        Ok(mapping)
    }

    /// Records the driver edge of every entity input.
    pub(crate) fn map_connections(
        &mut self,
        design: &Design,
        mapping: &HashMap<BlockId, EntityId>,
    ) -> Result<(), ElabError> {
        let mut problems = Vec::new();

        for (block_id, block) in design.blocks.iter() {
            let Some(&entity_id) = mapping.get(&block_id) else {
                continue;
            };
            for (index, input) in block.inputs.iter().enumerate() {
                let Some(driver) = input.driver else {
                    problems.push(format!(
                        "'{}' input {index} is unconnected",
                        design.full_block_name(block_id)
                    ));
                    continue;
                };
                let Some(&driver_entity) = mapping.get(&driver.block) else {
                    problems.push(format!(
                        "'{}' is driven by a block outside code generation",
                        design.full_block_name(block_id)
                    ));
                    continue;
                };
                if let Err(e) = self.connect(
                    (driver_entity, driver.index as u32),
                    (entity_id, index as u32),
                ) {
                    problems.push(e.to_string());
                }
            }
        }

        ElabError::from_problems("connections", problems)
    }
}
