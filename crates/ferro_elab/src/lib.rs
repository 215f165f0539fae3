//! Structural elaboration: from the flat block graph to a module
//! hierarchy ready for code emission.
//!
//! The pass order is fixed: entity construction, connection mapping, port
//! insertion at hierarchy boundaries, port naming and bussification,
//! instance lowering, module unification by structural hash, module
//! naming, and a final consistency check.

#![warn(missing_docs)]

pub mod build;
pub mod entity;
pub mod error;
pub mod instance;
pub mod modules;
pub mod naming;
pub mod ports;

pub use entity::{Entity, EntityId, EntityInput, EntityOutput, InRef, InstanceId, OutRef};
pub use error::ElabError;
pub use instance::Instance;

use ferro_common::StructuralHasher;
use ferro_ir::{Arena, Design};
use std::collections::{BTreeMap, HashMap};

/// Elaborator configuration.
#[derive(Debug, Clone)]
pub struct ElabConfig {
    /// Merge labelled scalar ports into bus ports.
    pub global_bussification: bool,
    /// Per-module-name overrides of the global bussification flag, keyed
    /// by the user module name.
    pub module_bussification: BTreeMap<String, bool>,
}

impl Default for ElabConfig {
    fn default() -> Self {
        Self {
            global_bussification: true,
            module_bussification: BTreeMap::new(),
        }
    }
}

/// The elaborated IR: instances (one per hierarchy level, later one per
/// module) and entities (one per surviving block, plus synthesized port
/// and instance entities).
#[derive(Debug)]
pub struct Elaboration {
    /// All instances.
    pub instances: Arena<InstanceId, Instance>,
    /// All entities; membership in an instance goes through
    /// [`Instance::entities`].
    pub entities: Arena<EntityId, Entity>,
    /// The configuration the elaboration ran with.
    pub config: ElabConfig,
}

/// Runs the full elaboration pipeline over a design.
pub fn elaborate(design: &mut Design, config: ElabConfig) -> Result<Elaboration, ElabError> {
    design.simplify();
    let mut elab = Elaboration {
        instances: Arena::new(),
        entities: Arena::new(),
        config,
    };
    let mapping = elab.map_entities(design)?;
    elab.map_connections(design, &mapping)?;
    elab.place_ports()?;
    elab.name_ports()?;
    elab.identify_instances()?;
    elab.generate_modules()?;
    elab.check_consistency()?;
    Ok(elab)
}

impl Elaboration {
    /// Appends a fresh entity to an instance and returns its ID.
    pub fn add_entity(
        &mut self,
        instance: InstanceId,
        class: &str,
        name: String,
        input_count: usize,
        output_count: usize,
    ) -> EntityId {
        let index_in_instance = self.next_entity_index(instance);
        let id = self.entities.alloc(Entity::new(
            instance,
            index_in_instance,
            class,
            name,
            input_count,
            output_count,
        ));
        self.instances[instance].entities.push(id);
        id
    }

    fn next_entity_index(&mut self, instance: InstanceId) -> u32 {
        let counter = self.instances[instance].next_entity_index;
        self.instances[instance].next_entity_index += 1;
        counter
    }

    /// Connects an entity output to an entity input.
    pub fn connect(&mut self, output: OutRef, input: InRef) -> Result<(), ElabError> {
        if self.entities[input.0].inputs[input.1 as usize].driver.is_some() {
            return Err(ElabError::Internal(format!(
                "input {}.{} already has a driver",
                self.entities[input.0].name, input.1
            )));
        }
        self.entities[input.0].inputs[input.1 as usize].driver = Some(output);
        self.entities[output.0].outputs[output.1 as usize]
            .targets
            .push(input);
        Ok(())
    }

    /// Breaks the connection into an entity input.
    pub fn break_connection(&mut self, input: InRef) -> Result<(), ElabError> {
        let driver = self.entities[input.0].inputs[input.1 as usize]
            .driver
            .take()
            .ok_or_else(|| {
                ElabError::Internal(format!(
                    "input {}.{} is not connected",
                    self.entities[input.0].name, input.1
                ))
            })?;
        let targets = &mut self.entities[driver.0].outputs[driver.1 as usize].targets;
        if let Some(position) = targets.iter().position(|t| *t == input) {
            targets.remove(position);
        }
        Ok(())
    }

    /// Whether `instance` is a strict descendant of `ancestor`.
    pub fn child_of(&self, instance: InstanceId, ancestor: InstanceId) -> bool {
        let mut current = self.instances[instance].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.instances[parent].parent;
        }
        false
    }

    /// The `/`-separated hierarchical name of an instance.
    pub fn full_instance_name(&self, id: InstanceId) -> String {
        let mut parts = vec![self.instances[id].name.clone()];
        let mut current = self.instances[id].parent;
        while let Some(parent) = current {
            parts.push(self.instances[parent].name.clone());
            current = self.instances[parent].parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Resolves an instance through the unification chain.
    pub fn resolve(&self, id: InstanceId) -> InstanceId {
        let mut current = id;
        while let Some(next) = self.instances[current].unified_with {
            current = next;
        }
        current
    }

    /// The structural hash of an instance.
    ///
    /// Mixes port counts and names, per-entity class and pin counts, the
    /// driver topology of every input (driving entity index, driving pin
    /// index, fanout, type), the property bags, and the hashes of target
    /// modules.
    pub fn instance_hash(&self, id: InstanceId) -> u64 {
        let mut memo = HashMap::new();
        self.instance_hash_memo(id, &mut memo)
    }

    fn instance_hash_memo(&self, id: InstanceId, memo: &mut HashMap<InstanceId, u64>) -> u64 {
        let id = self.resolve(id);
        if let Some(hash) = memo.get(&id) {
            return *hash;
        }
        let instance = &self.instances[id];
        let mut hasher = StructuralHasher::new();

        hasher.combine_usize(instance.input_ports.len());
        hasher.combine_usize(instance.output_ports.len());
        for port in &instance.input_ports {
            let port = &self.entities[*port];
            hasher.combine_usize(port.outputs.len());
            if let Some(first) = port.outputs.first() {
                hasher.combine_str(&first.name);
            }
        }
        hasher.combine_u64(0x5f81d486188add2c);
        for port in &instance.output_ports {
            let port = &self.entities[*port];
            hasher.combine_usize(port.inputs.len());
            if let Some(first) = port.inputs.first() {
                hasher.combine_str(&first.name);
            }
        }
        hasher.combine_u64(0xdcb41711c1cff296);

        let mut counter: u64 = 0x112fd1f4;
        for entity_id in &instance.entities {
            let entity = &self.entities[*entity_id];
            hasher.combine_str(&entity.name);
            hasher.combine_str(&entity.class);
            hasher.combine_usize(entity.inputs.len());
            hasher.combine_usize(entity.outputs.len());

            for input in &entity.inputs {
                if let Some((driver_entity, driver_pin)) = input.driver {
                    let driver = &self.entities[driver_entity];
                    hasher.combine_u64(driver.index_in_instance as u64);
                    hasher.combine_u64(driver_pin as u64);
                    hasher.combine_usize(driver.outputs[driver_pin as usize].targets.len());
                    hasher.combine_str(&driver.outputs[driver_pin as usize].ty.to_string());
                }
                hasher.combine_u64(counter);
                counter += 1;
            }

            entity.properties.combine_hash(&mut hasher);

            if let Some(target) = entity.target_module {
                let target_hash = self.instance_hash_memo(target, memo);
                hasher.combine_u64(target_hash);
            }
            hasher.combine_u64(counter);
            counter += 1;
        }

        let hash = hasher.finish();
        memo.insert(id, hash);
        hash
    }

    /// Verifies the internal consistency of every entity.
    pub fn check_consistency(&self) -> Result<(), ElabError> {
        let mut problems = Vec::new();
        for (instance_id, instance) in self.instances.iter() {
            for entity_id in &instance.entities {
                if !self.entities[*entity_id].is_consistent() {
                    problems.push(format!(
                        "entity '{}/{}' failed consistency checks",
                        self.full_instance_name(instance_id),
                        self.entities[*entity_id].name
                    ));
                }
            }
        }
        ElabError::from_problems("consistency", problems)
    }
}
