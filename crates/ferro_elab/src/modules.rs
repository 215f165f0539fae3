//! Instance lowering, module unification, and module naming (the final
//! passes).

use crate::entity::{EntityId, InstanceId};
use crate::error::ElabError;
use crate::Elaboration;
use std::collections::BTreeMap;

#[derive(Default)]
struct Connectivity {
    input_connectors: Vec<EntityId>,
    output_connectors: Vec<EntityId>,
}

impl Elaboration {
    /// Replaces every `$input_connector` / `$output_connector` group at a
    /// call site with a single `instance` entity pointing at the child
    /// module, whose pins mirror the child's ports.
    pub(crate) fn identify_instances(&mut self) -> Result<(), ElabError> {
        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            // Group the connectors by the child instance they talk to,
            // in child sequence order.
            let mut groups: BTreeMap<(u32, InstanceId), Connectivity> = BTreeMap::new();
            for &entity_id in &self.instances[instance_id].entities {
                let entity = &self.entities[entity_id];
                if entity.class == "$input_connector" {
                    let target = entity.outputs[0]
                        .targets
                        .first()
                        .ok_or_else(|| ElabError::Internal("dangling input connector".into()))?;
                    let child = self.entities[target.0].instance;
                    groups
                        .entry((self.instances[child].sequence, child))
                        .or_default()
                        .input_connectors
                        .push(entity_id);
                } else if entity.class == "$output_connector" {
                    let driver = entity.inputs[0]
                        .driver
                        .ok_or_else(|| ElabError::Internal("dangling output connector".into()))?;
                    let child = self.entities[driver.0].instance;
                    groups
                        .entry((self.instances[child].sequence, child))
                        .or_default()
                        .output_connectors
                        .push(entity_id);
                }
            }

            for ((_, child), connectivity) in groups {
                let child_name = self.instances[child].name.clone();
                let instance_entity = self.add_entity(
                    instance_id,
                    "instance",
                    child_name,
                    connectivity.input_connectors.len(),
                    connectivity.output_connectors.len(),
                );
                self.entities[instance_entity].target_module = Some(child);

                // Rewire the input connectors to the instance entity's
                // inputs, in child port order.
                let mut port_index = 0u32;
                for port in self.instances[child].input_ports.clone() {
                    for i in 0..self.entities[port].inputs.len() as u32 {
                        let connector = self.entities[port].inputs[i as usize]
                            .driver
                            .ok_or_else(|| {
                                ElabError::Internal("input port lost its connector".into())
                            })?
                            .0;
                        let pin_name = self.entities[port].outputs[i as usize].name.clone();
                        self.entities[instance_entity].inputs[port_index as usize].name =
                            format!("In_{pin_name}");

                        let source = self.entities[connector].inputs[0].driver.ok_or_else(|| {
                            ElabError::Internal("input connector lost its driver".into())
                        })?;

                        self.break_connection((connector, 0))?;
                        self.break_connection((port, i))?;
                        self.connect(source, (instance_entity, port_index))?;

                        port_index += 1;
                    }
                }

                // Rewire the output connectors to the instance entity's
                // outputs.
                let mut port_index = 0u32;
                let mut group_index = 0i32;
                for port in self.instances[child].output_ports.clone() {
                    for i in 0..self.entities[port].outputs.len() as u32 {
                        let connector = self.entities[port].outputs[i as usize]
                            .targets
                            .first()
                            .copied()
                            .ok_or_else(|| {
                                ElabError::Internal("output port lost its connector".into())
                            })?
                            .0;

                        let pin_name = self.entities[port].inputs[i as usize].name.clone();
                        {
                            let source = &self.entities[port].outputs[i as usize];
                            let ty = source.ty;
                            let bus_size = source.bus_size;
                            let bus_index = source.bus_index;
                            let output =
                                &mut self.entities[instance_entity].outputs[port_index as usize];
                            output.name = format!("Out_{pin_name}");
                            output.ty = ty;
                            output.bus_size = bus_size;
                            output.bus_index = bus_index;
                            output.group_index = group_index;
                        }

                        let targets = self.entities[connector].outputs[0].targets.clone();
                        for target in &targets {
                            self.break_connection(*target)?;
                        }
                        self.break_connection((connector, 0))?;
                        for target in &targets {
                            self.connect((instance_entity, port_index), *target)?;
                        }

                        port_index += 1;
                    }
                    group_index += 1;
                }
            }

            // Drop the fully disconnected connectors.
            let entities = &self.entities;
            self.instances[instance_id].entities.retain(|id| {
                let class = entities[*id].class.as_str();
                class != "$input_connector" && class != "$output_connector"
            });
        }
        Ok(())
    }

    fn instances_equal(&self, a: InstanceId, b: InstanceId) -> bool {
        let left = &self.instances[a];
        let right = &self.instances[b];
        if left.entities.len() != right.entities.len()
            || left.input_ports.len() != right.input_ports.len()
            || left.output_ports.len() != right.output_ports.len()
        {
            return false;
        }

        // Quick checks first.
        for (x, y) in left.entities.iter().zip(&right.entities) {
            let ex = &self.entities[*x];
            let ey = &self.entities[*y];
            if ex.class != ey.class
                || ex.inputs.len() != ey.inputs.len()
                || ex.outputs.len() != ey.outputs.len()
                || ex.target_module.map(|t| self.resolve(t))
                    != ey.target_module.map(|t| self.resolve(t))
            {
                return false;
            }
        }

        // Driver topology and properties.
        for (x, y) in left.entities.iter().zip(&right.entities) {
            let ex = &self.entities[*x];
            let ey = &self.entities[*y];
            for (ix, iy) in ex.inputs.iter().zip(&ey.inputs) {
                match (ix.driver, iy.driver) {
                    (None, None) => {}
                    (Some(dx), Some(dy)) => {
                        let dex = &self.entities[dx.0];
                        let dey = &self.entities[dy.0];
                        if dex.index_in_instance != dey.index_in_instance
                            || dx.1 != dy.1
                            || dex.outputs[dx.1 as usize].targets.len()
                                != dey.outputs[dy.1 as usize].targets.len()
                            || dex.outputs[dx.1 as usize].ty != dey.outputs[dy.1 as usize].ty
                        {
                            return false;
                        }
                    }
                    _ => return false,
                }
            }
            if ex.properties != ey.properties {
                return false;
            }
        }

        // Port names.
        for (x, y) in left.input_ports.iter().zip(&right.input_ports) {
            let px = &self.entities[*x];
            let py = &self.entities[*y];
            for (ox, oy) in px.outputs.iter().zip(&py.outputs) {
                if ox.name != oy.name {
                    return false;
                }
            }
        }
        for (x, y) in left.output_ports.iter().zip(&right.output_ports) {
            let px = &self.entities[*x];
            let py = &self.entities[*y];
            for (ix, iy) in px.inputs.iter().zip(&py.inputs) {
                if ix.name != iy.name {
                    return false;
                }
            }
        }

        true
    }

    fn unify(&mut self, survivor: InstanceId, duplicate: InstanceId) {
        for id in self.entities.ids().collect::<Vec<_>>() {
            if self.entities[id].class == "instance"
                && self.entities[id].target_module == Some(duplicate)
            {
                self.entities[id].target_module = Some(survivor);
            }
        }
        self.instances[duplicate].unified_with = Some(survivor);
    }

    /// Unifies structurally identical modules to fixpoint and assigns
    /// final module names.
    pub(crate) fn generate_modules(&mut self) -> Result<(), ElabError> {
        // Repeatedly scan the unfinished instances in sequence order and
        // unify equal pairs; retargeting instance entities can make
        // parents equal, so iterate to fixpoint.
        loop {
            let mut changed = false;
            let candidates: Vec<InstanceId> = self
                .instances
                .iter()
                .filter(|(_, instance)| instance.unified_with.is_none())
                .map(|(id, _)| id)
                .collect();

            for (position, &reference) in candidates.iter().enumerate() {
                if self.instances[reference].unified_with.is_some() {
                    continue;
                }
                let reference_hash = self.instance_hash(reference);
                for &other in &candidates[position + 1..] {
                    if self.instances[other].unified_with.is_some() {
                        continue;
                    }
                    if self.instance_hash(other) == reference_hash
                        && self.instances_equal(reference, other)
                    {
                        self.unify(reference, other);
                        changed = true;
                    }
                }
            }

            if !changed {
                break;
            }
        }

        // Resolve %Hash% tokens in user-supplied names.
        for id in self.instances.ids().collect::<Vec<_>>() {
            if self.instances[id].unified_with.is_some() {
                continue;
            }
            if self.instances[id].user_module_name.contains("%Hash%") {
                let hash = format!("{:016x}", self.instance_hash(id));
                let name = self.instances[id].user_module_name.replace("%Hash%", &hash);
                self.instances[id].user_module_name = name;
            }
        }

        // A leading '!' marks a model.
        for id in self.instances.ids().collect::<Vec<_>>() {
            if self.instances[id].unified_with.is_some() {
                continue;
            }
            let name = self.instances[id].user_module_name.clone();
            if let Some(stripped) = name.strip_prefix('!') {
                self.instances[id].user_module_name = stripped.to_string();
                self.instances[id].is_model = true;
            }
        }

        // Assign module names, falling back to the full hierarchical
        // path on clashes or missing names.
        let mut assignments: BTreeMap<String, Vec<InstanceId>> = BTreeMap::new();
        for (id, instance) in self.instances.iter() {
            if instance.unified_with.is_none() {
                assignments
                    .entry(instance.user_module_name.clone())
                    .or_default()
                    .push(id);
            }
        }
        for (name, ids) in assignments {
            if ids.len() == 1 && !name.is_empty() {
                self.instances[ids[0]].module_name = name;
            } else {
                for id in ids {
                    let fallback = self.full_instance_name(id);
                    self.instances[id].module_name = fallback;
                }
            }
        }

        // Identifier-safe characters only.
        for id in self.instances.ids().collect::<Vec<_>>() {
            let sanitized: String = self.instances[id]
                .module_name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            self.instances[id].module_name = sanitized;
        }

        Ok(())
    }
}
