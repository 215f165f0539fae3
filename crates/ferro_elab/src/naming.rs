//! Port naming and bussification (the fourth pass).
//!
//! `$label` entities marked `input` or `output` donate their names to the
//! ports their labelled nodes pass through. A bus label that covers a
//! complete, type-uniform set of ports merges them into one bus port;
//! otherwise the ports fall back to `<label>_<i>`. Unlabelled ports are
//! named `Unnamed<k>`.

use crate::entity::EntityId;
use crate::error::ElabError;
use crate::{Elaboration, InstanceId};
use ferro_fixed::SignalType;
use std::collections::BTreeSet;

impl Elaboration {
    fn assign_bus_input_labels(
        &mut self,
        instance_id: InstanceId,
        unassigned: &mut BTreeSet<EntityId>,
        labels: &[EntityId],
        bussify: bool,
    ) -> Result<(), ElabError> {
        let mut new_ports = 0;

        for &label in labels {
            if self.entities[label].properties.get_int("isBus") != Some(1) {
                continue;
            }
            let size = self.entities[label].inputs.len();
            if size < 1 {
                continue;
            }
            let name = self.entities[label].inputs[0].name.clone();

            // Collect the input_port entities belonging to this bus.
            let mut ports = Vec::with_capacity(size);
            let mut ty = SignalType::Unknown;
            let mut uniform = true;
            for input in &self.entities[label].inputs {
                let Some(driver) = input.driver else { break };
                let driver_ty = self.entities[driver.0].outputs[driver.1 as usize].ty;
                if ty.is_known() {
                    if ty != driver_ty {
                        uniform = false;
                    }
                } else {
                    ty = driver_ty;
                }
                if !unassigned.contains(&driver.0) {
                    break;
                }
                ports.push(driver.0);
            }
            if ports.len() != size {
                continue;
            }
            let port_set: BTreeSet<EntityId> = ports.iter().copied().collect();
            if port_set.len() != size {
                continue;
            }

            if !uniform || !bussify {
                for (i, port) in ports.iter().enumerate() {
                    self.entities[*port].outputs[0].name = format!("{name}_{i}");
                }
                continue;
            }

            // Merge into one bus port.
            new_ports += 1;
            let bus_port = self.add_entity(
                instance_id,
                "input_port",
                format!("bus_input_port{new_ports}"),
                size,
                size,
            );
            for (i, port) in ports.iter().enumerate() {
                let connector = self.entities[*port].inputs[0]
                    .driver
                    .ok_or_else(|| ElabError::Internal("unconnected input port".into()))?;
                let targets = self.entities[*port].outputs[0].targets.clone();

                self.break_connection((*port, 0))?;
                for target in &targets {
                    self.break_connection(*target)?;
                }
                self.connect(connector, (bus_port, i as u32))?;
                for target in &targets {
                    self.connect((bus_port, i as u32), *target)?;
                }

                let output = &mut self.entities[bus_port].outputs[i];
                output.name = name.clone();
                output.ty = ty;
                output.bus_index = i as u32;
                output.bus_size = Some(size as u32);
                output.group_index = 0;

                unassigned.remove(port);
            }

            self.instances[instance_id]
                .entities
                .retain(|id| !port_set.contains(id));
        }
        Ok(())
    }

    fn assign_node_input_labels(
        &mut self,
        unassigned: &mut BTreeSet<EntityId>,
        labels: &[EntityId],
    ) {
        for &label in labels {
            if self.entities[label].properties.get_int("isBus") == Some(1) {
                continue;
            }
            let Some(driver) = self.entities[label].inputs[0].driver else {
                continue;
            };
            if !unassigned.remove(&driver.0) {
                continue;
            }
            let name = self.entities[label].inputs[0].name.clone();
            self.entities[driver.0].outputs[0].name = name;
        }
    }

    fn find_output_port(&self, unassigned: &BTreeSet<EntityId>, driver: crate::OutRef) -> Option<EntityId> {
        unassigned
            .iter()
            .find(|port| self.entities[**port].inputs[0].driver == Some(driver))
            .copied()
    }

    fn assign_bus_output_labels(
        &mut self,
        instance_id: InstanceId,
        unassigned: &mut BTreeSet<EntityId>,
        labels: &[EntityId],
        bussify: bool,
    ) -> Result<(), ElabError> {
        let mut new_ports = 0;

        for &label in labels {
            if self.entities[label].properties.get_int("isBus") != Some(1) {
                continue;
            }
            let size = self.entities[label].inputs.len();
            if size < 1 {
                continue;
            }
            let name = self.entities[label].inputs[0].name.clone();

            let mut ports = Vec::with_capacity(size);
            let mut ty = SignalType::Unknown;
            let mut uniform = true;
            for index in 0..size {
                let Some(driver) = self.entities[label].inputs[index].driver else {
                    break;
                };
                let driver_ty = self.entities[driver.0].outputs[driver.1 as usize].ty;
                if ty.is_known() {
                    if ty != driver_ty {
                        uniform = false;
                    }
                } else {
                    ty = driver_ty;
                }
                let Some(port) = self.find_output_port(unassigned, driver) else {
                    break;
                };
                ports.push(port);
            }
            if ports.len() != size {
                continue;
            }
            let port_set: BTreeSet<EntityId> = ports.iter().copied().collect();
            if port_set.len() != size {
                continue;
            }

            if !uniform || !bussify {
                for (i, port) in ports.iter().enumerate() {
                    self.entities[*port].inputs[0].name = format!("{name}_{i}");
                }
                continue;
            }

            new_ports += 1;
            let bus_port = self.add_entity(
                instance_id,
                "output_port",
                format!("bus_output_port{new_ports}"),
                size,
                size,
            );
            for (i, port) in ports.iter().enumerate() {
                let driver = self.entities[*port].inputs[0]
                    .driver
                    .ok_or_else(|| ElabError::Internal("unconnected output port".into()))?;
                let connector = self.entities[*port].outputs[0]
                    .targets
                    .first()
                    .copied()
                    .ok_or_else(|| ElabError::Internal("dangling output port".into()))?;

                self.break_connection((*port, 0))?;
                self.break_connection(connector)?;
                self.connect(driver, (bus_port, i as u32))?;
                self.connect((bus_port, i as u32), connector)?;

                self.entities[bus_port].inputs[i].name = name.clone();
                let output = &mut self.entities[bus_port].outputs[i];
                output.ty = ty;
                output.bus_index = i as u32;
                output.bus_size = Some(size as u32);
                output.group_index = 0;

                unassigned.remove(port);
            }

            self.instances[instance_id]
                .entities
                .retain(|id| !port_set.contains(id));
        }
        Ok(())
    }

    fn assign_node_output_labels(
        &mut self,
        unassigned: &mut BTreeSet<EntityId>,
        labels: &[EntityId],
    ) {
        for &label in labels {
            if self.entities[label].properties.get_int("isBus") == Some(1) {
                continue;
            }
            let Some(driver) = self.entities[label].inputs[0].driver else {
                continue;
            };
            let Some(port) = self.find_output_port(unassigned, driver) else {
                continue;
            };
            let name = self.entities[label].inputs[0].name.clone();
            self.entities[port].inputs[0].name = name;
            unassigned.remove(&port);
        }
    }

    /// Names every port from the labels in its instance, bussifying
    /// complete uniform buses, and falls back to `Unnamed<k>`.
    pub(crate) fn name_ports(&mut self) -> Result<(), ElabError> {
        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            let mut unassigned_inputs = BTreeSet::new();
            let mut unassigned_outputs = BTreeSet::new();
            let mut input_labels = Vec::new();
            let mut output_labels = Vec::new();

            for &entity_id in &self.instances[instance_id].entities {
                let entity = &self.entities[entity_id];
                match entity.class.as_str() {
                    "input_port" => {
                        unassigned_inputs.insert(entity_id);
                    }
                    "output_port" => {
                        unassigned_outputs.insert(entity_id);
                    }
                    "$label" => match entity.properties.get_string("class") {
                        Some("input") => input_labels.push(entity_id),
                        Some("output") => output_labels.push(entity_id),
                        _ => {}
                    },
                    _ => {}
                }
            }

            let user_name = self.instances[instance_id].user_module_name.clone();
            let bussify = self
                .config
                .module_bussification
                .get(&user_name)
                .copied()
                .unwrap_or(self.config.global_bussification);

            self.assign_bus_input_labels(instance_id, &mut unassigned_inputs, &input_labels, bussify)?;
            self.assign_bus_output_labels(
                instance_id,
                &mut unassigned_outputs,
                &output_labels,
                bussify,
            )?;
            self.assign_node_input_labels(&mut unassigned_inputs, &input_labels);
            self.assign_node_output_labels(&mut unassigned_outputs, &output_labels);

            // Recollect the ports and name the unlabelled ones.
            let mut unnamed_inputs = 0;
            let mut unnamed_outputs = 0;
            self.instances[instance_id].input_ports.clear();
            self.instances[instance_id].output_ports.clear();
            for entity_id in self.instances[instance_id].entities.clone() {
                let class = self.entities[entity_id].class.clone();
                match class.as_str() {
                    "input_port" => {
                        if self.entities[entity_id].outputs[0].name.is_empty() {
                            let name = format!("Unnamed{unnamed_inputs}");
                            unnamed_inputs += 1;
                            for output in self.entities[entity_id].outputs.iter_mut() {
                                output.name = name.clone();
                            }
                        }
                        self.instances[instance_id].input_ports.push(entity_id);
                    }
                    "output_port" => {
                        if self.entities[entity_id].inputs[0].name.is_empty() {
                            let name = format!("Unnamed{unnamed_outputs}");
                            unnamed_outputs += 1;
                            for input in self.entities[entity_id].inputs.iter_mut() {
                                input.name = name.clone();
                            }
                        }
                        self.instances[instance_id].output_ports.push(entity_id);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}
