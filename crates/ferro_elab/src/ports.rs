//! Port insertion at hierarchy boundaries (the third pass).
//!
//! For every edge whose driver lives outside the consumer's instance
//! subtree, an `input_port` entity is inserted on the consumer side and a
//! `$input_connector` on the parent side, and symmetrically
//! `output_port` / `$output_connector` for edges leaving a subtree. The
//! passes repeat until no boundary-crossing edge remains.

use crate::entity::{InRef, OutRef};
use crate::error::ElabError;
use crate::Elaboration;

impl Elaboration {
    fn inside(&self, instance: crate::InstanceId, candidate: crate::InstanceId) -> bool {
        candidate == instance || self.child_of(candidate, instance)
    }

    pub(crate) fn place_input_ports(&mut self, first_pass: bool) -> Result<bool, ElabError> {
        let mut added = false;

        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            let mut position = 0;
            // New entities appended during the scan are visited as well.
            while position < self.instances[instance_id].entities.len() {
                let entity_id = self.instances[instance_id].entities[position];
                position += 1;

                let class = self.entities[entity_id].class.clone();
                if !first_pass && class != "$input_connector" {
                    continue;
                }
                if class == "input_port" {
                    continue;
                }

                loop {
                    // Find an input driven from outside this subtree.
                    let mut crossing: Option<OutRef> = None;
                    for input in &self.entities[entity_id].inputs {
                        if let Some(driver) = input.driver {
                            let driver_instance = self.entities[driver.0].instance;
                            if !self.inside(instance_id, driver_instance) {
                                crossing = Some(driver);
                                break;
                            }
                        }
                    }
                    let Some(driver) = crossing else {
                        break;
                    };

                    // All inputs in this subtree fed by the same driver
                    // share one port.
                    let bunch: Vec<InRef> = self.entities[driver.0].outputs[driver.1 as usize]
                        .targets
                        .iter()
                        .filter(|target| {
                            self.inside(instance_id, self.entities[target.0].instance)
                        })
                        .copied()
                        .collect();

                    let name = format!(
                        "input_port{}",
                        self.instances[instance_id].input_ports.len() + 1
                    );
                    let port = self.add_entity(instance_id, "input_port", name, 1, 1);
                    let ty = self.entities[driver.0].outputs[driver.1 as usize].ty;
                    self.entities[port].outputs[0].ty = ty;

                    for target in bunch {
                        self.break_connection(target)?;
                        self.connect((port, 0), target)?;
                    }
                    self.connect(driver, (port, 0))?;

                    self.instances[instance_id].input_ports.push(port);
                    added = true;
                }
            }
        }
        Ok(added)
    }

    pub(crate) fn place_input_connectors(&mut self) -> Result<(), ElabError> {
        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            for port in self.instances[instance_id].input_ports.clone() {
                if self.entities[port].class != "input_port" {
                    continue;
                }
                let Some(driver) = self.entities[port].inputs[0].driver else {
                    continue;
                };
                if self.entities[driver.0].class == "$input_connector" {
                    continue;
                }
                let parent = self.instances[instance_id].parent.ok_or_else(|| {
                    ElabError::Internal(format!(
                        "input port of root instance '{}' cannot be connected",
                        self.instances[instance_id].name
                    ))
                })?;

                let connector =
                    self.add_entity(parent, "$input_connector", String::new(), 1, 1);
                let ty = self.entities[driver.0].outputs[driver.1 as usize].ty;
                self.entities[connector].outputs[0].ty = ty;

                self.break_connection((port, 0))?;
                self.connect(driver, (connector, 0))?;
                self.connect((connector, 0), (port, 0))?;
            }
        }
        Ok(())
    }

    pub(crate) fn place_output_ports(&mut self, first_pass: bool) -> Result<bool, ElabError> {
        let mut added = false;

        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            let mut position = 0;
            while position < self.instances[instance_id].entities.len() {
                let entity_id = self.instances[instance_id].entities[position];
                position += 1;

                let class = self.entities[entity_id].class.clone();
                if !first_pass && class != "$output_connector" {
                    continue;
                }
                if class == "output_port" {
                    continue;
                }

                for output_index in 0..self.entities[entity_id].outputs.len() {
                    let bunch: Vec<InRef> = self.entities[entity_id].outputs[output_index]
                        .targets
                        .iter()
                        .filter(|target| {
                            !self.inside(instance_id, self.entities[target.0].instance)
                        })
                        .copied()
                        .collect();
                    if bunch.is_empty() {
                        continue;
                    }

                    let name = format!(
                        "output_port{}",
                        self.instances[instance_id].output_ports.len() + 1
                    );
                    let port = self.add_entity(instance_id, "output_port", name, 1, 1);
                    let ty = self.entities[entity_id].outputs[output_index].ty;
                    self.entities[port].outputs[0].ty = ty;

                    for target in bunch {
                        self.break_connection(target)?;
                        self.connect((port, 0), target)?;
                    }
                    self.connect((entity_id, output_index as u32), (port, 0))?;

                    self.instances[instance_id].output_ports.push(port);
                    added = true;
                }
            }
        }
        Ok(added)
    }

    pub(crate) fn place_output_connectors(&mut self) -> Result<(), ElabError> {
        for instance_id in self.instances.ids().collect::<Vec<_>>() {
            for port in self.instances[instance_id].output_ports.clone() {
                if self.entities[port].class != "output_port" {
                    continue;
                }
                {
                    let targets = &self.entities[port].outputs[0].targets;
                    if targets.len() == 1 && self.entities[targets[0].0].class == "$output_connector"
                    {
                        continue;
                    }
                }
                let parent = self.instances[instance_id].parent.ok_or_else(|| {
                    ElabError::Internal(format!(
                        "output port of root instance '{}' cannot be connected",
                        self.instances[instance_id].name
                    ))
                })?;

                let connector =
                    self.add_entity(parent, "$output_connector", String::new(), 1, 1);
                let ty = self.entities[port].outputs[0].ty;
                self.entities[connector].outputs[0].ty = ty;

                let targets = self.entities[port].outputs[0].targets.clone();
                for target in &targets {
                    self.break_connection(*target)?;
                }
                for target in &targets {
                    self.connect((connector, 0), *target)?;
                }
                self.connect((port, 0), (connector, 0))?;
            }
        }
        Ok(())
    }

    /// Inserts ports and connectors until no edge crosses a hierarchy
    /// boundary.
    pub(crate) fn place_ports(&mut self) -> Result<(), ElabError> {
        let mut keep_going = self.place_input_ports(true)?;
        while keep_going {
            self.place_input_connectors()?;
            keep_going = self.place_input_ports(false)?;
        }

        let mut keep_going = self.place_output_ports(true)?;
        while keep_going {
            self.place_output_connectors()?;
            keep_going = self.place_output_ports(false)?;
        }
        Ok(())
    }
}
