//! SystemVerilog emission from the elaborated IR.
//!
//! One file per unique module, plus a list-of-files. Each file holds one
//! `module` with port order `clk`, negated reset (default `nrst`), module
//! inputs, module outputs. Signals are declared `var logic`, `signed` for
//! signed fixed-point; registers become
//! `always @(posedge clk or negedge nrst)` blocks with the clock enable
//! gated inside the non-reset branch.

#![warn(missing_docs)]

pub mod entities;

use ferro_elab::{Elaboration, EntityId, InstanceId};
use ferro_fixed::SignalType;
use std::fs;
use std::io;
use std::path::Path;

/// Emitter configuration.
#[derive(Debug, Clone)]
pub struct VerilogConfig {
    /// Name of the negated asynchronous reset input.
    pub negated_reset_name: String,
    /// Sub-directory for `!`-marked model modules.
    pub models_path: Option<String>,
}

impl Default for VerilogConfig {
    fn default() -> Self {
        Self {
            negated_reset_name: "nrst".to_string(),
            models_path: None,
        }
    }
}

/// Errors raised while writing Verilog files.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// A file could not be written.
    #[error("verilog output error: {0}")]
    Io(#[from] io::Error),
}

/// The SystemVerilog exporter.
#[derive(Debug)]
pub struct VerilogExporter {
    config: VerilogConfig,
    list_of_files: Vec<String>,
}

/// Replaces characters that are not legal in identifiers.
pub fn compliant_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// The declaration suffix for a signal: dimensions plus name.
pub fn signal_declaration(ty: &SignalType, name: &str, bus_size: Option<u32>) -> String {
    let mut decl = String::new();
    if ty.is_signed() == Some(true) {
        decl.push_str(" signed");
    }
    if let Some(size) = bus_size {
        decl.push_str(&format!(" [{}:0]", size - 1));
    }
    if let Some(width) = ty.bit_width() {
        if width > 1 {
            decl.push_str(&format!(" [{}:0]", width - 1));
        }
    }
    decl.push(' ');
    decl.push_str(name);
    decl
}

impl VerilogExporter {
    /// Creates an exporter with the given configuration.
    pub fn new(config: VerilogConfig) -> Self {
        Self {
            config,
            list_of_files: Vec::new(),
        }
    }

    /// The files emitted by the last export, excluding models.
    pub fn list_of_files(&self) -> &[String] {
        &self.list_of_files
    }

    /// Rewrites all names for emission: `in_` / `out_` port prefixes,
    /// `u_` instance prefixes, identifier sanitization, and unique flat
    /// names for entity outputs.
    pub fn prepare(&self, elab: &mut Elaboration) {
        for instance_id in elab.instances.ids().collect::<Vec<_>>() {
            if elab.instances[instance_id].unified_with.is_some() {
                continue;
            }

            for port in elab.instances[instance_id].input_ports.clone() {
                for output in elab.entities[port].outputs.iter_mut() {
                    output.name = format!("in_{}", compliant_name(&output.name));
                }
            }
            for port in elab.instances[instance_id].output_ports.clone() {
                for input in elab.entities[port].inputs.iter_mut() {
                    input.name = format!("out_{}", compliant_name(&input.name));
                }
            }

            for entity_id in elab.instances[instance_id].entities.clone() {
                let class = elab.entities[entity_id].class.clone();
                if class == "input_port" || class == "output_port" {
                    continue;
                }
                let base = if class == "instance" {
                    format!("u_{}", compliant_name(&elab.entities[entity_id].name))
                } else {
                    compliant_name(&elab.entities[entity_id].name)
                };
                elab.entities[entity_id].name = base.clone();
                for output in elab.entities[entity_id].outputs.iter_mut() {
                    let mut name = format!("{base}_{}", compliant_name(&output.name));
                    if output.bus_size.is_some() {
                        name = format!("{name}_{}", output.bus_index);
                    }
                    output.name = name;
                }
            }
        }
    }

    /// The full signal expression for an entity output.
    pub fn signal_ref(elab: &Elaboration, output: (EntityId, u32)) -> String {
        let entity = &elab.entities[output.0];
        let pin = &entity.outputs[output.1 as usize];
        if entity.class == "input_port" && pin.bus_size.is_some() {
            format!("{}[{}]", pin.name, pin.bus_index)
        } else {
            pin.name.clone()
        }
    }

    /// The expression driving an entity input.
    pub fn input_ref(elab: &Elaboration, entity: EntityId, index: usize) -> String {
        match elab.entities[entity].inputs[index].driver {
            Some(driver) => Self::signal_ref(elab, driver),
            None => "'0".to_string(),
        }
    }

    /// Emits the text of one module.
    pub fn emit_module(&self, elab: &Elaboration, instance_id: InstanceId) -> String {
        let instance = &elab.instances[instance_id];
        let nrst = &self.config.negated_reset_name;
        let mut f = String::new();

        f.push_str(&format!("module {}\n(\n", instance.module_name));
        f.push_str(&format!("\tinput var logic clk,\n\tinput var logic {nrst}"));
        let has_ports = !instance.input_ports.is_empty() || !instance.output_ports.is_empty();
        f.push_str(if has_ports { ",\n\n" } else { "\n" });

        let mut remaining = instance.input_ports.len() + instance.output_ports.len();
        for port in &instance.input_ports {
            let output = &elab.entities[*port].outputs[0];
            remaining -= 1;
            f.push_str(&format!(
                "\tinput var logic{}{}\n",
                signal_declaration(&output.ty, &output.name, output.bus_size),
                if remaining == 0 { "" } else { "," }
            ));
        }
        for port in &instance.output_ports {
            let entity = &elab.entities[*port];
            let ty = entity.outputs[0].ty;
            remaining -= 1;
            f.push_str(&format!(
                "\toutput var logic{}{}\n",
                signal_declaration(&ty, &entity.inputs[0].name, entity.outputs[0].bus_size),
                if remaining == 0 { "" } else { "," }
            ));
        }
        f.push_str(");\n\n");

        // Signal declarations for every non-port entity output.
        for entity_id in &instance.entities {
            let entity = &elab.entities[*entity_id];
            if entity.class == "input_port" || entity.class == "output_port" {
                continue;
            }
            for output in &entity.outputs {
                f.push_str(&format!(
                    "\tvar logic{};\n",
                    signal_declaration(&output.ty, &output.name, None)
                ));
            }
            entities::write_preamble(elab, *entity_id, &mut f);
        }
        f.push('\n');

        // Entity code, output ports last.
        for entity_id in &instance.entities {
            if elab.entities[*entity_id].class != "output_port" {
                entities::write_code(self, elab, *entity_id, &mut f);
            }
        }
        f.push('\n');
        for entity_id in &instance.entities {
            if elab.entities[*entity_id].class == "output_port" {
                entities::write_code(self, elab, *entity_id, &mut f);
            }
        }

        f.push_str("\nendmodule\n");
        f
    }

    /// The negated reset name from the configuration.
    pub fn reset_name(&self) -> &str {
        &self.config.negated_reset_name
    }

    /// Emits one file per unique module under `base_path` and records the
    /// list of files.
    pub fn export(&mut self, elab: &mut Elaboration, base_path: &Path) -> Result<(), EmitError> {
        self.prepare(elab);
        self.list_of_files.clear();

        let models_path = match &self.config.models_path {
            Some(sub) => {
                let path = base_path.join(sub);
                fs::create_dir_all(&path)?;
                path
            }
            None => base_path.to_path_buf(),
        };

        for instance_id in elab.instances.ids().collect::<Vec<_>>() {
            if elab.instances[instance_id].unified_with.is_some() {
                continue;
            }
            let is_model = elab.instances[instance_id].is_model;
            let file_name = format!("{}.sv", elab.instances[instance_id].module_name);
            let directory = if is_model { &models_path } else { base_path };
            let text = self.emit_module(elab, instance_id);
            fs::write(directory.join(&file_name), text)?;
            if !is_model {
                self.list_of_files.push(file_name);
            }
        }

        let list = self.list_of_files.join("\n");
        fs::write(base_path.join("files.txt"), list)?;
        Ok(())
    }
}
