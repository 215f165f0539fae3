//! Per-entity-class SystemVerilog emission.

use crate::VerilogExporter;
use ferro_elab::{Elaboration, EntityId};
use ferro_fixed::SignalType;

/// Classes with no hardware: simulation-only and ornament blocks.
pub fn is_ignored_class(class: &str) -> bool {
    matches!(
        class,
        "$label"
            | "$terminate"
            | "signal"
            | "probe"
            | "function"
            | "source"
            | "sink"
            | "random"
            | "temporary"
            | "identity"
    )
}

fn input_ty(elab: &Elaboration, entity: EntityId, index: usize) -> SignalType {
    match elab.entities[entity].inputs[index].driver {
        Some((driver, pin)) => elab.entities[driver].outputs[pin as usize].ty,
        None => SignalType::Unknown,
    }
}

fn signed_ref(elab: &Elaboration, entity: EntityId, index: usize) -> String {
    let signal = VerilogExporter::input_ref(elab, entity, index);
    if input_ty(elab, entity, index).is_signed() == Some(true) {
        format!("$signed({signal})")
    } else {
        signal
    }
}

fn shifted_ref(elab: &Elaboration, entity: EntityId, index: usize, align: i64) -> String {
    let base = signed_ref(elab, entity, index);
    if align > 0 {
        format!("({base} << {align})")
    } else {
        base
    }
}

/// Binary literal of a constant property value, e.g. `8'b00001010`.
fn constant_literal(literal: &str) -> String {
    if let Some(value) = literal.strip_prefix("bool:") {
        return format!("1'b{value}");
    }
    if let Some(value) = literal.strip_prefix("int32:") {
        let parsed: i64 = value.parse().unwrap_or(0);
        return format!("32'sd{}", parsed & 0xffff_ffff);
    }
    if let Some(value) = literal.strip_prefix("int64:") {
        let parsed: i64 = value.parse().unwrap_or(0);
        return format!("64'sd{}", parsed as u64);
    }
    // Fixed-point: "<ty>:l3_l2_l1_l0" with a sized binary literal result.
    if let Some((ty, limbs)) = literal.split_once(':') {
        let width = ty
            .split(['<', ','])
            .nth(1)
            .and_then(|w| w.parse::<u32>().ok())
            .unwrap_or(1);
        let mut words: Vec<u32> = limbs
            .split('_')
            .filter_map(|w| u32::from_str_radix(w, 16).ok())
            .collect();
        words.reverse(); // least-significant limb first
        let mut bits = String::with_capacity(width as usize);
        for position in (0..width).rev() {
            let word = words.get((position / 32) as usize).copied().unwrap_or(0);
            bits.push(if (word >> (position % 32)) & 1 != 0 { '1' } else { '0' });
        }
        return format!("{width}'b{bits}");
    }
    "'0".to_string()
}

/// Writes module-level declarations an entity needs beyond its output
/// signals.
pub fn write_preamble(elab: &Elaboration, entity_id: EntityId, f: &mut String) {
    let entity = &elab.entities[entity_id];
    if entity.class == "memory" {
        let depth = entity.properties.get_int("Depth").unwrap_or(1);
        let width = entity.outputs[0].ty.bit_width().unwrap_or(1);
        f.push_str(&format!(
            "\tvar logic [{}:0] {}_mem [0:{}];\n",
            width.saturating_sub(1),
            entity.name,
            depth - 1
        ));
    }
    if entity.class == "spare_ff" {
        let count = entity.properties.get_int("NumberOfFlipFlops").unwrap_or(1);
        f.push_str(&format!(
            "\tvar logic [{}:0] {}_q;\n",
            count - 1,
            entity.name
        ));
    }
}

fn write_delay(exporter: &VerilogExporter, elab: &Elaboration, entity_id: EntityId, f: &mut String) {
    let entity = &elab.entities[entity_id];
    let nrst = exporter.reset_name();
    let paths = entity.outputs.len();
    let has_enable = entity.properties.get_int("HasClockEnable") == Some(1);

    f.push_str(&format!("\talways @(posedge clk or negedge {nrst})\n"));
    f.push_str(&format!("\t\tif (!{nrst}) begin\n"));
    for output in &entity.outputs {
        f.push_str(&format!("\t\t\t{} <= '0;\n", output.name));
    }
    f.push_str("\t\tend\n\t\telse begin\n");
    if has_enable {
        let enable = VerilogExporter::input_ref(elab, entity_id, paths);
        f.push_str(&format!("\t\t\tif ({enable}) begin\n"));
        for (i, output) in entity.outputs.iter().enumerate() {
            let input = VerilogExporter::input_ref(elab, entity_id, i);
            f.push_str(&format!("\t\t\t\t{} <= {};\n", output.name, input));
        }
        f.push_str("\t\t\tend\n");
    } else {
        for (i, output) in entity.outputs.iter().enumerate() {
            let input = VerilogExporter::input_ref(elab, entity_id, i);
            f.push_str(&format!("\t\t\t{} <= {};\n", output.name, input));
        }
    }
    f.push_str("\t\tend\n");
}

fn write_memory(elab: &Elaboration, entity_id: EntityId, f: &mut String) {
    let entity = &elab.entities[entity_id];
    let read_address = VerilogExporter::input_ref(elab, entity_id, 0);
    let write_enable = VerilogExporter::input_ref(elab, entity_id, 1);
    let write_address = VerilogExporter::input_ref(elab, entity_id, 2);
    let write_data = VerilogExporter::input_ref(elab, entity_id, 3);
    f.push_str("\talways @(posedge clk) begin\n");
    f.push_str(&format!(
        "\t\tif ({write_enable}) {}_mem[{write_address}] <= {write_data};\n",
        entity.name
    ));
    f.push_str(&format!(
        "\t\t{} <= {}_mem[{read_address}];\n",
        entity.outputs[0].name, entity.name
    ));
    f.push_str("\tend\n");
}

fn write_instance(
    exporter: &VerilogExporter,
    elab: &Elaboration,
    entity_id: EntityId,
    f: &mut String,
) {
    let entity = &elab.entities[entity_id];
    let nrst = exporter.reset_name();
    let Some(child) = entity.target_module.map(|t| elab.resolve(t)) else {
        return;
    };

    f.push_str(&format!(
        "\t{} {} (\n",
        elab.instances[child].module_name, entity.name
    ));
    f.push_str(&format!("\t\t.clk(clk),\n\t\t.{nrst}({nrst})"));

    // The instance pins mirror the child's ports in order; bus ports take
    // a concatenation with element 0 last (least significant).
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    let mut pin = 0;
    for port in &elab.instances[child].input_ports {
        let port_name = elab.entities[*port].outputs[0].name.clone();
        let elements = elab.entities[*port].inputs.len();
        let signals = (0..elements)
            .map(|_| {
                let signal = VerilogExporter::input_ref(elab, entity_id, pin);
                pin += 1;
                signal
            })
            .collect();
        groups.push((port_name, signals));
    }
    let mut pin = 0;
    for port in &elab.instances[child].output_ports {
        let port_name = elab.entities[*port].inputs[0].name.clone();
        let elements = elab.entities[*port].outputs.len();
        let signals = (0..elements)
            .map(|_| {
                let signal = entity.outputs[pin].name.clone();
                pin += 1;
                signal
            })
            .collect();
        groups.push((port_name, signals));
    }

    for (port, signals) in &groups {
        let expression = if signals.len() == 1 {
            signals[0].clone()
        } else {
            let mut reversed = signals.clone();
            reversed.reverse();
            format!("{{{}}}", reversed.join(", "))
        };
        f.push_str(&format!(",\n\t\t.{port}({expression})"));
    }
    f.push_str("\n\t);\n");
}

/// Writes the code of one entity.
pub fn write_code(
    exporter: &VerilogExporter,
    elab: &Elaboration,
    entity_id: EntityId,
    f: &mut String,
) {
    let entity = &elab.entities[entity_id];
    let class = entity.class.as_str();

    if class == "input_port" {
        return;
    }
    if is_ignored_class(class) {
        if !entity.outputs.is_empty() {
            f.push_str(&format!(
                "\t// simulation-only block '{}' is driven by the testbench\n",
                entity.name
            ));
        }
        return;
    }

    match class {
        "constant" => {
            for (i, output) in entity.outputs.iter().enumerate() {
                let literal = entity
                    .properties
                    .get_string_indexed("Value", i as i32)
                    .unwrap_or("'0");
                f.push_str(&format!(
                    "\tassign {} = {};\n",
                    output.name,
                    constant_literal(literal)
                ));
            }
        }

        "delay" => write_delay(exporter, elab, entity_id, f),

        "decide" => {
            let decision = VerilogExporter::input_ref(elab, entity_id, 0);
            for (p, output) in entity.outputs.iter().enumerate() {
                let true_align = entity
                    .properties
                    .get_int_indexed("TrueAlign", p as i32)
                    .unwrap_or(0);
                let false_align = entity
                    .properties
                    .get_int_indexed("FalseAlign", p as i32)
                    .unwrap_or(0);
                let on_true = shifted_ref(elab, entity_id, 1 + 2 * p, true_align);
                let on_false = shifted_ref(elab, entity_id, 2 + 2 * p, false_align);
                f.push_str(&format!(
                    "\tassign {} = {decision} ? {on_true} : {on_false};\n",
                    output.name
                ));
            }
        }

        "plus" => {
            let summands = entity.properties.get_int("NumberOfSummands").unwrap_or(1) as usize;
            for (p, output) in entity.outputs.iter().enumerate() {
                let terms: Vec<String> = (0..summands)
                    .map(|s| {
                        let align = entity
                            .properties
                            .get_int_indexed2("Align", p as i32, s as i32)
                            .unwrap_or(0);
                        shifted_ref(elab, entity_id, p * summands + s, align)
                    })
                    .collect();
                f.push_str(&format!(
                    "\tassign {} = {};\n",
                    output.name,
                    terms.join(" + ")
                ));
            }
        }

        "times" => {
            for (p, output) in entity.outputs.iter().enumerate() {
                let a = signed_ref(elab, entity_id, 2 * p);
                let b = signed_ref(elab, entity_id, 2 * p + 1);
                f.push_str(&format!("\tassign {} = {a} * {b};\n", output.name));
            }
        }

        "and" | "or" | "xor" => {
            let operator = match class {
                "and" => " & ",
                "or" => " | ",
                _ => " ^ ",
            };
            let terms: Vec<String> = (0..entity.inputs.len())
                .map(|i| VerilogExporter::input_ref(elab, entity_id, i))
                .collect();
            f.push_str(&format!(
                "\tassign {} = {};\n",
                entity.outputs[0].name,
                terms.join(operator)
            ));
        }

        "equal" | "not_equal" | "less" | "less_equal" => {
            let operator = match class {
                "equal" => "==",
                "not_equal" => "!=",
                "less" => "<",
                _ => "<=",
            };
            let lhs_align = entity.properties.get_int_indexed("LhsAlign", 0).unwrap_or(0);
            let rhs_align = entity.properties.get_int_indexed("RhsAlign", 0).unwrap_or(0);
            let lhs = shifted_ref(elab, entity_id, 0, lhs_align);
            let rhs = shifted_ref(elab, entity_id, 1, rhs_align);
            f.push_str(&format!(
                "\tassign {} = {lhs} {operator} {rhs};\n",
                entity.outputs[0].name
            ));
        }

        "negate" => {
            let input = signed_ref(elab, entity_id, 0);
            f.push_str(&format!(
                "\tassign {} = -{input};\n",
                entity.outputs[0].name
            ));
        }

        "not" => {
            let input = VerilogExporter::input_ref(elab, entity_id, 0);
            let operator = if entity.outputs[0].ty == SignalType::Bool {
                "!"
            } else {
                "~"
            };
            f.push_str(&format!(
                "\tassign {} = {operator}{input};\n",
                entity.outputs[0].name
            ));
        }

        "floor_cast" | "reinterpret_cast" => {
            for (i, output) in entity.outputs.iter().enumerate() {
                let expression = if class == "reinterpret_cast" {
                    VerilogExporter::input_ref(elab, entity_id, i)
                } else {
                    let src = input_ty(elab, entity_id, i).fraction().unwrap_or(0) as i64;
                    let dst = output.ty.fraction().unwrap_or(0) as i64;
                    let shift = src - dst;
                    let base = signed_ref(elab, entity_id, i);
                    if shift > 0 {
                        format!("({base} >>> {shift})")
                    } else if shift < 0 {
                        format!("({base} << {})", -shift)
                    } else {
                        base
                    }
                };
                f.push_str(&format!("\tassign {} = {expression};\n", output.name));
            }
        }

        "convergent_cast" => {
            for (i, output) in entity.outputs.iter().enumerate() {
                let src = input_ty(elab, entity_id, i).fraction().unwrap_or(0) as i64;
                let dst = output.ty.fraction().unwrap_or(0) as i64;
                let shift = src - dst;
                let input = VerilogExporter::input_ref(elab, entity_id, i);
                let base = signed_ref(elab, entity_id, i);
                let floor = format!("({base} >>> {shift})");
                let below = if shift >= 2 {
                    format!("(|{input}[{}:0]) || ", shift - 2)
                } else {
                    String::new()
                };
                f.push_str(&format!(
                    "\tassign {} = ({input}[{}] && ({below}{input}[{shift}])) ? {floor} + 1'b1 : {floor};\n",
                    output.name,
                    shift - 1
                ));
            }
        }

        "bit_compose" => {
            let bits: Vec<String> = (0..entity.inputs.len())
                .rev()
                .map(|i| VerilogExporter::input_ref(elab, entity_id, i))
                .collect();
            f.push_str(&format!(
                "\tassign {} = {{{}}};\n",
                entity.outputs[0].name,
                bits.join(", ")
            ));
        }

        "bit_extract" => {
            let first = entity.properties.get_int("firstBitIndex").unwrap_or(0);
            let input = VerilogExporter::input_ref(elab, entity_id, 0);
            for (j, output) in entity.outputs.iter().enumerate() {
                f.push_str(&format!(
                    "\tassign {} = {input}[{}];\n",
                    output.name,
                    first + j as i64
                ));
            }
        }

        "select" => {
            let length = entity.properties.get_int("Length").unwrap_or(1) as usize;
            let index = VerilogExporter::input_ref(elab, entity_id, 0);
            let mut expression = VerilogExporter::input_ref(elab, entity_id, length);
            for i in (0..length - 1).rev() {
                let data = VerilogExporter::input_ref(elab, entity_id, 1 + i);
                expression = format!("({index} == {i}) ? {data} : {expression}");
            }
            f.push_str(&format!(
                "\tassign {} = {expression};\n",
                entity.outputs[0].name
            ));
        }

        "replace" => {
            let length = entity.properties.get_int("Length").unwrap_or(1) as usize;
            let values = entity.properties.get_int("NumberOfValues").unwrap_or(1) as usize;
            let index = VerilogExporter::input_ref(elab, entity_id, 0);
            for (i, output) in entity.outputs.iter().enumerate() {
                let mut expression = VerilogExporter::input_ref(elab, entity_id, 1 + i);
                for v in (0..values).rev() {
                    if i < v {
                        continue;
                    }
                    let value = VerilogExporter::input_ref(elab, entity_id, 1 + length + v);
                    expression = format!("({index} == {}) ? {value} : {expression}", i - v);
                }
                f.push_str(&format!("\tassign {} = {expression};\n", output.name));
            }
        }

        "memory" => write_memory(elab, entity_id, f),

        "spare_ff" => {
            let nrst = exporter.reset_name();
            f.push_str(&format!(
                "\talways @(posedge clk or negedge {nrst})\n\t\tif (!{nrst}) {0}_q <= '0;\n\t\telse {0}_q <= {0}_q;\n",
                entity.name
            ));
        }

        "instance" => write_instance(exporter, elab, entity_id, f),

        "output_port" => {
            for (i, input) in entity.inputs.iter().enumerate() {
                let driver = VerilogExporter::input_ref(elab, entity_id, i);
                if entity.outputs[i].bus_size.is_some() {
                    f.push_str(&format!("\tassign {}[{i}] = {driver};\n", input.name));
                } else {
                    f.push_str(&format!("\tassign {} = {driver};\n", input.name));
                }
            }
        }

        other => {
            f.push_str(&format!("\t// no emission rule for class '{other}'\n"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_literals() {
        assert_eq!(constant_literal("bool:1"), "1'b1");
        assert_eq!(
            constant_literal("ufix<4,0>:00000000_00000000_00000000_0000000a"),
            "4'b1010"
        );
        assert_eq!(
            constant_literal("sfix<3,0>:ffffffff_ffffffff_ffffffff_ffffffff"),
            "3'b111"
        );
    }

    #[test]
    fn ignored_classes() {
        assert!(is_ignored_class("$label"));
        assert!(is_ignored_class("function"));
        assert!(!is_ignored_class("plus"));
    }
}
