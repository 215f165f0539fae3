//! Verilog emission over an elaborated design.

use ferro_elab::{elaborate, ElabConfig};
use ferro_fixed::SignalType;
use ferro_ir::{CastMode, Design, Value};
use ferro_verilog::{VerilogConfig, VerilogExporter};

fn build_example() -> Design {
    let mut design = Design::new();
    let (input, _) = design.signal(Value::zero_of(&SignalType::sfix(8, 0)));

    design.enter_scope("core", "Accumulate");
    design.input_name(input, "Data");
    let gain = design.constant_f64(SignalType::ufix(3, 0), 3.0).unwrap();
    let scaled = design.times(input, gain).unwrap();
    let narrowed = design
        .floor_cast(SignalType::sfix(8, 0), scaled, CastMode::WrapAround)
        .unwrap();
    let registered = design.delay(narrowed);
    design.output_name(registered, "Result");
    design.leave_scope();
    design.terminate(registered);

    design
}

#[test]
fn module_header_has_clock_reset_and_ports() {
    let mut design = build_example();
    let mut elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let exporter = VerilogExporter::new(VerilogConfig::default());
    exporter.prepare(&mut elab);

    let (core, _) = elab
        .instances
        .iter()
        .find(|(_, i)| i.module_name == "Accumulate")
        .expect("core module exists");
    let text = exporter.emit_module(&elab, core);

    assert!(text.starts_with("module Accumulate\n"));
    assert!(text.contains("input var logic clk,"));
    assert!(text.contains("input var logic nrst,"));
    assert!(text.contains("input var logic signed [7:0] in_Data"));
    assert!(text.contains("output var logic signed [7:0] out_Result"));
    assert!(text.trim_end().ends_with("endmodule"));
}

#[test]
fn registers_reset_and_capture() {
    let mut design = build_example();
    let mut elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let exporter = VerilogExporter::new(VerilogConfig::default());
    exporter.prepare(&mut elab);

    let (core, _) = elab
        .instances
        .iter()
        .find(|(_, i)| i.module_name == "Accumulate")
        .expect("core module exists");
    let text = exporter.emit_module(&elab, core);

    assert!(text.contains("always @(posedge clk or negedge nrst)"));
    assert!(text.contains("if (!nrst)"));
    assert!(text.contains("<= '0;"));
}

#[test]
fn constants_emit_sized_binary_literals() {
    let mut design = build_example();
    let mut elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let exporter = VerilogExporter::new(VerilogConfig::default());
    exporter.prepare(&mut elab);

    let (core, _) = elab
        .instances
        .iter()
        .find(|(_, i)| i.module_name == "Accumulate")
        .expect("core module exists");
    let text = exporter.emit_module(&elab, core);

    assert!(text.contains("3'b011"), "constant 3 as a sized literal:\n{text}");
}

#[test]
fn parent_module_instantiates_the_child() {
    let mut design = build_example();
    let mut elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let exporter = VerilogExporter::new(VerilogConfig::default());
    exporter.prepare(&mut elab);

    let (top, _) = elab
        .instances
        .iter()
        .find(|(_, i)| i.module_name == "Top")
        .expect("top module exists");
    let text = exporter.emit_module(&elab, top);

    assert!(text.contains("Accumulate u_core ("));
    assert!(text.contains(".clk(clk)"));
    assert!(text.contains(".in_Data("));
    assert!(text.contains(".out_Result("));
}

#[test]
fn export_writes_one_file_per_module() {
    let mut design = build_example();
    let mut elab = elaborate(&mut design, ElabConfig::default()).unwrap();
    let mut exporter = VerilogExporter::new(VerilogConfig::default());

    let dir = std::env::temp_dir().join(format!("ferro_emit_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    exporter.export(&mut elab, &dir).unwrap();

    assert!(exporter.list_of_files().contains(&"Top.sv".to_string()));
    assert!(exporter
        .list_of_files()
        .contains(&"Accumulate.sv".to_string()));
    assert!(dir.join("files.txt").exists());
    assert!(dir.join("Accumulate.sv").exists());
    std::fs::remove_dir_all(&dir).ok();
}
