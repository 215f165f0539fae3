//! Configuration bus round trips through the simulator.

use ferro_cfgbus::{BusBuilder, BusController};
use ferro_fixed::DynFix;
use ferro_ir::Design;
use ferro_sim::Simulator;

fn chunks_of(value: &DynFix) -> (u32, u32) {
    (value.limbs()[1], value.limbs()[0])
}

#[test]
fn wide_register_round_trip_is_bit_exact() {
    let mut design = Design::new();
    let mut controller = BusController::new(&mut design, 100);
    let mut builder = BusBuilder::new(&design, controller.outputs());

    builder.break_section(&mut design, 0).unwrap();
    let register = builder
        .add_register(&mut design, true, 48, 16, "coeff")
        .unwrap();
    builder.merge_section(&mut design, 0).unwrap();
    builder.finalise().unwrap();

    let (ack, data) = builder.read_outputs().unwrap();
    controller.attach_read_path(ack, data);

    let entry = builder.namespace().lookup("coeff").unwrap();
    assert_eq!(entry.address, 0);
    assert_eq!(entry.length, 2);

    let mut sim = Simulator::new(&mut design).unwrap();
    controller.clear_all(&mut design, &mut sim).unwrap();

    let value = DynFix::from_f64_with(true, 48, 16, -3.14159).unwrap();
    let (high, low) = chunks_of(&value);
    controller
        .write(&mut design, &mut sim, 0, &[high, low])
        .unwrap();

    // Let the write settle through the section pipeline, then check the
    // register node carries the stored value on every cycle.
    sim.run(&mut design, 4).unwrap();
    let stored = design.read(register).as_fixed().copied().unwrap();
    assert_eq!(stored, value, "stored {stored:?} vs written {value:?}");

    let words = controller.read(&mut design, &mut sim, 0, 2).unwrap();
    assert_eq!(words.len(), 2);

    let mut reconstructed = DynFix::new(true, 48, 16).unwrap();
    reconstructed.set_limb(0, words[1]);
    reconstructed.set_limb(1, words[0]);
    reconstructed.wrap_around();
    assert_eq!(reconstructed, value);
}

#[test]
fn narrow_register_and_observer() {
    let mut design = Design::new();
    let mut controller = BusController::new(&mut design, 100);
    let mut builder = BusBuilder::new(&design, controller.outputs());

    builder.break_section(&mut design, 0).unwrap();
    let gain = builder
        .add_register(&mut design, false, 8, 0, "gain")
        .unwrap();
    builder.add_observer(&mut design, gain, "gain_echo").unwrap();
    builder.merge_section(&mut design, 0).unwrap();

    let (ack, data) = builder.read_outputs().unwrap();
    controller.attach_read_path(ack, data);

    assert_eq!(builder.namespace().lookup("gain").map(|e| e.address), Some(0));
    assert_eq!(
        builder.namespace().lookup("gain_echo").map(|e| e.address),
        Some(1)
    );

    let mut sim = Simulator::new(&mut design).unwrap();
    controller.write(&mut design, &mut sim, 0, &[0xa5]).unwrap();
    sim.run(&mut design, 4).unwrap();
    assert_eq!(design.read(gain).to_f64(), 0xa5 as f64);

    let words = controller.read(&mut design, &mut sim, 0, 1).unwrap();
    assert_eq!(words[0] & 0xff, 0xa5);

    // The observer shadows the register value one cycle behind.
    let echo = controller.read(&mut design, &mut sim, 1, 1).unwrap();
    assert_eq!(echo[0] & 0xff, 0xa5);
}

#[test]
fn clear_all_resets_registers() {
    let mut design = Design::new();
    let mut controller = BusController::new(&mut design, 100);
    let mut builder = BusBuilder::new(&design, controller.outputs());

    builder.break_section(&mut design, 0).unwrap();
    let register = builder
        .add_register(&mut design, false, 16, 0, "counter_limit")
        .unwrap();
    builder.merge_section(&mut design, 0).unwrap();
    let (ack, data) = builder.read_outputs().unwrap();
    controller.attach_read_path(ack, data);

    let mut sim = Simulator::new(&mut design).unwrap();
    controller
        .write(&mut design, &mut sim, 0, &[1234])
        .unwrap();
    sim.run(&mut design, 4).unwrap();
    assert_eq!(design.read(register).to_f64(), 1234.0);

    controller.clear_all(&mut design, &mut sim).unwrap();
    sim.run(&mut design, 4).unwrap();
    assert_eq!(design.read(register).to_f64(), 0.0);
}

#[test]
fn read_of_unmapped_address_times_out() {
    let mut design = Design::new();
    let mut controller = BusController::new(&mut design, 8);
    let mut builder = BusBuilder::new(&design, controller.outputs());

    builder.break_section(&mut design, 0).unwrap();
    builder
        .add_register(&mut design, false, 8, 0, "only")
        .unwrap();
    builder.merge_section(&mut design, 0).unwrap();
    let (ack, data) = builder.read_outputs().unwrap();
    controller.attach_read_path(ack, data);

    let mut sim = Simulator::new(&mut design).unwrap();
    let result = controller.read(&mut design, &mut sim, 57, 1);
    assert!(matches!(
        result,
        Err(ferro_cfgbus::BusError::Timeout { .. })
    ));
}

#[test]
fn forked_trees_share_the_address_counter() {
    let mut design = Design::new();
    let controller = BusController::new(&mut design, 100);
    let mut builder = BusBuilder::new(&design, controller.outputs());

    builder.break_section(&mut design, 0).unwrap();
    builder
        .add_register(&mut design, false, 8, 0, "main_reg")
        .unwrap();

    let mut forked = builder.fork(&mut design).unwrap();
    forked.break_section(&mut design, 0).unwrap();
    forked
        .add_register(&mut design, false, 8, 0, "forked_reg")
        .unwrap();
    forked.merge_section(&mut design, 0).unwrap();

    builder.join(&mut design, forked).unwrap();
    builder.merge_section(&mut design, 0).unwrap();

    assert_eq!(
        builder.namespace().lookup("main_reg").map(|e| e.address),
        Some(0)
    );
    assert_eq!(
        builder.namespace().lookup("forked_reg").map(|e| e.address),
        Some(1)
    );
}
