//! CORDIC sine driven by a phase accumulator, checked against the host
//! math library.

use ferro_fixed::SignalType;
use ferro_ir::{CastMode, Design, ForwardNode, Node};
use ferro_sim::Simulator;

const ITERATIONS: usize = 60;

/// The working type of the rotation: 4 integer bits cover ±π, 60
/// fractional bits keep the truncation noise far below the error budget.
fn working_ty() -> SignalType {
    SignalType::sfix(64, 60)
}

/// One CORDIC rotation stage: conditionally rotates `(x, y)` by
/// `±atan(2^-i)` while driving the residual angle `z` toward zero.
fn rotation_stage(
    design: &mut Design,
    x: Node,
    y: Node,
    z: Node,
    iteration: usize,
) -> (Node, Node, Node) {
    let w = working_ty();
    let shifted_ty = SignalType::sfix(64, 60 + iteration as i16);

    // Reinterpreting with a larger fraction is the 2^-i shift.
    let dx = design.reinterpret_cast(shifted_ty, x).unwrap();
    let dy = design.reinterpret_cast(shifted_ty, y).unwrap();
    let angle = design
        .constant_f64(w, (2f64.powi(-(iteration as i32))).atan())
        .unwrap();

    let zero = design.constant_f64(w, 0.0).unwrap();
    let counterclockwise = design.less_equal(zero, z).unwrap();

    let x_minus = design.minus(x, dy).unwrap();
    let x_plus = design.plus(&[x, dy]).unwrap();
    let y_plus = design.plus(&[y, dx]).unwrap();
    let y_minus = design.minus(y, dx).unwrap();
    let z_minus = design.minus(z, angle).unwrap();
    let z_plus = design.plus(&[z, angle]).unwrap();

    let x_next = design.decide(counterclockwise, x_minus, x_plus).unwrap();
    let y_next = design.decide(counterclockwise, y_plus, y_minus).unwrap();
    let z_next = design.decide(counterclockwise, z_minus, z_plus).unwrap();

    (
        design.floor_cast(w, x_next, CastMode::WrapAround).unwrap(),
        design.floor_cast(w, y_next, CastMode::WrapAround).unwrap(),
        design.floor_cast(w, z_next, CastMode::WrapAround).unwrap(),
    )
}

#[test]
fn cordic_sine_tracks_the_host_library() {
    let mut design = Design::new();
    let w = working_ty();

    // Phase accumulator in turns, modulo 1.
    let turns_ty = SignalType::ufix(32, 32);
    let accumulator = ForwardNode::new(&mut design, turns_ty).unwrap();
    let angle = design.delay(accumulator.node());
    let increment = design
        .constant_f64(SignalType::ufix(32, 32), 0.01)
        .unwrap();
    let advanced = design.plus(&[angle, increment]).unwrap();
    let wrapped = design
        .floor_cast(turns_ty, advanced, CastMode::WrapAround)
        .unwrap();
    accumulator.bind(&mut design, wrapped).unwrap();

    // Quadrant reduction: u = angle mod 0.5 selects the half turn,
    // folding at a quarter turn keeps the rotation inside [0, pi/2].
    let half_ty = SignalType::ufix(31, 32);
    let u = design
        .floor_cast(half_ty, angle, CastMode::WrapAround)
        .unwrap();
    let half = design.constant_f64(SignalType::ufix(1, 1), 0.5).unwrap();
    let quarter = design.constant_f64(SignalType::ufix(1, 2), 0.25).unwrap();
    let second_half = design.less_equal(half, angle).unwrap();
    let folded = design.greater(u, quarter).unwrap();
    let reflected = design.minus(half, u).unwrap();
    let reflected = design
        .floor_cast(half_ty, reflected, CastMode::WrapAround)
        .unwrap();
    let v = design.decide(folded, reflected, u).unwrap();

    // theta = 2 pi v, in the working type.
    let two_pi = design
        .constant_f64(SignalType::ufix(35, 32), std::f64::consts::TAU)
        .unwrap();
    let theta = design.times(v, two_pi).unwrap();
    let theta = design.floor_cast(w, theta, CastMode::WrapAround).unwrap();

    // Rotation-mode CORDIC from (1/gain, 0).
    let gain: f64 = (0..ITERATIONS)
        .map(|i| (1.0 + 4f64.powi(-(i as i32))).sqrt())
        .product();
    let mut x = design.constant_f64(w, 1.0 / gain).unwrap();
    let mut y = design.constant_f64(w, 0.0).unwrap();
    let mut z = theta;
    for iteration in 0..ITERATIONS {
        let (nx, ny, nz) = rotation_stage(&mut design, x, y, z, iteration);
        x = nx;
        y = ny;
        z = nz;
    }

    // Undo the fold's sign in the second half turn.
    let y_negated = design.negate(y).unwrap();
    let sine = design.decide(second_half, y_negated, y).unwrap();

    let mut sim = Simulator::new(&mut design).unwrap();
    for step in 0..10 {
        sim.run(&mut design, 1).unwrap();
        let turns = design.read(angle).to_f64();
        let observed = design.read(sine).to_f64();
        let expected = (std::f64::consts::TAU * turns).sin();
        assert!(
            (observed - expected).abs() < 1e-9,
            "step {step}: angle {turns} turns, observed {observed}, expected {expected}"
        );
    }
}
