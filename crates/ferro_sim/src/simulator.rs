//! The clocked simulation kernel.

use crate::error::SimError;
use crate::schedule;
use ferro_ir::{eval, BlockId, Design};

/// Cycle-accurate simulator over a finished design.
///
/// Construction runs the start-up passes: identity blocks are spliced
/// out, surviving placeholders with consumers are rejected, the
/// combinational evaluation order is fixed by topological sort, and the
/// dependency graph is partitioned into components for dirty tracking.
///
/// The simulator is authoritative for all time progression; advancing the
/// clock with [`run`](Simulator::run) is the only way to cause state
/// changes after construction.
#[derive(Debug)]
pub struct Simulator {
    order: Vec<BlockId>,
    clocked: Vec<BlockId>,
    component_of: Vec<u32>,
    dirty: Vec<bool>,
    needs_reset: bool,
    steps: u64,
}

impl Simulator {
    /// Prepares a design for simulation.
    pub fn new(design: &mut Design) -> Result<Self, SimError> {
        design.simplify();

        // A placeholder that still drives consumers means a forward node
        // was never bound; an undriven input on a live block is the same
        // mistake seen from the consumer side.
        for (_, block) in design.blocks.iter() {
            if block.is_temporary() && block.outputs[0].is_connected() {
                let consumer = block.outputs[0].targets[0];
                return Err(SimError::UndrivenInput {
                    block: design.blocks[consumer.block].name.clone(),
                });
            }
            if block.can_evaluate() || block.is_clocked() {
                for input in &block.inputs {
                    if !input.is_connected() {
                        return Err(SimError::UndrivenInput {
                            block: block.name.clone(),
                        });
                    }
                }
            }
        }

        let order = schedule::evaluation_order(design)?;
        let (component_of, component_count) = schedule::components(design);
        let clocked: Vec<BlockId> = design
            .blocks
            .iter()
            .filter(|(_, block)| block.is_clocked())
            .map(|(id, _)| id)
            .collect();

        Ok(Self {
            order,
            clocked,
            component_of,
            dirty: vec![true; component_count as usize],
            needs_reset: true,
            steps: 0,
        })
    }

    /// The number of clock steps advanced so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Invokes the asynchronous reset on every clocked block and marks
    /// the whole design for re-evaluation.
    pub fn reset(&mut self, design: &mut Design) {
        for &id in &self.clocked {
            eval::async_reset(design, id);
        }
        for flag in self.dirty.iter_mut() {
            *flag = true;
        }
        self.needs_reset = false;
        self.steps = 0;
    }

    fn mark_dirty(&mut self, block: BlockId) {
        let component = self.component_of[block.as_raw() as usize] as usize;
        self.dirty[component] = true;
    }

    /// Advances the design by `steps` clock steps.
    ///
    /// Each step evaluates every dirty evaluable block in topological
    /// order, then steps every clocked block; register updates are
    /// simultaneous. The first call resets the design.
    pub fn run(&mut self, design: &mut Design, steps: u64) -> Result<(), SimError> {
        if self.needs_reset {
            self.reset(design);
        }

        for _ in 0..steps {
            // Testbench writes (signals, source data, back-door loads)
            // behave like topologically earliest sources: their
            // components re-evaluate before anything else observes them.
            for block in design.take_dirty() {
                self.mark_dirty(block);
            }

            for index in 0..self.order.len() {
                let id = self.order[index];
                if self.dirty[self.component_of[id.as_raw() as usize] as usize] {
                    eval::evaluate(&design.blocks, id, &mut design.values)?;
                }
            }

            for flag in self.dirty.iter_mut() {
                *flag = false;
            }

            for index in 0..self.clocked.len() {
                let id = self.clocked[index];
                if eval::step(design, id)? {
                    self.mark_dirty(id);
                }
            }

            self.steps += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_fixed::{DynFix, SignalType};
    use ferro_ir::{CastMode, ForwardNode, Value};

    #[test]
    fn constants_are_stable() {
        let mut design = Design::new();
        let c = design.constant_f64(SignalType::ufix(8, 2), 1.25).unwrap();
        let delayed = design.delay(c);
        let mut sim = Simulator::new(&mut design).unwrap();
        for _ in 0..3 {
            sim.run(&mut design, 1).unwrap();
            assert_eq!(design.read(c).to_f64(), 1.25);
        }
        assert_eq!(design.read(delayed).to_f64(), 1.25);
    }

    #[test]
    fn delay_shifts_by_one_step() {
        let mut design = Design::new();
        let enable = design.constant(Value::Bool(true));
        let source = design.source(SignalType::ufix(8, 0), 1, enable).unwrap();
        let delayed = design.delay(source.data[0]);
        design
            .set_source_data(
                source.block,
                (1..=5)
                    .map(|i| Value::Fixed(DynFix::from_i64_with(false, 8, 0, i).unwrap()))
                    .collect(),
                false,
            )
            .unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            sim.run(&mut design, 1).unwrap();
            seen.push((
                design.read(source.data[0]).to_f64(),
                design.read(delayed).to_f64(),
            ));
        }
        assert_eq!(
            seen,
            vec![(1.0, 0.0), (2.0, 1.0), (3.0, 2.0), (4.0, 3.0)]
        );
    }

    #[test]
    fn source_emits_elements_in_order() {
        let mut design = Design::new();
        let enable = design.constant(Value::Bool(true));
        let source = design.source(SignalType::ufix(8, 0), 1, enable).unwrap();
        let sink_enable = design.constant(Value::Bool(true));
        let sink = design.sink(source.data[0], sink_enable).unwrap();
        design
            .set_source_data(
                source.block,
                (10..13)
                    .map(|i| Value::Fixed(DynFix::from_i64_with(false, 8, 0, i).unwrap()))
                    .collect(),
                false,
            )
            .unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 3).unwrap();
        let captured: Vec<f64> = design
            .sink_data(sink)
            .unwrap()
            .iter()
            .map(|v| v.to_f64())
            .collect();
        assert_eq!(captured, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn periodic_source_wraps() {
        let mut design = Design::new();
        let enable = design.constant(Value::Bool(true));
        let source = design.source(SignalType::ufix(8, 0), 1, enable).unwrap();
        design
            .set_source_data(
                source.block,
                vec![
                    Value::Fixed(DynFix::from_i64_with(false, 8, 0, 1).unwrap()),
                    Value::Fixed(DynFix::from_i64_with(false, 8, 0, 2).unwrap()),
                ],
                true,
            )
            .unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            sim.run(&mut design, 1).unwrap();
            seen.push(design.read(source.data[0]).to_f64());
        }
        assert_eq!(seen, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn unbound_forward_node_is_fatal() {
        let mut design = Design::new();
        let forward = ForwardNode::new(&mut design, SignalType::ufix(8, 0)).unwrap();
        let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let _sum = design.plus(&[forward.node(), one]).unwrap();
        assert!(matches!(
            Simulator::new(&mut design),
            Err(SimError::UndrivenInput { .. })
        ));
    }

    #[test]
    fn counter_feedback_loop() {
        let mut design = Design::new();
        let forward = ForwardNode::new(&mut design, SignalType::ufix(8, 0)).unwrap();
        let delayed = design.delay(forward.node());
        let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let next = design.plus(&[delayed, one]).unwrap();
        let wrapped = design
            .floor_cast(SignalType::ufix(8, 0), next, CastMode::WrapAround)
            .unwrap();
        forward.bind(&mut design, wrapped).unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 10).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 9.0);
    }

    #[test]
    fn signal_write_is_seen_same_step() {
        let mut design = Design::new();
        let (node, block) = design.signal(Value::Int32(0));
        let doubled = design.function(&[node], Value::Int32(0), |inputs| {
            match inputs[0] {
                Value::Int32(v) => Ok(Value::Int32(v * 2)),
                _ => unreachable!(),
            }
        });

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 1).unwrap();
        assert_eq!(*design.read(doubled), Value::Int32(0));

        design.set_signal(block, Value::Int32(21)).unwrap();
        sim.run(&mut design, 1).unwrap();
        assert_eq!(*design.read(doubled), Value::Int32(42));
    }

    #[test]
    fn clock_enable_gates_a_delay() {
        let mut design = Design::new();
        let (data, _) = design.signal(Value::Fixed(
            DynFix::from_i64_with(false, 8, 0, 5).unwrap(),
        ));
        let (enable, enable_block) = design.signal(Value::Bool(false));
        let delayed = design.delay_bus(&[data], Some(enable)).unwrap().remove(0);

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 2).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 0.0, "gated off");

        design.set_signal(enable_block, Value::Bool(true)).unwrap();
        sim.run(&mut design, 1).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 0.0, "captures at the step");
        sim.run(&mut design, 1).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 5.0);
    }

    #[test]
    fn reset_restores_registers() {
        let mut design = Design::new();
        let forward = ForwardNode::new(&mut design, SignalType::ufix(8, 0)).unwrap();
        let delayed = design.delay(forward.node());
        let one = design.constant_f64(SignalType::ufix(8, 0), 1.0).unwrap();
        let next = design.plus(&[delayed, one]).unwrap();
        let wrapped = design
            .floor_cast(SignalType::ufix(8, 0), next, CastMode::WrapAround)
            .unwrap();
        forward.bind(&mut design, wrapped).unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 5).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 4.0);

        sim.reset(&mut design);
        sim.run(&mut design, 1).unwrap();
        assert_eq!(design.read(delayed).to_f64(), 0.0);
        assert_eq!(sim.steps(), 1);
    }
}
