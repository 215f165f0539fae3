//! A synchronous FIFO composed from the memory primitive and two wrap
//! counters.

use ferro_common::{DesignError, DesignResult};
use ferro_fixed::{DynFix, SignalType};
use ferro_ir::{CastMode, Design, ForwardNode, Node, Value};

/// Handle on a built FIFO.
///
/// `read_data` carries the word at the read pointer with one cycle of
/// latency (the memory's output register). `level` counts the stored
/// words; `empty` and `full` are decoded from it.
#[derive(Debug, Clone, Copy)]
pub struct Fifo {
    /// Data at the read pointer.
    pub read_data: Node,
    /// High while no words are stored.
    pub empty: Node,
    /// High while `depth` words are stored.
    pub full: Node,
    /// Number of stored words.
    pub level: Node,
}

impl Fifo {
    /// Builds a FIFO of the given power-of-two depth.
    ///
    /// Writes are accepted while not full, reads while not empty; a
    /// write and a read may happen in the same cycle.
    pub fn build(
        design: &mut Design,
        depth: u32,
        write_data: Node,
        write_enable: Node,
        read_enable: Node,
    ) -> DesignResult<Fifo> {
        if !depth.is_power_of_two() {
            return Err(DesignError::new(format!(
                "fifo: depth must be a power of two, got {depth}"
            )));
        }
        let address_width = depth.trailing_zeros() as u16;
        if address_width == 0 {
            return Err(DesignError::new("fifo: depth must be at least 2"));
        }

        // One extra counter bit distinguishes full from empty after
        // wrap-around.
        let counter_ty = SignalType::ufix(address_width + 1, 0);
        let address_ty = SignalType::ufix(address_width, 0);

        let write_counter = ForwardNode::new(design, counter_ty)?;
        let read_counter = ForwardNode::new(design, counter_ty)?;
        let one = design.constant(Value::Fixed(DynFix::from_i64(1)));
        let zero = design.constant(Value::Fixed(DynFix::from_i64(0)));
        let depth_const = design.constant(Value::Fixed(DynFix::from_i64(depth as i64)));

        // level = write counter - read counter, modulo the counter range.
        let difference = design.minus(write_counter.node(), read_counter.node())?;
        let level = design.floor_cast(counter_ty, difference, CastMode::WrapAround)?;
        let empty = design.equal(level, zero)?;
        let full = design.equal(level, depth_const)?;

        let not_full = design.not(full)?;
        let not_empty = design.not(empty)?;
        let do_write = design.and(&[write_enable, not_full])?;
        let do_read = design.and(&[read_enable, not_empty])?;

        let advance = |design: &mut Design,
                       counter: Node,
                       enable: Node|
         -> DesignResult<Node> {
            let incremented = design.plus(&[counter, one])?;
            let wrapped = design.floor_cast(counter_ty, incremented, CastMode::WrapAround)?;
            let next = design.decide(enable, wrapped, counter)?;
            Ok(design.delay(next))
        };

        let write_next = advance(design, write_counter.node(), do_write)?;
        let read_next = advance(design, read_counter.node(), do_read)?;

        let write_address =
            design.floor_cast(address_ty, write_counter.node(), CastMode::WrapAround)?;
        let read_address =
            design.floor_cast(address_ty, read_counter.node(), CastMode::WrapAround)?;
        let read_data = design.memory(depth, read_address, do_write, write_address, write_data)?;

        write_counter.bind(design, write_next)?;
        read_counter.bind(design, read_next)?;

        Ok(Fifo {
            read_data,
            empty,
            full,
            level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferro_sim::Simulator;

    #[test]
    fn rejects_non_power_of_two_depth() {
        let mut design = Design::new();
        let (data, _) = design.signal(Value::Fixed(DynFix::from_i64_with(false, 8, 0, 0).unwrap()));
        let (we, _) = design.signal(Value::Bool(false));
        let (re, _) = design.signal(Value::Bool(false));
        assert!(Fifo::build(&mut design, 6, data, we, re).is_err());
    }

    #[test]
    fn fills_and_drains() {
        let mut design = Design::new();
        let (data, data_block) =
            design.signal(Value::Fixed(DynFix::from_i64_with(false, 8, 0, 0).unwrap()));
        let (we, we_block) = design.signal(Value::Bool(false));
        let (re, re_block) = design.signal(Value::Bool(false));
        let fifo = Fifo::build(&mut design, 4, data, we, re).unwrap();

        let mut sim = Simulator::new(&mut design).unwrap();
        sim.run(&mut design, 1).unwrap();
        assert_eq!(design.read(fifo.empty).as_bool(), Some(true));
        assert_eq!(design.read(fifo.full).as_bool(), Some(false));

        // Push four words.
        design.set_signal(we_block, Value::Bool(true)).unwrap();
        for i in 1..=4 {
            design
                .set_signal(
                    data_block,
                    Value::Fixed(DynFix::from_i64_with(false, 8, 0, i).unwrap()),
                )
                .unwrap();
            sim.run(&mut design, 1).unwrap();
        }
        design.set_signal(we_block, Value::Bool(false)).unwrap();
        sim.run(&mut design, 1).unwrap();

        assert_eq!(design.read(fifo.full).as_bool(), Some(true));
        assert_eq!(design.read(fifo.level).to_f64(), 4.0);

        // Drain them in order; read data lags the pointer by one cycle.
        design.set_signal(re_block, Value::Bool(true)).unwrap();
        let mut seen = Vec::new();
        for _ in 0..4 {
            sim.run(&mut design, 1).unwrap();
            seen.push(design.read(fifo.read_data).to_f64());
        }
        design.set_signal(re_block, Value::Bool(false)).unwrap();
        sim.run(&mut design, 1).unwrap();

        assert_eq!(seen, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(design.read(fifo.empty).as_bool(), Some(true));
    }
}
