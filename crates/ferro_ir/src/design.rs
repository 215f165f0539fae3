//! The design container: block ownership, wiring, and testbench access.

use crate::arena::Arena;
use crate::block::{Block, BlockKind};
use crate::hierarchy::Hierarchy;
use crate::ids::{BlockId, LevelId};
use crate::pin::{InPin, InputPin, OutPin, OutputPin};
use crate::value::{Value, ValueStore};
use ferro_common::{DesignError, DesignResult};
use ferro_fixed::SignalType;

/// A complete design under construction or simulation.
///
/// The design owns every block; blocks live until the design is dropped.
/// Pins refer to each other by `(block, pin-index)` IDs, so there are no
/// ownership cycles and disconnection never touches freed memory. There is
/// no process-wide current design: builders take `&mut Design` explicitly.
#[derive(Debug)]
pub struct Design {
    /// All blocks, in creation order.
    pub blocks: Arena<BlockId, Block>,
    /// The tree of named scopes.
    pub hierarchy: Hierarchy,
    /// Current values of all output pins.
    pub values: ValueStore,
    dirty: Vec<BlockId>,
}

impl Default for Design {
    fn default() -> Self {
        Self::new()
    }
}

impl Design {
    /// Creates an empty design with a root level named `top`.
    pub fn new() -> Self {
        Self::with_top("top", "Top")
    }

    /// Creates an empty design with the given root instance and module
    /// name.
    pub fn with_top(name: &str, module_name: &str) -> Self {
        Self {
            blocks: Arena::new(),
            hierarchy: Hierarchy::new(name, module_name),
            values: ValueStore::new(),
            dirty: Vec::new(),
        }
    }

    /// Inserts a pinless block into the current hierarchy level.
    ///
    /// The block name is generated from the prefix, unique within the
    /// level. Pins are added afterwards with [`add_output`] and
    /// [`add_input`].
    ///
    /// [`add_output`]: Design::add_output
    /// [`add_input`]: Design::add_input
    pub fn insert_block(&mut self, prefix: &str, kind: BlockKind) -> BlockId {
        let name = self.hierarchy.generate_block_name(prefix);
        let level = self.hierarchy.current();
        self.blocks.alloc(Block {
            name,
            level,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
    }

    /// Appends an output pin holding the given initial value.
    pub fn add_output(&mut self, block: BlockId, initial: Value) -> OutPin {
        let ty = initial.ty();
        let slot = self.values.alloc(initial);
        let outputs = &mut self.blocks[block].outputs;
        let index = outputs.len() as u16;
        outputs.push(OutputPin::new(ty, slot));
        OutPin { block, index }
    }

    /// Appends an input pin, optionally connecting it to a driver.
    pub fn add_input(&mut self, block: BlockId, driver: Option<OutPin>) -> InPin {
        let inputs = &mut self.blocks[block].inputs;
        let index = inputs.len() as u16;
        inputs.push(InputPin::new());
        let pin = InPin { block, index };
        if let Some(driver) = driver {
            self.connect(pin, driver);
        }
        pin
    }

    /// Connects an input pin to an output pin.
    ///
    /// An already-connected input is disconnected first; the reciprocal
    /// consumer entry is maintained on the driver.
    pub fn connect(&mut self, input: InPin, driver: OutPin) {
        self.disconnect(input);
        self.blocks[input.block].inputs[input.index as usize].driver = Some(driver);
        self.blocks[driver.block].outputs[driver.index as usize]
            .targets
            .push(input);
    }

    /// Disconnects an input pin from its driver, if any.
    pub fn disconnect(&mut self, input: InPin) {
        let driver = self.blocks[input.block].inputs[input.index as usize]
            .driver
            .take();
        if let Some(driver) = driver {
            let targets = &mut self.blocks[driver.block].outputs[driver.index as usize].targets;
            if let Some(position) = targets.iter().position(|t| *t == input) {
                targets.remove(position);
            }
        }
    }

    /// The declared type of an output pin.
    pub fn pin_ty(&self, pin: OutPin) -> SignalType {
        self.blocks[pin.block].outputs[pin.index as usize].ty
    }

    /// The current value of an output pin.
    pub fn pin_value(&self, pin: OutPin) -> &Value {
        let slot = self.blocks[pin.block].outputs[pin.index as usize].slot;
        self.values.get(slot)
    }

    /// Overwrites the current value of an output pin.
    pub fn set_pin_value(&mut self, pin: OutPin, value: Value) {
        let slot = self.blocks[pin.block].outputs[pin.index as usize].slot;
        self.values.set(slot, value);
    }

    /// Splices out every identity block by rerouting its sole input to all
    /// of its output's consumers.
    ///
    /// Called once at simulator and elaborator start-up. A self-driving
    /// identity (a degenerate computational cycle) is left in place.
    pub fn simplify(&mut self) {
        for id in self.blocks.ids().collect::<Vec<_>>() {
            if !matches!(self.blocks[id].kind, BlockKind::Identity) {
                continue;
            }
            let input = InPin { block: id, index: 0 };
            let driver = match self.blocks[id].inputs[0].driver {
                Some(driver) => driver,
                None => continue,
            };
            if driver.block == id {
                continue;
            }
            let targets = self.blocks[id].outputs[0].targets.clone();
            for target in targets {
                self.connect(target, driver);
            }
            self.disconnect(input);
        }
    }

    /// Writes a testbench signal block's value.
    ///
    /// The value must match the block's declared output type.
    pub fn set_signal(&mut self, block: BlockId, value: Value) -> DesignResult<()> {
        if !matches!(self.blocks[block].kind, BlockKind::Signal { .. }) {
            return Err(DesignError::new(format!(
                "block '{}' is not a signal",
                self.blocks[block].name
            )));
        }
        let expected = self.blocks[block].outputs[0].ty;
        if value.ty() != expected {
            return Err(DesignError::new(format!(
                "signal '{}' is of type '{}', cannot write a '{}'",
                self.blocks[block].name,
                expected,
                value.ty()
            )));
        }
        if let BlockKind::Signal { value: stored } = &mut self.blocks[block].kind {
            *stored = value;
        }
        self.dirty.push(block);
        Ok(())
    }

    /// Replaces a source block's data vector.
    pub fn set_source_data(
        &mut self,
        block: BlockId,
        data: Vec<Value>,
        periodic: bool,
    ) -> DesignResult<()> {
        match &mut self.blocks[block].kind {
            BlockKind::Source(state) => {
                state.data = data;
                state.pos = 0;
                state.periodic = periodic;
                state.read_next();
                self.dirty.push(block);
                Ok(())
            }
            _ => Err(DesignError::new(format!(
                "block '{}' is not a source",
                self.blocks[block].name
            ))),
        }
    }

    /// The values captured by a sink block so far.
    pub fn sink_data(&self, block: BlockId) -> DesignResult<&[Value]> {
        match &self.blocks[block].kind {
            BlockKind::Sink(state) => Ok(&state.data),
            _ => Err(DesignError::new(format!(
                "block '{}' is not a sink",
                self.blocks[block].name
            ))),
        }
    }

    /// Back-door write into a memory block.
    pub fn memory_write(&mut self, block: BlockId, address: u32, value: Value) -> DesignResult<()> {
        match &mut self.blocks[block].kind {
            BlockKind::Memory(state) => {
                if address >= state.depth {
                    return Err(DesignError::new(format!(
                        "memory back-door address {address} out of range (depth {})",
                        state.depth
                    )));
                }
                state.cells[address as usize] = value;
                Ok(())
            }
            _ => Err(DesignError::new(format!(
                "block '{}' is not a memory",
                self.blocks[block].name
            ))),
        }
    }

    /// Back-door read from a memory block.
    pub fn memory_read(&self, block: BlockId, address: u32) -> DesignResult<&Value> {
        match &self.blocks[block].kind {
            BlockKind::Memory(state) => {
                state.cells.get(address as usize).ok_or_else(|| {
                    DesignError::new(format!(
                        "memory back-door address {address} out of range (depth {})",
                        state.depth
                    ))
                })
            }
            _ => Err(DesignError::new(format!(
                "block '{}' is not a memory",
                self.blocks[block].name
            ))),
        }
    }

    /// Drains the blocks whose outputs were changed from outside the
    /// graph since the last call.
    pub fn take_dirty(&mut self) -> Vec<BlockId> {
        std::mem::take(&mut self.dirty)
    }

    /// Enters a named scope; blocks created until [`leave_scope`] land in
    /// it.
    ///
    /// [`leave_scope`]: Design::leave_scope
    pub fn enter_scope(&mut self, name: &str, module_name: &str) -> LevelId {
        self.hierarchy.enter(name, module_name)
    }

    /// Leaves the current scope.
    pub fn leave_scope(&mut self) {
        self.hierarchy.leave();
    }

    /// Runs the closure with the current level temporarily rebound,
    /// restoring the previous level afterwards.
    pub fn at_level<R>(&mut self, level: LevelId, f: impl FnOnce(&mut Design) -> R) -> R {
        let previous = self.hierarchy.goto(level);
        let result = f(self);
        self.hierarchy.goto(previous);
        result
    }

    /// The full hierarchical name of a block.
    pub fn full_block_name(&self, block: BlockId) -> String {
        format!(
            "{}/{}",
            self.hierarchy.full_name(self.blocks[block].level),
            self.blocks[block].name
        )
    }

    /// Verifies the reciprocal pin links.
    ///
    /// For every connected input, its driver's target list must contain it
    /// exactly once, and every target of every output must point back.
    pub fn check_pin_invariants(&self) -> DesignResult<()> {
        for (id, block) in self.blocks.iter() {
            for (index, input) in block.inputs.iter().enumerate() {
                if let Some(driver) = input.driver {
                    let me = InPin {
                        block: id,
                        index: index as u16,
                    };
                    let count = self.blocks[driver.block].outputs[driver.index as usize]
                        .targets
                        .iter()
                        .filter(|t| **t == me)
                        .count();
                    if count != 1 {
                        return Err(DesignError::new(format!(
                            "input {}/{index} appears {count} times in its driver's target list",
                            self.full_block_name(id)
                        )));
                    }
                }
            }
            for (index, output) in block.outputs.iter().enumerate() {
                for target in &output.targets {
                    let back = self.blocks[target.block].inputs[target.index as usize].driver;
                    let me = OutPin {
                        block: id,
                        index: index as u16,
                    };
                    if back != Some(me) {
                        return Err(DesignError::new(format!(
                            "output {}/{index} drives an input that does not point back",
                            self.full_block_name(id)
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blocks(design: &mut Design) -> (OutPin, InPin) {
        let a = design.insert_block("signal", BlockKind::Signal {
            value: Value::Bool(false),
        });
        let out = design.add_output(a, Value::Bool(false));
        let b = design.insert_block("probe", BlockKind::Probe);
        let input = design.add_input(b, None);
        (out, input)
    }

    #[test]
    fn connect_sets_reciprocal_links() {
        let mut design = Design::new();
        let (out, input) = two_blocks(&mut design);
        design.connect(input, out);
        assert_eq!(
            design.blocks[input.block].inputs[0].driver,
            Some(out)
        );
        assert_eq!(design.blocks[out.block].outputs[0].targets, vec![input]);
        design.check_pin_invariants().unwrap();
    }

    #[test]
    fn reconnect_disconnects_first() {
        let mut design = Design::new();
        let (out_a, input) = two_blocks(&mut design);
        let c = design.insert_block("signal", BlockKind::Signal {
            value: Value::Bool(false),
        });
        let out_c = design.add_output(c, Value::Bool(false));

        design.connect(input, out_a);
        design.connect(input, out_c);
        assert!(design.blocks[out_a.block].outputs[0].targets.is_empty());
        assert_eq!(design.blocks[out_c.block].outputs[0].targets, vec![input]);
        design.check_pin_invariants().unwrap();
    }

    #[test]
    fn disconnect_removes_target_entry() {
        let mut design = Design::new();
        let (out, input) = two_blocks(&mut design);
        design.connect(input, out);
        design.disconnect(input);
        assert!(design.blocks[input.block].inputs[0].driver.is_none());
        assert!(design.blocks[out.block].outputs[0].targets.is_empty());
    }

    #[test]
    fn block_names_unique_per_level() {
        let mut design = Design::new();
        let a = design.insert_block("probe", BlockKind::Probe);
        let b = design.insert_block("probe", BlockKind::Probe);
        assert_ne!(design.blocks[a].name, design.blocks[b].name);
    }

    #[test]
    fn simplify_splices_identity() {
        let mut design = Design::new();
        let (out, consumer_input) = two_blocks(&mut design);

        let identity = design.insert_block("identity", BlockKind::Identity);
        let id_in = design.add_input(identity, Some(out));
        let id_out = design.add_output(identity, Value::Bool(false));

        design.connect(consumer_input, id_out);
        design.simplify();

        assert_eq!(
            design.blocks[consumer_input.block].inputs[0].driver,
            Some(out)
        );
        assert!(design.blocks[identity].inputs[id_in.index as usize]
            .driver
            .is_none());
        assert!(design.blocks[identity].can_remove());
        design.check_pin_invariants().unwrap();
    }

    #[test]
    fn set_signal_checks_type() {
        let mut design = Design::new();
        let block = design.insert_block("signal", BlockKind::Signal {
            value: Value::Bool(false),
        });
        design.add_output(block, Value::Bool(false));
        assert!(design.set_signal(block, Value::Int32(3)).is_err());
        design.set_signal(block, Value::Bool(true)).unwrap();
        assert_eq!(design.take_dirty(), vec![block]);
    }

    #[test]
    fn scopes_nest() {
        let mut design = Design::new();
        design.enter_scope("core", "Core");
        let block = design.insert_block("probe", BlockKind::Probe);
        design.leave_scope();
        assert_eq!(design.full_block_name(block), "top/core/probe1");
    }

    #[test]
    fn at_level_restores_current() {
        let mut design = Design::new();
        let level = design.enter_scope("core", "Core");
        design.leave_scope();
        let root = design.hierarchy.current();
        design.at_level(level, |d| {
            assert_eq!(d.hierarchy.current(), level);
        });
        assert_eq!(design.hierarchy.current(), root);
    }
}
