//! The bus builder: registers, observers, ranges, and the section tree.

use crate::error::BusError;
use crate::namespace::{Access, Namespace, NamespaceEntry};
use crate::{address_type, data_type, DATA_WIDTH};
use ferro_common::{DesignError, DesignResult};
use ferro_fixed::{DynFix, SignalType};
use ferro_ir::{CastMode, Design, ForwardNode, LevelId, Node, Value};
use std::cell::Cell;
use std::rc::Rc;

/// The bus input signals a builder decodes, usually driven by a
/// [`BusController`](crate::BusController).
#[derive(Debug, Clone, Copy)]
pub struct BusInputs {
    /// Broadcast synchronous reset of all registers on the bus.
    pub clear_all: Node,
    /// The bus address.
    pub address: Node,
    /// Write strobe.
    pub write_enable: Node,
    /// Write data word.
    pub write_data: Node,
    /// Read request strobe.
    pub read_request: Node,
}

/// The decoded window handed out by [`BusBuilder::add_range`].
///
/// The caller binds the two forward nodes to a user-implemented block
/// (typically a memory) that answers read requests.
#[derive(Debug)]
pub struct BusRange {
    /// Broadcast reset, forwarded.
    pub clear_all: Node,
    /// Range-local address.
    pub address: Node,
    /// Write strobe, valid inside the range only.
    pub write_enable: Node,
    /// Write data, reinterpreted to the range's data type.
    pub write_data: Node,
    /// Read request, valid inside the range only.
    pub read_request: Node,
    /// To be bound to the user's read-acknowledge signal.
    pub read_acknowledge: ForwardNode,
    /// To be bound to the user's read-data signal.
    pub read_data: ForwardNode,
}

#[derive(Debug, Clone, Copy)]
struct Section {
    clear_all: Node,
    address: Node,
    write_enable: Node,
    write_data: Node,
    read_request: Node,
    read_acknowledge: Option<Node>,
    read_data: Option<Node>,
    level: LevelId,
    base_address: u32,
}

/// Hierarchical address-space allocator and serial-bus glue generator.
///
/// Addresses inside a section opened by
/// [`break_section`](BusBuilder::break_section) are rebased so that
/// sub-designs stay address-local; pipeline registers are inserted at
/// breaks and merges. [`fork`](BusBuilder::fork) /
/// [`join`](BusBuilder::join) create a parallel address tree sharing the
/// same master counter, with a combinational arbiter merging the two
/// read-data paths at the join point.
#[derive(Debug)]
pub struct BusBuilder {
    namespace: Namespace,
    next_address: Rc<Cell<u32>>,
    current: Section,
    stack: Vec<Section>,
    locked: bool,
    read_back: Vec<Node>,
    outputs: Option<(Node, Node)>,
}

impl BusBuilder {
    /// Creates a builder decoding the given bus inputs, rooted at the
    /// design's current hierarchy level.
    pub fn new(design: &Design, inputs: BusInputs) -> Self {
        Self {
            namespace: Namespace::new(),
            next_address: Rc::new(Cell::new(0)),
            current: Section {
                clear_all: inputs.clear_all,
                address: inputs.address,
                write_enable: inputs.write_enable,
                write_data: inputs.write_data,
                read_request: inputs.read_request,
                read_acknowledge: None,
                read_data: None,
                level: design.hierarchy.current(),
                base_address: 0,
            },
            stack: Vec::new(),
            locked: true,
            read_back: Vec::new(),
            outputs: None,
        }
    }

    /// The address the next allocation will receive.
    pub fn current_address(&self) -> u32 {
        self.next_address.get()
    }

    /// The registered address map.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// The merged read path `(read_acknowledge, read_data)`, available
    /// once the outermost section has been merged.
    pub fn read_outputs(&self) -> DesignResult<(Node, Node)> {
        self.outputs.ok_or_else(|| {
            DesignError::new("the bus has no read path yet; merge the outermost section first")
        })
    }

    /// Checks that every opened section has been merged.
    pub fn finalise(&self) -> DesignResult<()> {
        if !self.stack.is_empty() {
            return Err(DesignError::new(format!(
                "cannot finalise the bus: {} section(s) are still open",
                self.stack.len()
            )));
        }
        Ok(())
    }

    fn const_u32(design: &mut Design, value: u32) -> Node {
        design.constant(Value::Fixed(DynFix::from_i64(value as i64)))
    }

    fn const_zero(design: &mut Design) -> Node {
        design.constant(Value::Fixed(DynFix::from_i64(0)))
    }

    fn read_path(&self, design: &mut Design) -> (Node, Node) {
        match (self.current.read_acknowledge, self.current.read_data) {
            (Some(ack), Some(data)) => (ack, data),
            _ => {
                let ack = design.constant(Value::Bool(false));
                let data = design.constant(Value::zero_of(&data_type()));
                (ack, data)
            }
        }
    }

    /// Closes the local read-back multiplexer over the registers added so
    /// far.
    fn build(&mut self, design: &mut Design) -> DesignResult<()> {
        let level = self.current.level;
        let wires = std::mem::take(&mut self.read_back);
        let section = &mut self.current;

        design.at_level(level, |design| -> DesignResult<()> {
            if wires.is_empty() {
                section.read_data = Some(design.constant(Value::zero_of(&data_type())));
                section.read_acknowledge = Some(design.constant(Value::Bool(false)));
                return Ok(());
            }

            let mut data_wires = Vec::with_capacity(wires.len());
            for wire in &wires {
                data_wires.push(design.reinterpret_cast(data_type(), *wire)?);
            }

            let count = Self::const_u32(design, wires.len() as u32);
            let valid = design.less(section.address, count)?;
            let zero = Self::const_zero(design);
            let index = design.decide(valid, section.address, zero)?;
            let data = design.select(&data_wires, index)?;
            let ack = design.and(&[valid, section.read_request])?;

            section.read_data = Some(design.delay(data));
            section.read_acknowledge = Some(design.delay(ack));
            Ok(())
        })?;

        self.locked = true;
        Ok(())
    }

    /// Opens a sub-section: addresses are rebased to the section start
    /// and the bus signals gain `1 + extra_pipelining` pipeline
    /// registers.
    pub fn break_section(
        &mut self,
        design: &mut Design,
        extra_pipelining: u32,
    ) -> DesignResult<()> {
        if !self.locked {
            self.build(design)?;
        }

        // The base-address constant arrives from the enclosing level so
        // it becomes a port of the section's module.
        let here = design.hierarchy.current();
        let parent = design.hierarchy.level(here).parent.unwrap_or(here);
        let offset = self.next_address.get() - self.current.base_address;
        let base =
            design.at_level(parent, |d| Self::const_u32(d, offset));

        design.input_name(base, "Config_BaseAddress");
        design.input_name(self.current.clear_all, "Config_ClearAll");
        design.input_name(self.current.address, "Config_Address");
        design.input_name(self.current.write_enable, "Config_WriteEnable");
        design.input_name(self.current.write_data, "Config_WriteData");
        design.input_name(self.current.read_request, "Config_ReadRequest");

        self.stack.push(self.current);

        let valid = design.less_equal(base, self.current.address)?;
        let rebased = design.minus(self.current.address, base)?;
        let rebased = design.floor_cast(address_type(), rebased, CastMode::WrapAround)?;
        let zero = Self::const_zero(design);
        let zero_data = Self::const_zero(design);

        self.current.address = design.decide(valid, rebased, zero)?;
        self.current.write_enable = design.and(&[valid, self.current.write_enable])?;
        self.current.write_data = design.decide(valid, self.current.write_data, zero_data)?;
        self.current.read_request = design.and(&[valid, self.current.read_request])?;
        self.current.base_address = self.next_address.get();
        self.current.level = design.hierarchy.current();

        for _ in 0..=extra_pipelining {
            self.current.clear_all = design.delay(self.current.clear_all);
            self.current.address = design.delay(self.current.address);
            self.current.write_enable = design.delay(self.current.write_enable);
            self.current.write_data = design.delay(self.current.write_data);
            self.current.read_request = design.delay(self.current.read_request);
        }

        self.current.read_acknowledge = None;
        self.current.read_data = None;
        self.locked = false;
        Ok(())
    }

    /// Closes the innermost open section, arbitrating its read path into
    /// the enclosing one.
    pub fn merge_section(
        &mut self,
        design: &mut Design,
        extra_pipelining: u32,
    ) -> DesignResult<()> {
        if !self.locked {
            self.build(design)?;
        }

        design.terminate(self.current.clear_all);
        design.terminate(self.current.address);
        design.terminate(self.current.write_enable);
        design.terminate(self.current.write_data);
        design.terminate(self.current.read_request);

        let (sub_ack, sub_data) = self.read_path(design);
        let parent = self
            .stack
            .pop()
            .ok_or_else(|| DesignError::new("merge_section without an open section"))?;

        self.current.clear_all = parent.clear_all;
        self.current.address = parent.address;
        self.current.write_enable = parent.write_enable;
        self.current.write_data = parent.write_data;
        self.current.read_request = parent.read_request;
        self.current.base_address = parent.base_address;
        self.current.level = parent.level;

        let (parent_ack, parent_data) = match (parent.read_acknowledge, parent.read_data) {
            (Some(ack), Some(data)) => (ack, data),
            _ => {
                let ack = design.constant(Value::Bool(false));
                let data = design.constant(Value::zero_of(&data_type()));
                (ack, data)
            }
        };

        let zero = Self::const_zero(design);
        let mut data = design.decide_chain(
            &[(parent_ack, parent_data), (sub_ack, sub_data)],
            zero,
        )?;
        let mut ack = design.or(&[parent_ack, sub_ack])?;

        for _ in 0..=extra_pipelining {
            self.current.clear_all = design.delay(self.current.clear_all);
            self.current.address = design.delay(self.current.address);
            self.current.write_enable = design.delay(self.current.write_enable);
            self.current.write_data = design.delay(self.current.write_data);
            self.current.read_request = design.delay(self.current.read_request);
            ack = design.delay(ack);
            data = design.delay(data);
        }

        design.output_name(ack, "Config_ReadAcknowledge");
        design.output_name(data, "Config_ReadData");

        self.current.read_acknowledge = Some(ack);
        self.current.read_data = Some(data);
        self.outputs = Some((ack, data));
        Ok(())
    }

    /// Forks a parallel address tree sharing this builder's master
    /// counter.
    pub fn fork(&mut self, design: &mut Design) -> DesignResult<BusBuilder> {
        if !self.locked {
            self.build(design)?;
        }
        Ok(BusBuilder {
            namespace: Namespace::new(),
            next_address: Rc::clone(&self.next_address),
            current: Section {
                read_acknowledge: None,
                read_data: None,
                ..self.current
            },
            stack: Vec::new(),
            locked: true,
            read_back: Vec::new(),
            outputs: None,
        })
    }

    /// Joins a forked tree back, merging its read path with a small
    /// combinational arbiter.
    pub fn join(&mut self, design: &mut Design, from: BusBuilder) -> DesignResult<()> {
        from.finalise()?;
        if !self.locked {
            self.build(design)?;
        }

        self.current.clear_all = design.delay(self.current.clear_all);
        design.terminate(from.current.clear_all);
        self.current.address = design.delay(self.current.address);
        design.terminate(from.current.address);
        self.current.write_enable = design.delay(self.current.write_enable);
        design.terminate(from.current.write_enable);
        self.current.write_data = design.delay(self.current.write_data);
        design.terminate(from.current.write_data);
        self.current.read_request = design.delay(self.current.read_request);
        design.terminate(from.current.read_request);

        let (own_ack, own_data) = self.read_path(design);
        let (forked_ack, forked_data) = from.read_path(design);

        let zero = Self::const_zero(design);
        let data = design.decide_chain(
            &[(own_ack, own_data), (forked_ack, forked_data)],
            zero,
        )?;
        let ack = design.or(&[forked_ack, own_ack])?;

        self.current.read_data = Some(design.delay(data));
        self.current.read_acknowledge = Some(design.delay(ack));

        for entry in from.namespace.entries() {
            self.namespace.add(entry.clone());
        }
        Ok(())
    }

    /// Allocates a memory-mapped write register and returns the node
    /// carrying the stored value on every cycle.
    ///
    /// Registers up to the data width take one address; up to twice the
    /// data width they take two consecutive addresses, high chunk first
    /// (the high chunk lands in a shadow register and is committed when
    /// the low chunk is written).
    pub fn add_register(
        &mut self,
        design: &mut Design,
        signed: bool,
        word_width: u16,
        fraction: i16,
        name: &str,
    ) -> Result<Node, BusError> {
        if self.locked {
            return Err(DesignError::new(
                "add_register: open a section with break_section first",
            )
            .into());
        }
        let ty = SignalType::Fixed {
            signed,
            word_width,
            fraction,
        };
        let local = self.next_address.get() - self.current.base_address;
        let global = self.next_address.get();

        let value = if word_width <= DATA_WIDTH {
            let forward = ForwardNode::new(design, ty)?;
            let value = forward.node();
            let zero = design.constant(Value::zero_of(&ty));
            let at_address = Self::const_u32(design, local);
            let selected = design.equal(self.current.address, at_address)?;
            let write = design.and(&[self.current.write_enable, selected])?;
            let write_value = design.reinterpret_cast(ty, self.current.write_data)?;
            let next = design.decide_chain(
                &[(self.current.clear_all, zero), (write, write_value)],
                value,
            )?;
            let reg = design.delay(next);
            let bound = forward.bind(design, reg)?;
            self.read_back.push(bound);
            self.next_address.set(global + 1);
            bound
        } else if word_width <= 2 * DATA_WIDTH {
            let high_ty = SignalType::Fixed {
                signed,
                word_width: word_width - DATA_WIDTH,
                fraction: fraction - DATA_WIDTH as i16,
            };

            // High chunk at the first address, held in a shadow register.
            let high_forward = ForwardNode::new(design, high_ty)?;
            let high_value = high_forward.node();
            let high_zero = design.constant(Value::zero_of(&high_ty));
            let at_high = Self::const_u32(design, local);
            let high_selected = design.equal(self.current.address, at_high)?;
            let high_write = design.and(&[self.current.write_enable, high_selected])?;
            let high_write_value = design.reinterpret_cast(high_ty, self.current.write_data)?;
            let high_next = design.decide_chain(
                &[
                    (self.current.clear_all, high_zero),
                    (high_write, high_write_value),
                ],
                high_value,
            )?;
            let high_reg = design.delay(high_next);
            let high_bound = high_forward.bind(design, high_reg)?;

            // The low chunk at the next address commits the full word.
            let forward = ForwardNode::new(design, ty)?;
            let value = forward.node();
            let zero = design.constant(Value::zero_of(&ty));
            let at_low = Self::const_u32(design, local + 1);
            let low_selected = design.equal(self.current.address, at_low)?;
            let low_write = design.and(&[self.current.write_enable, low_selected])?;
            let low_ty = SignalType::ufix(DATA_WIDTH, fraction);
            let low_value = design.reinterpret_cast(low_ty, self.current.write_data)?;
            let full = design.plus(&[high_bound, low_value])?;
            let full = design.floor_cast(ty, full, CastMode::WrapAround)?;
            let next = design.decide_chain(
                &[(self.current.clear_all, zero), (low_write, full)],
                value,
            )?;
            let reg = design.delay(next);
            let bound = forward.bind(design, reg)?;

            let high_read = design.floor_cast(high_ty, bound, CastMode::WrapAround)?;
            self.read_back.push(high_read);
            self.read_back.push(bound);
            self.next_address.set(global + 2);
            bound
        } else {
            return Err(DesignError::new(format!(
                "add_register: word width {word_width} exceeds twice the bus data width"
            ))
            .into());
        };

        self.namespace.add(NamespaceEntry {
            access: Access::ReadWrite,
            name: name.to_string(),
            ty,
            address: global,
            length: self.next_address.get() - global,
        });
        Ok(value)
    }

    /// Adds a read-only observation of the given node.
    pub fn add_observer(
        &mut self,
        design: &mut Design,
        source: Node,
        name: &str,
    ) -> Result<(), BusError> {
        if self.locked {
            return Err(DesignError::new(
                "add_observer: open a section with break_section first",
            )
            .into());
        }
        let ty = source.ty();
        let (signed, word_width, fraction) = match ty {
            SignalType::Fixed {
                signed,
                word_width,
                fraction,
            } => (signed, word_width, fraction),
            other => {
                return Err(
                    DesignError::new(format!("add_observer: unsupported type '{other}'")).into(),
                )
            }
        };
        let global = self.next_address.get();

        let reg = design.delay(source);
        if word_width <= DATA_WIDTH {
            self.read_back.push(reg);
            self.next_address.set(global + 1);
        } else if word_width <= 2 * DATA_WIDTH {
            let high_ty = SignalType::Fixed {
                signed,
                word_width: word_width - DATA_WIDTH,
                fraction: fraction - DATA_WIDTH as i16,
            };
            let high = design.floor_cast(high_ty, reg, CastMode::WrapAround)?;
            self.read_back.push(high);
            self.read_back.push(reg);
            self.next_address.set(global + 2);
        } else {
            return Err(DesignError::new(format!(
                "add_observer: word width {word_width} exceeds twice the bus data width"
            ))
            .into());
        }

        self.namespace.add(NamespaceEntry {
            access: Access::ReadOnly,
            name: name.to_string(),
            ty,
            address: global,
            length: self.next_address.get() - global,
        });
        Ok(())
    }

    /// Allocates `length` consecutive addresses and returns the decoded
    /// window for a user-implemented backing block.
    pub fn add_range(
        &mut self,
        design: &mut Design,
        signed: bool,
        word_width: u16,
        fraction: i16,
        length: u32,
        name: &str,
    ) -> Result<BusRange, BusError> {
        if word_width > DATA_WIDTH {
            return Err(DesignError::new(
                "add_range: word widths beyond the bus data width are not supported",
            )
            .into());
        }
        if length == 0 {
            return Err(DesignError::new("add_range: length must be at least 1").into());
        }
        if !self.locked {
            self.build(design)?;
        }

        let local = self.next_address.get() - self.current.base_address;
        let global = self.next_address.get();
        let ty = SignalType::Fixed {
            signed,
            word_width,
            fraction,
        };

        let mut addr_width = 1u16;
        let mut temp = length - 1;
        while temp / 2 > 0 {
            addr_width += 1;
            temp /= 2;
        }
        let addr_ty = SignalType::ufix(addr_width, 0);

        let start = Self::const_u32(design, local);
        let end = Self::const_u32(design, local + length);
        let above = design.less_equal(start, self.current.address)?;
        let below = design.less(self.current.address, end)?;
        let valid = design.and(&[above, below])?;

        let rebased = design.minus(self.current.address, start)?;
        let rebased = design.floor_cast(addr_ty, rebased, CastMode::WrapAround)?;
        let addr_zero = design.constant(Value::zero_of(&addr_ty));
        let data_zero = design.constant(Value::zero_of(&ty));

        let range_address = design.decide(valid, rebased, addr_zero)?;
        let range_write_enable = design.and(&[valid, self.current.write_enable])?;
        let write_value = design.reinterpret_cast(ty, self.current.write_data)?;
        let range_write_data = design.decide(range_write_enable, write_value, data_zero)?;
        let range_read_request = design.and(&[valid, self.current.read_request])?;

        let read_acknowledge = ForwardNode::new(design, SignalType::Bool)?;
        let read_data = ForwardNode::new(design, ty)?;

        let (own_ack, own_data) = self.read_path(design);
        let returned = design.reinterpret_cast(data_type(), read_data.node())?;
        let zero = Self::const_zero(design);
        let data = design.decide_chain(
            &[(own_ack, own_data), (read_acknowledge.node(), returned)],
            zero,
        )?;
        let ack = design.or(&[own_ack, read_acknowledge.node()])?;

        let data = design.delay(data);
        let ack = design.delay(ack);
        self.current.read_data = Some(data);
        self.current.read_acknowledge = Some(ack);
        self.outputs = Some((ack, data));

        self.next_address.set(global + length);
        self.namespace.add(NamespaceEntry {
            access: Access::ReadWrite,
            name: name.to_string(),
            ty,
            address: global,
            length,
        });

        Ok(BusRange {
            clear_all: self.current.clear_all,
            address: range_address,
            write_enable: range_write_enable,
            write_data: range_write_data,
            read_request: range_read_request,
            read_acknowledge,
            read_data,
        })
    }
}
