//! The bus controller: cycle-by-cycle transactions from the testbench
//! side.

use crate::builder::BusInputs;
use crate::error::BusError;
use crate::{address_type, data_type, ADDRESS_WIDTH};
use ferro_common::{DesignError, DesignResult};
use ferro_fixed::DynFix;
use ferro_ir::{BlockId, Design, Node, Value};
use ferro_sim::Simulator;

/// Drives the bus inputs of a [`BusBuilder`](crate::BusBuilder) cycle by
/// cycle and collects read responses.
///
/// The controller owns testbench signal blocks for the write path and
/// reads the acknowledge/data nodes attached with
/// [`attach_read_path`](BusController::attach_read_path). Reads are
/// pipelined: requests go out back to back, and the controller then
/// blocks for up to the configured time-out waiting for the outstanding
/// acknowledges.
#[derive(Debug)]
pub struct BusController {
    clear_all: BlockId,
    address: BlockId,
    write_enable: BlockId,
    write_data: BlockId,
    read_request: BlockId,
    outputs: BusInputs,
    read_path: Option<(Node, Node)>,
    timeout: u32,
}

impl BusController {
    /// Creates the controller's signal blocks in the design.
    pub fn new(design: &mut Design, timeout: u32) -> Self {
        let (clear_all_node, clear_all) = design.signal(Value::Bool(false));
        let (address_node, address) = design.signal(Value::zero_of(&address_type()));
        let (write_enable_node, write_enable) = design.signal(Value::Bool(false));
        let (write_data_node, write_data) = design.signal(Value::zero_of(&data_type()));
        let (read_request_node, read_request) = design.signal(Value::Bool(false));
        Self {
            clear_all,
            address,
            write_enable,
            write_data,
            read_request,
            outputs: BusInputs {
                clear_all: clear_all_node,
                address: address_node,
                write_enable: write_enable_node,
                write_data: write_data_node,
                read_request: read_request_node,
            },
            read_path: None,
            timeout,
        }
    }

    /// The bus input nodes to hand to the builder.
    pub fn outputs(&self) -> BusInputs {
        self.outputs
    }

    /// Attaches the builder's merged read path.
    pub fn attach_read_path(&mut self, read_acknowledge: Node, read_data: Node) {
        self.read_path = Some((read_acknowledge, read_data));
    }

    fn set_address(&self, design: &mut Design, address: u32) -> DesignResult<()> {
        let value = DynFix::from_i64_with(false, ADDRESS_WIDTH as i32, 0, address as i64)
            .map_err(|e| DesignError::new(format!("bus address {address}: {e}")))?;
        design.set_signal(self.address, Value::Fixed(value))
    }

    fn set_data(&self, design: &mut Design, word: u32) -> DesignResult<()> {
        let mut value = DynFix::new(true, 32, 0)
            .map_err(|e| DesignError::new(format!("bus data word: {e}")))?;
        value.set_limb(0, word);
        value.wrap_around();
        design.set_signal(self.write_data, Value::Fixed(value))
    }

    fn read_response(&self, design: &Design) -> Option<u32> {
        let (ack, data) = self.read_path?;
        if design.read(ack).as_bool() == Some(true) {
            let word = design.read(data).as_fixed().map(|v| v.limbs()[0]);
            return word;
        }
        None
    }

    /// Broadcasts a one-cycle synchronous clear of every register on the
    /// bus.
    pub fn clear_all(
        &self,
        design: &mut Design,
        sim: &mut Simulator,
    ) -> Result<(), BusError> {
        design.set_signal(self.clear_all, Value::Bool(true))?;
        sim.run(design, 1)?;
        design.set_signal(self.clear_all, Value::Bool(false))?;
        Ok(())
    }

    /// Writes consecutive data words starting at the given address, one
    /// per cycle.
    pub fn write(
        &self,
        design: &mut Design,
        sim: &mut Simulator,
        address: u32,
        values: &[u32],
    ) -> Result<(), BusError> {
        design.set_signal(self.write_enable, Value::Bool(true))?;
        for (offset, word) in values.iter().enumerate() {
            self.set_address(design, address + offset as u32)?;
            self.set_data(design, *word)?;
            sim.run(design, 1)?;
        }
        design.set_signal(self.write_enable, Value::Bool(false))?;
        Ok(())
    }

    /// Reads consecutive data words starting at the given address.
    ///
    /// Requests are issued back to back; outstanding responses are
    /// collected for up to the configured time-out.
    pub fn read(
        &self,
        design: &mut Design,
        sim: &mut Simulator,
        address: u32,
        count: u32,
    ) -> Result<Vec<u32>, BusError> {
        let mut values = Vec::with_capacity(count as usize);

        design.set_signal(self.read_request, Value::Bool(true))?;
        for offset in 0..count {
            self.set_address(design, address + offset)?;
            sim.run(design, 1)?;
            if let Some(word) = self.read_response(design) {
                values.push(word);
            }
        }
        design.set_signal(self.read_request, Value::Bool(false))?;

        let mut waited = 0;
        while (values.len() as u32) < count {
            sim.run(design, 1)?;
            if let Some(word) = self.read_response(design) {
                values.push(word);
            } else {
                waited += 1;
                if waited >= self.timeout {
                    return Err(BusError::Timeout {
                        address: address + values.len() as u32,
                        timeout: self.timeout,
                    });
                }
            }
        }
        Ok(values)
    }
}
