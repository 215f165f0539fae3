//! The block catalogue: one tagged enum for every primitive.
//!
//! The vocabulary is closed and statically known. Each [`BlockKind`]
//! variant carries its class-specific payload; evaluation, clocked
//! stepping, source-block discovery, and property reporting are dispatched
//! by matching on the variant (see [`crate::eval`]).

use crate::ids::{BlockId, LevelId};
use crate::pin::{InputPin, OutputPin};
use crate::props::Properties;
use crate::value::Value;
use ferro_common::RuntimeError;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::fmt;

/// A host-language callable wrapped by the function block.
///
/// Simulation-only; function blocks are never emitted.
pub struct FunctionFn(
    /// The wrapped callable.
    pub Box<dyn Fn(&[Value]) -> Result<Value, RuntimeError>>,
);

impl fmt::Debug for FunctionFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionFn")
    }
}

/// One summand of a flat adder path: the input pin and the left-shift that
/// aligns its binary point to the sum's fraction.
#[derive(Debug, Clone)]
pub struct Summand {
    /// Input-pin index of the summand.
    pub input: u16,
    /// Left shift aligning the summand to the output fraction.
    pub align: u32,
}

/// One output path of a flat adder.
#[derive(Debug, Clone)]
pub struct Sum {
    /// The summands feeding this path.
    pub summands: Vec<Summand>,
    /// Output-pin index of the path.
    pub output: u16,
}

/// One output path of a flat multiplier (exactly two factors).
#[derive(Debug, Clone)]
pub struct Product {
    /// Input-pin indices of the two factors.
    pub inputs: [u16; 2],
    /// Output-pin index of the path.
    pub output: u16,
}

/// One output path of a flat boolean gate.
#[derive(Debug, Clone)]
pub struct GatePath {
    /// Input-pin indices of the operands.
    pub inputs: Vec<u16>,
    /// Output-pin index of the path.
    pub output: u16,
}

/// One (true, false) operand pair of a decide block.
///
/// Fixed-point operands are pre-shifted to the common representation; the
/// shifts are recorded for the emitter.
#[derive(Debug, Clone)]
pub struct DecidePath {
    /// Input-pin index of the true operand.
    pub true_input: u16,
    /// Input-pin index of the false operand.
    pub false_input: u16,
    /// Output-pin index of the path.
    pub output: u16,
    /// Left shift aligning the true operand to the output fraction.
    pub true_align: u32,
    /// Left shift aligning the false operand to the output fraction.
    pub false_align: u32,
}

/// One operand pair of a relational block.
#[derive(Debug, Clone)]
pub struct ComparePath {
    /// Input-pin index of the left operand.
    pub lhs: u16,
    /// Input-pin index of the right operand.
    pub rhs: u16,
    /// Output-pin index of the boolean result.
    pub output: u16,
    /// Left shift aligning the left operand to the common type.
    pub lhs_align: u32,
    /// Left shift aligning the right operand to the common type.
    pub rhs_align: u32,
    /// Whether the aligned compare is signed.
    pub signed: bool,
}

/// The relational operator of a compare block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equality.
    Equal,
    /// Inequality.
    NotEqual,
    /// Strictly less than.
    Less,
    /// Less than or equal.
    LessEqual,
}

impl CompareOp {
    /// The entity class name of this operator.
    pub fn class_name(self) -> &'static str {
        match self {
            CompareOp::Equal => "equal",
            CompareOp::NotEqual => "not_equal",
            CompareOp::Less => "less",
            CompareOp::LessEqual => "less_equal",
        }
    }
}

/// Registered state of a dual-port memory.
#[derive(Debug, Clone)]
pub struct MemoryState {
    /// Number of words.
    pub depth: u32,
    /// Memory contents.
    pub cells: Vec<Value>,
    /// The output register (one cycle of latency).
    pub out: Value,
}

/// Registered state of a source block.
#[derive(Debug, Clone)]
pub struct SourceState {
    /// Data still to be emitted.
    pub data: Vec<Value>,
    /// Read position within `data`.
    pub pos: usize,
    /// Wrap around at the end of the data instead of running dry.
    pub periodic: bool,
    /// Values staged for the current cycle, one per bus element.
    pub current: Vec<Value>,
    /// Whether `current` holds valid data.
    pub ready: bool,
}

impl SourceState {
    /// Stages the next `current.len()` elements, setting `ready`.
    pub fn read_next(&mut self) {
        self.ready = false;
        let length = self.data.len();
        if length == 0 {
            return;
        }
        let width = self.current.len();
        if self.periodic {
            for value in self.current.iter_mut() {
                if self.pos >= length {
                    self.pos = 0;
                }
                *value = self.data[self.pos].clone();
                self.pos += 1;
            }
        } else {
            if self.pos + width > length {
                return;
            }
            for value in self.current.iter_mut() {
                *value = self.data[self.pos].clone();
                self.pos += 1;
            }
        }
        self.ready = true;
    }
}

/// Registered state of a sink block.
#[derive(Debug, Clone, Default)]
pub struct SinkState {
    /// Values captured so far, one per enabled clock.
    pub data: Vec<Value>,
}

/// Registered state of a random block.
#[derive(Debug)]
pub struct RandomState {
    /// The deterministic generator.
    pub rng: StdRng,
    /// The seed used for reset.
    pub seed: u64,
    /// The value published on the current cycle.
    pub current: Value,
}

/// The class-specific payload of a block.
#[derive(Debug)]
pub enum BlockKind {
    /// Placeholder output of an unbound handle; fatal if it survives to
    /// simulation with a consumer.
    Temporary,
    /// Pass-through; spliced out by `Simplify`.
    Identity,
    /// Compile-time values; not evaluable.
    Constant,
    /// Pipeline registers, optionally gated by a clock enable.
    Delay {
        /// Per-path register state.
        state: Vec<Value>,
        /// Whether the last input pin is a clock enable.
        has_enable: bool,
    },
    /// Multiplexer tree over (true, false) operand pairs.
    Decide {
        /// The operand pairs.
        paths: Vec<DecidePath>,
    },
    /// Simulation-only host callable.
    Function {
        /// The wrapped callable.
        func: FunctionFn,
    },
    /// Conversion rounding toward negative infinity.
    FloorCast,
    /// Banker's rounding (round half to even) on narrowing.
    ConvergentCast,
    /// Bit-pattern copy re-canonicalized under the destination type.
    ReinterpretCast,
    /// Booleans to one fixed-point word.
    BitCompose,
    /// Fixed-point word to booleans.
    BitExtract {
        /// First extracted bit index.
        first_bit: u32,
        /// Last extracted bit index.
        last_bit: u32,
    },
    /// Indexed read from a bus.
    Select {
        /// Number of data inputs.
        length: u32,
    },
    /// Bus with a contiguous range substituted.
    Replace {
        /// Number of bus elements.
        length: u32,
        /// Number of replacement values.
        values: u32,
    },
    /// Flat multi-operand adder.
    Plus {
        /// The output paths.
        sums: Vec<Sum>,
    },
    /// Flat two-operand multiplier.
    Times {
        /// The output paths.
        products: Vec<Product>,
    },
    /// Flat boolean AND.
    And {
        /// The output paths.
        paths: Vec<GatePath>,
    },
    /// Flat boolean OR.
    Or {
        /// The output paths.
        paths: Vec<GatePath>,
    },
    /// Flat boolean XOR.
    Xor {
        /// The output paths.
        paths: Vec<GatePath>,
    },
    /// Relational operator with operand pre-alignment.
    Compare {
        /// The operator.
        op: CompareOp,
        /// The operand pairs.
        paths: Vec<ComparePath>,
    },
    /// Arithmetic negation (signed, one bit wider).
    Negate,
    /// Boolean or bitwise complement.
    Not,
    /// Dual-port memory with one cycle of output latency.
    Memory(MemoryState),
    /// Port-naming ornament consumed by the elaborator.
    Label {
        /// Whether the label names a bus.
        is_bus: bool,
        /// `"input"` or `"output"`.
        class: String,
        /// The port name.
        label: String,
    },
    /// Consumes an otherwise-unused node.
    Terminate,
    /// Testbench-driven value; written from outside the graph.
    Signal {
        /// The value published on the output.
        value: Value,
    },
    /// Testbench observation point.
    Probe,
    /// Reserved flip-flops that must survive elaboration.
    Spare {
        /// Number of reserved flip-flops.
        count: u32,
    },
    /// Testbench data source.
    Source(SourceState),
    /// Testbench data sink.
    Sink(SinkState),
    /// Clocked uniform random source.
    Random(RandomState),
}

/// A named computational element of the design graph.
#[derive(Debug)]
pub struct Block {
    /// Instance name, unique within the hierarchy level.
    pub name: String,
    /// The hierarchy level the block was created in.
    pub level: LevelId,
    /// Class-specific payload.
    pub kind: BlockKind,
    /// Ordered input pins.
    pub inputs: Vec<InputPin>,
    /// Ordered output pins.
    pub outputs: Vec<OutputPin>,
}

impl Block {
    /// The entity class name used by the elaborator and emitter.
    pub fn class_name(&self) -> &'static str {
        match &self.kind {
            BlockKind::Temporary => "temporary",
            BlockKind::Identity => "identity",
            BlockKind::Constant => "constant",
            BlockKind::Delay { .. } => "delay",
            BlockKind::Decide { .. } => "decide",
            BlockKind::Function { .. } => "function",
            BlockKind::FloorCast => "floor_cast",
            BlockKind::ConvergentCast => "convergent_cast",
            BlockKind::ReinterpretCast => "reinterpret_cast",
            BlockKind::BitCompose => "bit_compose",
            BlockKind::BitExtract { .. } => "bit_extract",
            BlockKind::Select { .. } => "select",
            BlockKind::Replace { .. } => "replace",
            BlockKind::Plus { .. } => "plus",
            BlockKind::Times { .. } => "times",
            BlockKind::And { .. } => "and",
            BlockKind::Or { .. } => "or",
            BlockKind::Xor { .. } => "xor",
            BlockKind::Compare { op, .. } => op.class_name(),
            BlockKind::Negate => "negate",
            BlockKind::Not => "not",
            BlockKind::Memory(_) => "memory",
            BlockKind::Label { .. } => "$label",
            BlockKind::Terminate => "$terminate",
            BlockKind::Signal { .. } => "signal",
            BlockKind::Probe => "probe",
            BlockKind::Spare { .. } => "spare_ff",
            BlockKind::Source(_) => "source",
            BlockKind::Sink(_) => "sink",
            BlockKind::Random(_) => "random",
        }
    }

    /// Whether the simulator calls `evaluate` on this block.
    pub fn can_evaluate(&self) -> bool {
        match &self.kind {
            BlockKind::Temporary
            | BlockKind::Constant
            | BlockKind::Label { .. }
            | BlockKind::Terminate
            | BlockKind::Probe
            | BlockKind::Spare { .. }
            | BlockKind::Sink(_) => false,
            BlockKind::Identity => self.outputs[0].is_connected(),
            _ => true,
        }
    }

    /// Whether the block carries registered state advanced by `step`.
    pub fn is_clocked(&self) -> bool {
        matches!(
            self.kind,
            BlockKind::Delay { .. }
                | BlockKind::Memory(_)
                | BlockKind::Source(_)
                | BlockKind::Sink(_)
                | BlockKind::Random(_)
        )
    }

    /// Whether this is a placeholder from an unbound handle.
    pub fn is_temporary(&self) -> bool {
        matches!(self.kind, BlockKind::Temporary)
    }

    /// Whether the block has no function and can be dropped by the
    /// elaborator.
    ///
    /// Spare flip-flops are reserved by definition and never removable;
    /// everything else is removable once it has no connections.
    pub fn can_remove(&self) -> bool {
        if matches!(self.kind, BlockKind::Spare { .. }) {
            return false;
        }
        self.inputs.iter().all(|pin| !pin.is_connected())
            && self.outputs.iter().all(|pin| !pin.is_connected())
    }

    /// Blocks that must be evaluated before this one in the combinational
    /// order.
    ///
    /// Clocked blocks report no sources: their register outputs do not
    /// combinationally depend on any input, which is what breaks feedback
    /// loops for the topological sort.
    pub fn source_blocks(&self) -> HashSet<BlockId> {
        match &self.kind {
            BlockKind::Temporary
            | BlockKind::Constant
            | BlockKind::Label { .. }
            | BlockKind::Spare { .. }
            | BlockKind::Signal { .. } => HashSet::new(),
            _ if self.is_clocked() => HashSet::new(),
            _ => self
                .inputs
                .iter()
                .filter_map(|pin| pin.driver.map(|d| d.block))
                .collect(),
        }
    }

    /// Writes the block's named properties for the elaborator.
    pub fn properties(&self) -> Properties {
        let mut props = Properties::new();
        match &self.kind {
            BlockKind::Plus { sums } => {
                if let Some(sum) = sums.first() {
                    props.set_int("NumberOfSummands", sum.summands.len() as i64);
                }
                for (p, sum) in sums.iter().enumerate() {
                    for (s, summand) in sum.summands.iter().enumerate() {
                        props.set_int_indexed2("Align", p as i32, s as i32, summand.align as i64);
                    }
                }
            }
            BlockKind::Times { products } => {
                if !products.is_empty() {
                    props.set_int("NumberOfFactors", 2);
                }
            }
            BlockKind::Decide { paths } => {
                for (p, path) in paths.iter().enumerate() {
                    props.set_int_indexed("TrueAlign", p as i32, path.true_align as i64);
                    props.set_int_indexed("FalseAlign", p as i32, path.false_align as i64);
                }
            }
            BlockKind::BitExtract {
                first_bit,
                last_bit,
            } => {
                props.set_int("firstBitIndex", *first_bit as i64);
                props.set_int("lastBitIndex", *last_bit as i64);
            }
            BlockKind::Select { length } => {
                props.set_int("Length", *length as i64);
            }
            BlockKind::Replace { length, values } => {
                props.set_int("Length", *length as i64);
                props.set_int("NumberOfValues", *values as i64);
            }
            BlockKind::Memory(state) => {
                props.set_int("Depth", state.depth as i64);
            }
            BlockKind::Label {
                is_bus,
                class,
                label,
            } => {
                props.set_int("isBus", i64::from(*is_bus));
                props.set_string("class", class.clone());
                props.set_string("label", label.clone());
            }
            BlockKind::Spare { count } => {
                props.set_int("NumberOfFlipFlops", *count as i64);
            }
            BlockKind::Delay { has_enable, .. } => {
                props.set_int("HasClockEnable", i64::from(*has_enable));
            }
            BlockKind::Compare { paths, .. } => {
                for (p, path) in paths.iter().enumerate() {
                    props.set_int_indexed("LhsAlign", p as i32, path.lhs_align as i64);
                    props.set_int_indexed("RhsAlign", p as i32, path.rhs_align as i64);
                    props.set_int_indexed("Signed", p as i32, i64::from(path.signed));
                }
            }
            _ => {}
        }
        props
    }

    /// The display name of an input pin.
    pub fn input_pin_name(&self, index: usize) -> String {
        match &self.kind {
            BlockKind::Label { label, .. } => label.clone(),
            BlockKind::Decide { .. } if index == 0 => "Decision".to_string(),
            BlockKind::Delay { has_enable, state } if *has_enable && index == state.len() => {
                "ClockEnable".to_string()
            }
            BlockKind::Memory(_) => match index {
                0 => "ReadAddress".to_string(),
                1 => "WriteEnable".to_string(),
                2 => "WriteAddress".to_string(),
                3 => "WriteData".to_string(),
                _ => format!("In{index}"),
            },
            _ => format!("In{index}"),
        }
    }

    /// The display name and bus metadata of an output pin:
    /// `(name, group index, bus size, bus index)`.
    ///
    /// A bus size of `None` marks a non-bus pin. Cast blocks group their
    /// paths into one bus, as the emitter expects.
    pub fn output_pin_info(&self, index: usize) -> (String, i32, Option<u32>, u32) {
        let paths = self.outputs.len();
        match &self.kind {
            BlockKind::FloorCast | BlockKind::ConvergentCast | BlockKind::ReinterpretCast
                if paths > 1 =>
            {
                ("Out".to_string(), 0, Some(paths as u32), index as u32)
            }
            _ => (format!("Out{index}"), index as i32, None, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SlotId;
    use ferro_fixed::SignalType;

    fn bare(kind: BlockKind) -> Block {
        Block {
            name: "b1".to_string(),
            level: LevelId::from_raw(0),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    #[test]
    fn class_names() {
        assert_eq!(bare(BlockKind::Temporary).class_name(), "temporary");
        assert_eq!(bare(BlockKind::FloorCast).class_name(), "floor_cast");
        assert_eq!(
            bare(BlockKind::Compare {
                op: CompareOp::LessEqual,
                paths: Vec::new()
            })
            .class_name(),
            "less_equal"
        );
        assert_eq!(
            bare(BlockKind::Label {
                is_bus: false,
                class: "input".into(),
                label: "Data".into()
            })
            .class_name(),
            "$label"
        );
    }

    #[test]
    fn spare_is_never_removable() {
        let block = bare(BlockKind::Spare { count: 4 });
        assert!(!block.can_remove());
        assert!(!block.can_evaluate());
    }

    #[test]
    fn unconnected_blocks_are_removable() {
        let block = bare(BlockKind::Constant);
        assert!(block.can_remove());
    }

    #[test]
    fn clocked_blocks_report_no_sources() {
        let mut block = bare(BlockKind::Delay {
            state: vec![Value::Bool(false)],
            has_enable: false,
        });
        block.inputs.push(InputPin {
            driver: Some(crate::pin::OutPin {
                block: BlockId::from_raw(5),
                index: 0,
            }),
        });
        assert!(block.is_clocked());
        assert!(block.source_blocks().is_empty());
    }

    #[test]
    fn combinational_blocks_report_drivers() {
        let mut block = bare(BlockKind::Negate);
        block.inputs.push(InputPin {
            driver: Some(crate::pin::OutPin {
                block: BlockId::from_raw(5),
                index: 0,
            }),
        });
        let sources = block.source_blocks();
        assert!(sources.contains(&BlockId::from_raw(5)));
    }

    #[test]
    fn label_properties() {
        let block = bare(BlockKind::Label {
            is_bus: true,
            class: "output".into(),
            label: "Result".into(),
        });
        let props = block.properties();
        assert_eq!(props.get_int("isBus"), Some(1));
        assert_eq!(props.get_string("class"), Some("output"));
    }

    #[test]
    fn memory_pin_names() {
        let block = bare(BlockKind::Memory(MemoryState {
            depth: 8,
            cells: Vec::new(),
            out: Value::Bool(false),
        }));
        assert_eq!(block.input_pin_name(0), "ReadAddress");
        assert_eq!(block.input_pin_name(3), "WriteData");
    }

    #[test]
    fn cast_outputs_group_into_bus() {
        let mut block = bare(BlockKind::FloorCast);
        for _ in 0..3 {
            block
                .outputs
                .push(OutputPin::new(SignalType::ufix(4, 0), SlotId::from_raw(0)));
        }
        let (name, group, bus_size, bus_index) = block.output_pin_info(1);
        assert_eq!(name, "Out");
        assert_eq!(group, 0);
        assert_eq!(bus_size, Some(3));
        assert_eq!(bus_index, 1);
    }

    #[test]
    fn source_read_next_periodic() {
        let mut state = SourceState {
            data: vec![Value::Int32(1), Value::Int32(2)],
            pos: 0,
            periodic: true,
            current: vec![Value::Int32(0)],
            ready: false,
        };
        state.read_next();
        assert_eq!(state.current[0], Value::Int32(1));
        state.read_next();
        assert_eq!(state.current[0], Value::Int32(2));
        state.read_next();
        assert_eq!(state.current[0], Value::Int32(1));
        assert!(state.ready);
    }

    #[test]
    fn source_read_next_runs_dry() {
        let mut state = SourceState {
            data: vec![Value::Int32(7)],
            pos: 0,
            periodic: false,
            current: vec![Value::Int32(0)],
            ready: false,
        };
        state.read_next();
        assert!(state.ready);
        state.read_next();
        assert!(!state.ready);
    }
}
