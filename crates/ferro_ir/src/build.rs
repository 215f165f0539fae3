//! The design-building API.
//!
//! Every function takes `&mut Design` and appends blocks to the current
//! hierarchy level, wiring pins as it goes. Type and width computation
//! follow the fixed-point rules of the block catalogue: flat adders use
//! the common representation plus `ceil(log2(n))` bits, multipliers sum
//! the operand widths (a 1-bit unsigned factor only moves the binary
//! point), and decide/relational operands are pre-aligned to their common
//! type.

use crate::block::{
    BlockKind, CompareOp, ComparePath, DecidePath, FunctionFn, GatePath, MemoryState, Product,
    RandomState, SinkState, SourceState, Sum, Summand,
};
use crate::design::Design;
use crate::ids::BlockId;
use crate::node::Node;
use crate::value::Value;
use ferro_common::{DesignError, DesignResult, RuntimeError};
use ferro_fixed::{common_representation, DynFix, SignalType};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Overflow policy of a narrowing conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CastMode {
    /// Discard bits above the destination width.
    #[default]
    WrapAround,
    /// Clamp to the destination's representable range.
    Saturate,
}

/// Handle on a source block: its data outputs, the data-ready output, and
/// the block ID used to feed data in during simulation.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    /// One node per bus element.
    pub data: Vec<Node>,
    /// High while the staged data is valid.
    pub ready: Node,
    /// The source block, for [`Design::set_source_data`].
    pub block: BlockId,
}

fn expect_bool(node: &Node, what: &str) -> DesignResult<()> {
    if node.ty() != SignalType::Bool {
        return Err(DesignError::new(format!(
            "{what} must be boolean, got '{}'",
            node.ty()
        )));
    }
    Ok(())
}

fn expect_fixed(node: &Node, what: &str) -> DesignResult<(bool, u16, i16)> {
    match node.ty() {
        SignalType::Fixed {
            signed,
            word_width,
            fraction,
        } => Ok((signed, word_width, fraction)),
        other => Err(DesignError::new(format!(
            "{what} must be fixed-point, got '{other}'"
        ))),
    }
}

fn expect_unsigned_integer_index(node: &Node, what: &str) -> DesignResult<()> {
    match node.ty() {
        SignalType::Fixed {
            signed: false,
            fraction: 0,
            ..
        } => Ok(()),
        other => Err(DesignError::new(format!(
            "{what} must be an unsigned fixed-point integer, got '{other}'"
        ))),
    }
}

fn zero_of_fixed(ty: &SignalType, context: &str) -> DesignResult<Value> {
    match ty {
        SignalType::Fixed {
            signed,
            word_width,
            fraction,
        } => {
            let zero = DynFix::new(*signed, *word_width as i32, *fraction as i32)
                .map_err(|e| DesignError::new(format!("{context}: {e}")))?;
            Ok(Value::Fixed(zero))
        }
        other => Err(DesignError::new(format!(
            "{context}: expected a fixed-point type, got '{other}'"
        ))),
    }
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl Design {
    /// A constant node carrying the given compile-time value.
    pub fn constant(&mut self, value: Value) -> Node {
        let ty = value.ty();
        let block = self.insert_block("constant", BlockKind::Constant);
        let pin = self.add_output(block, value);
        Node::new(pin, ty)
    }

    /// A fixed-point constant of the given shape.
    pub fn constant_f64(&mut self, ty: SignalType, value: f64) -> DesignResult<Node> {
        match ty {
            SignalType::Fixed {
                signed,
                word_width,
                fraction,
            } => {
                let v = DynFix::from_f64_with(signed, word_width as i32, fraction as i32, value)
                    .map_err(|e| DesignError::new(format!("constant: {e}")))?;
                Ok(self.constant(Value::Fixed(v)))
            }
            other => Err(DesignError::new(format!(
                "constant: expected a fixed-point type, got '{other}'"
            ))),
        }
    }

    /// An explicit pass-through, spliced out again at simulator start-up.
    pub fn identity(&mut self, input: Node) -> Node {
        let block = self.insert_block("identity", BlockKind::Identity);
        self.add_input(block, Some(input.pin()));
        let pin = self.add_output(block, Value::zero_of(&input.ty()));
        Node::new(pin, input.ty())
    }

    /// A single pipeline register.
    pub fn delay(&mut self, input: Node) -> Node {
        let ty = input.ty();
        let block = self.insert_block(
            "delay",
            BlockKind::Delay {
                state: vec![Value::zero_of(&ty)],
                has_enable: false,
            },
        );
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, Value::zero_of(&ty));
        Node::new(out, ty)
    }

    /// `count` pipeline registers in a row.
    pub fn multi_delay(&mut self, input: Node, count: u32) -> Node {
        let mut output = input;
        for _ in 0..count {
            output = self.delay(output);
        }
        output
    }

    /// A register bank over several nodes of identical type, optionally
    /// gated by a clock enable.
    pub fn delay_bus(&mut self, inputs: &[Node], enable: Option<Node>) -> DesignResult<Vec<Node>> {
        if inputs.is_empty() {
            return Err(DesignError::new("delay: at least one input is required"));
        }
        let ty = inputs[0].ty();
        for input in inputs {
            if input.ty() != ty {
                return Err(DesignError::new(format!(
                    "delay: all inputs must share one type, got '{}' and '{}'",
                    ty,
                    input.ty()
                )));
            }
        }
        if let Some(enable) = &enable {
            expect_bool(enable, "delay: the clock enable")?;
        }

        let state = vec![Value::zero_of(&ty); inputs.len()];
        let block = self.insert_block(
            "delay",
            BlockKind::Delay {
                state,
                has_enable: enable.is_some(),
            },
        );
        for input in inputs {
            self.add_input(block, Some(input.pin()));
        }
        if let Some(enable) = enable {
            self.add_input(block, Some(enable.pin()));
        }

        let mut outputs = Vec::with_capacity(inputs.len());
        for _ in inputs {
            let pin = self.add_output(block, Value::zero_of(&ty));
            outputs.push(Node::new(pin, ty));
        }
        Ok(outputs)
    }

    /// `decision ? on_true : on_false`.
    pub fn decide(&mut self, decision: Node, on_true: Node, on_false: Node) -> DesignResult<Node> {
        self.decide_bus(decision, &[(on_true, on_false)])
            .map(|mut outs| outs.remove(0))
    }

    /// One decide block over a list of (true, false) operand pairs sharing
    /// a decision.
    pub fn decide_bus(
        &mut self,
        decision: Node,
        pairs: &[(Node, Node)],
    ) -> DesignResult<Vec<Node>> {
        expect_bool(&decision, "decide: the decision input")?;
        if pairs.is_empty() {
            return Err(DesignError::new("decide: at least one operand pair"));
        }

        let block = self.insert_block("decide", BlockKind::Decide { paths: Vec::new() });
        self.add_input(block, Some(decision.pin()));

        let mut paths = Vec::with_capacity(pairs.len());
        let mut outputs = Vec::with_capacity(pairs.len());
        for (on_true, on_false) in pairs {
            let true_ty = on_true.ty();
            let false_ty = on_false.ty();
            let (out_ty, true_align, false_align) = if true_ty.is_fixed() && false_ty.is_fixed() {
                let common = common_representation([&true_ty, &false_ty])
                    .map_err(|e| DesignError::new(format!("decide: {e}")))?;
                let fraction = common.fraction().unwrap_or(0) as i32;
                (
                    common,
                    (fraction - true_ty.fraction().unwrap_or(0) as i32) as u32,
                    (fraction - false_ty.fraction().unwrap_or(0) as i32) as u32,
                )
            } else if true_ty == false_ty {
                (true_ty, 0, 0)
            } else {
                return Err(DesignError::new(format!(
                    "decide: operand types '{true_ty}' and '{false_ty}' do not match"
                )));
            };

            let true_input = self.add_input(block, Some(on_true.pin()));
            let false_input = self.add_input(block, Some(on_false.pin()));
            let out = self.add_output(block, Value::zero_of(&out_ty));
            paths.push(DecidePath {
                true_input: true_input.index,
                false_input: false_input.index,
                output: out.index,
                true_align,
                false_align,
            });
            outputs.push(Node::new(out, out_ty));
        }

        if let BlockKind::Decide { paths: stored } = &mut self.blocks[block].kind {
            *stored = paths;
        }
        Ok(outputs)
    }

    /// A multi-arm decide: the first arm whose condition holds wins, the
    /// default feeds the innermost false leg.
    pub fn decide_chain(&mut self, arms: &[(Node, Node)], default: Node) -> DesignResult<Node> {
        let mut result = default;
        for (condition, value) in arms.iter().rev() {
            result = self.decide(*condition, *value, result)?;
        }
        Ok(result)
    }

    /// A flat adder over any number of fixed-point summands.
    pub fn plus(&mut self, operands: &[Node]) -> DesignResult<Node> {
        self.plus_paths(&[operands.to_vec()])
            .map(|mut outs| outs.remove(0))
    }

    /// One adder block with several independent output paths.
    pub fn plus_paths(&mut self, paths: &[Vec<Node>]) -> DesignResult<Vec<Node>> {
        if paths.is_empty() || paths.iter().any(|p| p.is_empty()) {
            return Err(DesignError::new("plus: at least one summand per path"));
        }
        let block = self.insert_block("plus", BlockKind::Plus { sums: Vec::new() });

        let mut sums = Vec::with_capacity(paths.len());
        let mut outputs = Vec::with_capacity(paths.len());
        for operands in paths {
            for op in operands {
                expect_fixed(op, "plus: every summand")?;
            }
            let types: Vec<SignalType> = operands.iter().map(|op| op.ty()).collect();
            let common = common_representation(types.iter())
                .map_err(|e| DesignError::new(format!("plus: {e}")))?;
            let fraction = common.fraction().unwrap_or(0) as i32;
            let out_ty = SignalType::Fixed {
                signed: common.is_signed().unwrap_or(false),
                word_width: common.word_width().unwrap_or(1) + ceil_log2(operands.len()) as u16,
                fraction: fraction as i16,
            };

            let mut summands = Vec::with_capacity(operands.len());
            for op in operands {
                let input = self.add_input(block, Some(op.pin()));
                summands.push(Summand {
                    input: input.index,
                    align: (fraction - op.ty().fraction().unwrap_or(0) as i32) as u32,
                });
            }
            let out = self.add_output(block, zero_of_fixed(&out_ty, "plus")?);
            sums.push(Sum {
                summands,
                output: out.index,
            });
            outputs.push(Node::new(out, out_ty));
        }

        if let BlockKind::Plus { sums: stored } = &mut self.blocks[block].kind {
            *stored = sums;
        }
        Ok(outputs)
    }

    /// `a - b` as `a + (-b)`.
    pub fn minus(&mut self, a: Node, b: Node) -> DesignResult<Node> {
        let negated = self.negate(b)?;
        self.plus(&[a, negated])
    }

    /// A fixed-point multiplier over exactly two factors.
    pub fn times(&mut self, a: Node, b: Node) -> DesignResult<Node> {
        self.times_paths(&[(a, b)]).map(|mut outs| outs.remove(0))
    }

    /// One multiplier block with several independent output paths.
    pub fn times_paths(&mut self, paths: &[(Node, Node)]) -> DesignResult<Vec<Node>> {
        if paths.is_empty() {
            return Err(DesignError::new("times: at least one factor pair"));
        }
        let block = self.insert_block(
            "times",
            BlockKind::Times {
                products: Vec::new(),
            },
        );

        let mut products = Vec::with_capacity(paths.len());
        let mut outputs = Vec::with_capacity(paths.len());
        for (a, b) in paths {
            let mut word_width: i32 = 0;
            let mut signed = false;
            let mut fraction: i32 = 0;
            for factor in [a, b] {
                let (this_signed, this_width, this_fraction) =
                    expect_fixed(factor, "times: every factor")?;
                signed |= this_signed;
                fraction += this_fraction as i32;
                // A ufix<1> factor only moves the binary point.
                if this_signed || this_width > 1 {
                    word_width += this_width as i32;
                }
            }
            if word_width == 0 {
                word_width = 1;
            }

            let out_ty = SignalType::Fixed {
                signed,
                word_width: u16::try_from(word_width)
                    .map_err(|_| DesignError::new("times: product width overflows"))?,
                fraction: fraction as i16,
            };

            let in_a = self.add_input(block, Some(a.pin()));
            let in_b = self.add_input(block, Some(b.pin()));
            let out = self.add_output(block, zero_of_fixed(&out_ty, "times")?);
            products.push(Product {
                inputs: [in_a.index, in_b.index],
                output: out.index,
            });
            outputs.push(Node::new(out, out_ty));
        }

        if let BlockKind::Times { products: stored } = &mut self.blocks[block].kind {
            *stored = products;
        }
        Ok(outputs)
    }

    fn gate(&mut self, class: &str, operands: &[Node]) -> DesignResult<Node> {
        if operands.is_empty() {
            return Err(DesignError::new(format!(
                "{class}: at least one operand is required"
            )));
        }
        for op in operands {
            expect_bool(op, "logic operand")?;
        }
        let kind = match class {
            "and" => BlockKind::And { paths: Vec::new() },
            "or" => BlockKind::Or { paths: Vec::new() },
            _ => BlockKind::Xor { paths: Vec::new() },
        };
        let block = self.insert_block(class, kind);
        let mut inputs = Vec::with_capacity(operands.len());
        for op in operands {
            inputs.push(self.add_input(block, Some(op.pin())).index);
        }
        let out = self.add_output(block, Value::Bool(false));
        let path = GatePath {
            inputs,
            output: out.index,
        };
        match &mut self.blocks[block].kind {
            BlockKind::And { paths } | BlockKind::Or { paths } | BlockKind::Xor { paths } => {
                paths.push(path)
            }
            _ => {}
        }
        Ok(Node::new(out, SignalType::Bool))
    }

    /// Boolean AND over any number of operands.
    pub fn and(&mut self, operands: &[Node]) -> DesignResult<Node> {
        self.gate("and", operands)
    }

    /// Boolean OR over any number of operands.
    pub fn or(&mut self, operands: &[Node]) -> DesignResult<Node> {
        self.gate("or", operands)
    }

    /// Boolean XOR over any number of operands.
    pub fn xor(&mut self, operands: &[Node]) -> DesignResult<Node> {
        self.gate("xor", operands)
    }

    /// Boolean or bitwise complement.
    pub fn not(&mut self, input: Node) -> DesignResult<Node> {
        let ty = input.ty();
        if ty != SignalType::Bool && !ty.is_fixed() {
            return Err(DesignError::new(format!(
                "not: operand must be boolean or fixed-point, got '{ty}'"
            )));
        }
        let block = self.insert_block("not", BlockKind::Not);
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, Value::zero_of(&ty));
        Ok(Node::new(out, ty))
    }

    /// Arithmetic negation; the result is signed and one bit wider.
    pub fn negate(&mut self, input: Node) -> DesignResult<Node> {
        let (_, word_width, fraction) = expect_fixed(&input, "negate: the operand")?;
        let out_ty = SignalType::sfix(word_width + 1, fraction);
        let block = self.insert_block("negate", BlockKind::Negate);
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, zero_of_fixed(&out_ty, "negate")?);
        Ok(Node::new(out, out_ty))
    }

    fn compare(&mut self, op: CompareOp, lhs: Node, rhs: Node) -> DesignResult<Node> {
        expect_fixed(&lhs, "compare: the left operand")?;
        expect_fixed(&rhs, "compare: the right operand")?;
        let lhs_ty = lhs.ty();
        let rhs_ty = rhs.ty();
        let common = common_representation([&lhs_ty, &rhs_ty])
            .map_err(|e| DesignError::new(format!("compare: {e}")))?;
        let fraction = common.fraction().unwrap_or(0) as i32;

        let block = self.insert_block(
            op.class_name(),
            BlockKind::Compare {
                op,
                paths: Vec::new(),
            },
        );
        let in_l = self.add_input(block, Some(lhs.pin()));
        let in_r = self.add_input(block, Some(rhs.pin()));
        let out = self.add_output(block, Value::Bool(false));
        let path = ComparePath {
            lhs: in_l.index,
            rhs: in_r.index,
            output: out.index,
            lhs_align: (fraction - lhs_ty.fraction().unwrap_or(0) as i32) as u32,
            rhs_align: (fraction - rhs_ty.fraction().unwrap_or(0) as i32) as u32,
            signed: common.is_signed().unwrap_or(false),
        };
        if let BlockKind::Compare { paths, .. } = &mut self.blocks[block].kind {
            paths.push(path);
        }
        Ok(Node::new(out, SignalType::Bool))
    }

    /// `lhs == rhs` over pre-aligned fixed-point operands.
    pub fn equal(&mut self, lhs: Node, rhs: Node) -> DesignResult<Node> {
        self.compare(CompareOp::Equal, lhs, rhs)
    }

    /// `lhs != rhs`.
    pub fn not_equal(&mut self, lhs: Node, rhs: Node) -> DesignResult<Node> {
        self.compare(CompareOp::NotEqual, lhs, rhs)
    }

    /// `lhs < rhs`; signed when either operand is signed.
    pub fn less(&mut self, lhs: Node, rhs: Node) -> DesignResult<Node> {
        self.compare(CompareOp::Less, lhs, rhs)
    }

    /// `lhs <= rhs`.
    pub fn less_equal(&mut self, lhs: Node, rhs: Node) -> DesignResult<Node> {
        self.compare(CompareOp::LessEqual, lhs, rhs)
    }

    /// `lhs > rhs`.
    pub fn greater(&mut self, lhs: Node, rhs: Node) -> DesignResult<Node> {
        self.compare(CompareOp::Less, rhs, lhs)
    }

    /// Conversion rounding toward negative infinity.
    ///
    /// Fixed-point, integer, and double sources are accepted; integer and
    /// double sources support wrap-around only. Saturation is composed
    /// from min/max constants, relational blocks, and a decide chain
    /// around the wrap-around cast.
    pub fn floor_cast(&mut self, ty: SignalType, input: Node, mode: CastMode) -> DesignResult<Node> {
        let zero = zero_of_fixed(&ty, "floor_cast")?;
        match input.ty() {
            SignalType::Fixed { .. } => {}
            SignalType::Int32 | SignalType::Int64 | SignalType::Double => {
                if mode != CastMode::WrapAround {
                    return Err(DesignError::new(
                        "floor_cast: integer and double sources support wrap-around only",
                    ));
                }
            }
            other => {
                return Err(DesignError::new(format!(
                    "floor_cast: unsupported source type '{other}'"
                )))
            }
        }

        let block = self.insert_block("floor_cast", BlockKind::FloorCast);
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, zero);
        let wrapped = Node::new(out, ty);

        if mode == CastMode::Saturate {
            return self.saturate(ty, input, wrapped);
        }
        Ok(wrapped)
    }

    /// Clamps `wrapped` to the destination range based on the original
    /// (uncast) input.
    fn saturate(&mut self, ty: SignalType, input: Node, wrapped: Node) -> DesignResult<Node> {
        let template = match zero_of_fixed(&ty, "saturate")? {
            Value::Fixed(v) => v,
            _ => unreachable!(),
        };
        let min = self.constant(Value::Fixed(template.min_value()));
        let max = self.constant(Value::Fixed(template.max_value()));
        let underflows = self.less(input, min)?;
        let overflows = self.greater(input, max)?;
        self.decide_chain(&[(overflows, max), (underflows, min)], wrapped)
    }

    /// Conversion rounding to the nearest representable value (half away
    /// from floor): adds ½ ULP of the destination, then floors.
    pub fn nearest_cast(
        &mut self,
        ty: SignalType,
        input: Node,
        mode: CastMode,
    ) -> DesignResult<Node> {
        expect_fixed(&input, "nearest_cast: the operand")?;
        let dest_fraction = ty
            .fraction()
            .ok_or_else(|| DesignError::new("nearest_cast: destination must be fixed-point"))?;
        let src_fraction = input.ty().fraction().unwrap_or(0);
        if src_fraction <= dest_fraction {
            // No fractional bits are dropped, flooring is exact.
            return self.floor_cast(ty, input, mode);
        }
        let mut half = DynFix::new(false, 1, dest_fraction as i32 + 1)
            .map_err(|e| DesignError::new(format!("nearest_cast: {e}")))?;
        half.set_limb(0, 1);
        let half = self.constant(Value::Fixed(half));
        let sum = self.plus(&[input, half])?;
        // Saturation must judge the original input, not the biased sum.
        match mode {
            CastMode::WrapAround => self.floor_cast(ty, sum, CastMode::WrapAround),
            CastMode::Saturate => {
                let wrapped = self.floor_cast(ty, sum, CastMode::WrapAround)?;
                self.saturate(ty, input, wrapped)
            }
        }
    }

    /// Conversion with banker's rounding (round half to even) when both
    /// sides are fixed-point and fractional bits are dropped; otherwise
    /// equivalent to [`nearest_cast`](Design::nearest_cast).
    pub fn convergent_cast(
        &mut self,
        ty: SignalType,
        input: Node,
        mode: CastMode,
    ) -> DesignResult<Node> {
        let (_, _, src_fraction) = expect_fixed(&input, "convergent_cast: the operand")?;
        let dest_fraction = ty
            .fraction()
            .ok_or_else(|| DesignError::new("convergent_cast: destination must be fixed-point"))?;
        if src_fraction <= dest_fraction {
            return self.floor_cast(ty, input, mode);
        }

        let block = self.insert_block("convergent_cast", BlockKind::ConvergentCast);
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, zero_of_fixed(&ty, "convergent_cast")?);
        let rounded = Node::new(out, ty);
        match mode {
            CastMode::WrapAround => Ok(rounded),
            CastMode::Saturate => self.saturate(ty, input, rounded),
        }
    }

    /// Copies the bit pattern and re-canonicalizes under the destination
    /// type.
    pub fn reinterpret_cast(&mut self, ty: SignalType, input: Node) -> DesignResult<Node> {
        let src = input.ty();
        let allowed = matches!(
            (&src, &ty),
            (SignalType::Fixed { .. }, SignalType::Fixed { .. })
                | (SignalType::Fixed { .. }, SignalType::Int32)
                | (SignalType::Fixed { .. }, SignalType::Int64)
                | (SignalType::Int32, SignalType::Fixed { .. })
                | (SignalType::Int64, SignalType::Fixed { .. })
                | (SignalType::Bool, SignalType::Fixed { .. })
        );
        if !allowed {
            return Err(DesignError::new(format!(
                "reinterpret_cast: cannot reinterpret '{src}' as '{ty}'"
            )));
        }
        let initial = match ty {
            SignalType::Int32 => Value::Int32(0),
            SignalType::Int64 => Value::Int64(0),
            _ => zero_of_fixed(&ty, "reinterpret_cast")?,
        };
        let block = self.insert_block("reinterpret_cast", BlockKind::ReinterpretCast);
        self.add_input(block, Some(input.pin()));
        let out = self.add_output(block, initial);
        Ok(Node::new(out, ty))
    }

    /// Composes a bus of booleans into one fixed-point word.
    ///
    /// The bus width must equal the destination word width.
    pub fn bit_compose(&mut self, ty: SignalType, bits: &[Node]) -> DesignResult<Node> {
        let word_width = ty
            .word_width()
            .ok_or_else(|| DesignError::new("bit_compose: destination must be fixed-point"))?;
        if bits.len() != word_width as usize {
            return Err(DesignError::new(format!(
                "bit_compose: {} booleans cannot fill a {word_width}-bit word",
                bits.len()
            )));
        }
        for bit in bits {
            expect_bool(bit, "bit_compose: every bus element")?;
        }
        let block = self.insert_block("bit_compose", BlockKind::BitCompose);
        for bit in bits {
            self.add_input(block, Some(bit.pin()));
        }
        let out = self.add_output(block, zero_of_fixed(&ty, "bit_compose")?);
        Ok(Node::new(out, ty))
    }

    /// Extracts every bit of a fixed-point word as a bus of booleans.
    pub fn bit_extract(&mut self, input: Node) -> DesignResult<Vec<Node>> {
        let (_, word_width, _) = expect_fixed(&input, "bit_extract: the operand")?;
        self.bit_extract_range(input, 0, word_width as u32 - 1)
    }

    /// Extracts the bit range `first..=last` as booleans.
    pub fn bit_extract_range(
        &mut self,
        input: Node,
        first: u32,
        last: u32,
    ) -> DesignResult<Vec<Node>> {
        let (_, word_width, _) = expect_fixed(&input, "bit_extract: the operand")?;
        if first > last || last >= word_width as u32 {
            return Err(DesignError::new(format!(
                "bit_extract: bit range {first}..={last} is invalid for a {word_width}-bit word"
            )));
        }
        let block = self.insert_block(
            "bit_extract",
            BlockKind::BitExtract {
                first_bit: first,
                last_bit: last,
            },
        );
        self.add_input(block, Some(input.pin()));
        let mut outputs = Vec::with_capacity((last - first + 1) as usize);
        for _ in first..=last {
            let out = self.add_output(block, Value::Bool(false));
            outputs.push(Node::new(out, SignalType::Bool));
        }
        Ok(outputs)
    }

    /// An indexed read from a bus; emitted as a multiplexer cascade whose
    /// final arm is the last element.
    pub fn select(&mut self, bus: &[Node], index: Node) -> DesignResult<Node> {
        if bus.is_empty() {
            return Err(DesignError::new("select: the bus must not be empty"));
        }
        expect_unsigned_integer_index(&index, "select: the index")?;
        let ty = bus[0].ty();
        for element in bus {
            if element.ty() != ty {
                return Err(DesignError::new(
                    "select: all bus elements must share one type",
                ));
            }
        }
        let block = self.insert_block(
            "select",
            BlockKind::Select {
                length: bus.len() as u32,
            },
        );
        self.add_input(block, Some(index.pin()));
        for element in bus {
            self.add_input(block, Some(element.pin()));
        }
        let out = self.add_output(block, Value::zero_of(&ty));
        Ok(Node::new(out, ty))
    }

    /// A new bus equal to `bus` with `values` substituted starting at the
    /// (dynamic) index.
    pub fn replace(
        &mut self,
        bus: &[Node],
        index: Node,
        values: &[Node],
    ) -> DesignResult<Vec<Node>> {
        if bus.is_empty() || values.is_empty() || values.len() > bus.len() {
            return Err(DesignError::new(
                "replace: need a non-empty bus and at most as many replacement values",
            ));
        }
        expect_unsigned_integer_index(&index, "replace: the index")?;
        let ty = bus[0].ty();
        for element in bus.iter().chain(values) {
            if element.ty() != ty {
                return Err(DesignError::new(
                    "replace: bus and replacement values must share one type",
                ));
            }
        }
        let block = self.insert_block(
            "replace",
            BlockKind::Replace {
                length: bus.len() as u32,
                values: values.len() as u32,
            },
        );
        self.add_input(block, Some(index.pin()));
        for element in bus {
            self.add_input(block, Some(element.pin()));
        }
        for value in values {
            self.add_input(block, Some(value.pin()));
        }
        let mut outputs = Vec::with_capacity(bus.len());
        for _ in bus {
            let out = self.add_output(block, Value::zero_of(&ty));
            outputs.push(Node::new(out, ty));
        }
        Ok(outputs)
    }

    /// A dual-port memory with one cycle of output latency.
    pub fn memory(
        &mut self,
        depth: u32,
        read_address: Node,
        write_enable: Node,
        write_address: Node,
        write_data: Node,
    ) -> DesignResult<Node> {
        if depth == 0 {
            return Err(DesignError::new("memory: depth must be at least 1"));
        }
        expect_unsigned_integer_index(&read_address, "memory: the read address")?;
        expect_unsigned_integer_index(&write_address, "memory: the write address")?;
        expect_bool(&write_enable, "memory: the write enable")?;
        let ty = write_data.ty();

        let block = self.insert_block(
            "memory",
            BlockKind::Memory(MemoryState {
                depth,
                cells: vec![Value::zero_of(&ty); depth as usize],
                out: Value::zero_of(&ty),
            }),
        );
        self.add_input(block, Some(read_address.pin()));
        self.add_input(block, Some(write_enable.pin()));
        self.add_input(block, Some(write_address.pin()));
        self.add_input(block, Some(write_data.pin()));
        let out = self.add_output(block, Value::zero_of(&ty));
        Ok(Node::new(out, ty))
    }

    /// Wraps a host callable for simulation; never emitted.
    pub fn function(
        &mut self,
        inputs: &[Node],
        output_initial: Value,
        f: impl Fn(&[Value]) -> Result<Value, RuntimeError> + 'static,
    ) -> Node {
        let ty = output_initial.ty();
        let block = self.insert_block(
            "function",
            BlockKind::Function {
                func: FunctionFn(Box::new(f)),
            },
        );
        for input in inputs {
            self.add_input(block, Some(input.pin()));
        }
        let out = self.add_output(block, output_initial);
        Node::new(out, ty)
    }

    /// A debug assertion: raises a runtime error during simulation
    /// whenever the condition is false.
    pub fn assert_true(&mut self, condition: Node, message: &str) -> DesignResult<()> {
        expect_bool(&condition, "assert: the condition")?;
        let message = message.to_string();
        let checked = self.function(&[condition], Value::Bool(false), move |inputs| {
            match inputs[0].as_bool() {
                Some(true) => Ok(Value::Bool(true)),
                _ => Err(RuntimeError::new(message.clone())),
            }
        });
        self.terminate(checked);
        Ok(())
    }

    /// Attaches a port-naming label to a single node.
    pub fn label(&mut self, input: Node, class: &str, name: &str) {
        let block = self.insert_block(
            "label",
            BlockKind::Label {
                is_bus: false,
                class: class.to_string(),
                label: name.to_string(),
            },
        );
        self.add_input(block, Some(input.pin()));
    }

    /// Attaches a port-naming label to a complete bus.
    pub fn label_bus(&mut self, inputs: &[Node], class: &str, name: &str) {
        let block = self.insert_block(
            "label",
            BlockKind::Label {
                is_bus: true,
                class: class.to_string(),
                label: name.to_string(),
            },
        );
        for input in inputs {
            self.add_input(block, Some(input.pin()));
        }
    }

    /// Names a node as a module input port.
    pub fn input_name(&mut self, input: Node, name: &str) {
        self.label(input, "input", name);
    }

    /// Names a node as a module output port.
    pub fn output_name(&mut self, input: Node, name: &str) {
        self.label(input, "output", name);
    }

    /// Consumes an otherwise-unused node.
    pub fn terminate(&mut self, input: Node) {
        let block = self.insert_block("terminate", BlockKind::Terminate);
        self.add_input(block, Some(input.pin()));
    }

    /// Reserves flip-flops that survive elaboration without connections.
    pub fn spare(&mut self, count: u32) -> BlockId {
        self.insert_block("spare", BlockKind::Spare { count })
    }

    /// A testbench-driven value, written with
    /// [`Design::set_signal`].
    pub fn signal(&mut self, initial: Value) -> (Node, BlockId) {
        let ty = initial.ty();
        let block = self.insert_block(
            "signal",
            BlockKind::Signal {
                value: initial.clone(),
            },
        );
        let out = self.add_output(block, initial);
        (Node::new(out, ty), block)
    }

    /// A testbench observation point. The current value is read with
    /// [`Design::read`].
    pub fn probe(&mut self, input: Node) -> BlockId {
        let block = self.insert_block("probe", BlockKind::Probe);
        self.add_input(block, Some(input.pin()));
        block
    }

    /// Reads the current simulated value of a node.
    pub fn read(&self, node: Node) -> &Value {
        self.pin_value(node.pin())
    }

    /// A testbench data source emitting one bus element set per enabled
    /// clock.
    pub fn source(
        &mut self,
        ty: SignalType,
        width: usize,
        read_enable: Node,
    ) -> DesignResult<SourceHandle> {
        if width == 0 {
            return Err(DesignError::new("source: the bus width must be at least 1"));
        }
        expect_bool(&read_enable, "source: the read enable")?;
        let block = self.insert_block(
            "source",
            BlockKind::Source(SourceState {
                data: Vec::new(),
                pos: 0,
                periodic: false,
                current: vec![Value::zero_of(&ty); width],
                ready: false,
            }),
        );
        self.add_input(block, Some(read_enable.pin()));
        let mut data = Vec::with_capacity(width);
        for _ in 0..width {
            let out = self.add_output(block, Value::zero_of(&ty));
            data.push(Node::new(out, ty));
        }
        let ready_pin = self.add_output(block, Value::Bool(false));
        Ok(SourceHandle {
            data,
            ready: Node::new(ready_pin, SignalType::Bool),
            block,
        })
    }

    /// A testbench data sink appending one element per enabled clock.
    pub fn sink(&mut self, data: Node, enable: Node) -> DesignResult<BlockId> {
        expect_bool(&enable, "sink: the enable")?;
        let block = self.insert_block("sink", BlockKind::Sink(SinkState::default()));
        self.add_input(block, Some(data.pin()));
        self.add_input(block, Some(enable.pin()));
        Ok(block)
    }

    /// A clocked uniform random source with a deterministic seed.
    pub fn random(&mut self, ty: SignalType, seed: u64) -> DesignResult<Node> {
        if ty != SignalType::Bool && !ty.is_fixed() {
            return Err(DesignError::new(format!(
                "random: unsupported type '{ty}'"
            )));
        }
        let block = self.insert_block(
            "random",
            BlockKind::Random(RandomState {
                rng: StdRng::seed_from_u64(seed),
                seed,
                current: Value::zero_of(&ty),
            }),
        );
        let out = self.add_output(block, Value::zero_of(&ty));
        Ok(Node::new(out, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_width_follows_common_representation() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(8, 2), 1.0).unwrap();
        let b = design.constant_f64(SignalType::ufix(6, 4), 1.0).unwrap();
        let sum = design.plus(&[a, b]).unwrap();
        // common = ufix<10,4>, two summands add one bit
        assert_eq!(sum.ty(), SignalType::ufix(11, 4));
    }

    #[test]
    fn plus_rejects_non_fixed() {
        let mut design = Design::new();
        let a = design.constant(Value::Bool(true));
        assert!(design.plus(&[a]).is_err());
    }

    #[test]
    fn times_width_sums_operands() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::sfix(8, 4), 1.0).unwrap();
        let b = design.constant_f64(SignalType::ufix(6, 2), 1.0).unwrap();
        let product = design.times(a, b).unwrap();
        assert_eq!(product.ty(), SignalType::sfix(14, 6));
    }

    #[test]
    fn times_one_bit_unsigned_factor_adds_no_width() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::sfix(8, 4), 1.0).unwrap();
        let b = design.constant_f64(SignalType::ufix(1, 3), 0.0).unwrap();
        let product = design.times(a, b).unwrap();
        assert_eq!(product.ty(), SignalType::sfix(8, 7));
    }

    #[test]
    fn decide_aligns_fixed_operands() {
        let mut design = Design::new();
        let c = design.constant(Value::Bool(true));
        let t = design.constant_f64(SignalType::ufix(8, 0), 3.0).unwrap();
        let f = design.constant_f64(SignalType::ufix(4, 2), 1.25).unwrap();
        let out = design.decide(c, t, f).unwrap();
        assert_eq!(out.ty(), SignalType::ufix(10, 2));
    }

    #[test]
    fn decide_rejects_mismatched_classes() {
        let mut design = Design::new();
        let c = design.constant(Value::Bool(true));
        let t = design.constant(Value::Bool(true));
        let f = design.constant(Value::Int32(1));
        assert!(design.decide(c, t, f).is_err());
    }

    #[test]
    fn negate_widens_and_signs() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(8, 0), 5.0).unwrap();
        let n = design.negate(a).unwrap();
        assert_eq!(n.ty(), SignalType::sfix(9, 0));
    }

    #[test]
    fn bit_compose_checks_width() {
        let mut design = Design::new();
        let bits: Vec<Node> = (0..4).map(|_| design.constant(Value::Bool(true))).collect();
        assert!(design.bit_compose(SignalType::ufix(5, 0), &bits).is_err());
        assert!(design.bit_compose(SignalType::ufix(4, 0), &bits).is_ok());
    }

    #[test]
    fn select_validates_index_type() {
        let mut design = Design::new();
        let bus: Vec<Node> = (0..4)
            .map(|i| design.constant_f64(SignalType::ufix(8, 0), i as f64).unwrap())
            .collect();
        let bad_index = design.constant_f64(SignalType::sfix(4, 0), 1.0).unwrap();
        assert!(design.select(&bus, bad_index).is_err());
        let index = design.constant_f64(SignalType::ufix(2, 0), 1.0).unwrap();
        assert!(design.select(&bus, index).is_ok());
    }

    #[test]
    fn delay_bus_requires_uniform_type() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(4, 0), 1.0).unwrap();
        let b = design.constant(Value::Bool(false));
        assert!(design.delay_bus(&[a, b], None).is_err());
    }

    #[test]
    fn ceil_log2_values() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(5), 3);
    }

    #[test]
    fn gate_rejects_fixed_operands() {
        let mut design = Design::new();
        let a = design.constant_f64(SignalType::ufix(4, 0), 1.0).unwrap();
        assert!(design.and(&[a]).is_err());
    }
}
