//! Evaluation, clocked stepping, and asynchronous reset.
//!
//! [`evaluate`] reads the current driver values of a block's inputs and
//! writes new values to its output slots; it is pure with respect to block
//! state. [`step`] advances the registered state of a clocked block after
//! all combinational evaluation has settled, so no clocked block observes
//! another's new register value within the same step. [`async_reset`]
//! restores the reset state.

use crate::arena::Arena;
use crate::block::{Block, BlockKind, CompareOp};
use crate::design::Design;
use crate::ids::BlockId;
use crate::value::{Value, ValueStore};
use ferro_common::RuntimeError;
use ferro_fixed::{DynFix, SignalType, MAX_LIMBS};
use rand::Rng;
use std::cmp::Ordering;

fn input_value(
    blocks: &Arena<BlockId, Block>,
    values: &ValueStore,
    block: &Block,
    index: usize,
) -> Result<Value, RuntimeError> {
    let driver = block.inputs[index]
        .driver
        .ok_or_else(|| RuntimeError::new(format!("block '{}' has an unconnected input", block.name)))?;
    let slot = blocks[driver.block].outputs[driver.index as usize].slot;
    Ok(values.get(slot).clone())
}

fn input_bool(
    blocks: &Arena<BlockId, Block>,
    values: &ValueStore,
    block: &Block,
    index: usize,
) -> Result<bool, RuntimeError> {
    input_value(blocks, values, block, index)?
        .as_bool()
        .ok_or_else(|| RuntimeError::new(format!("block '{}' expected a boolean input", block.name)))
}

fn input_fixed(
    blocks: &Arena<BlockId, Block>,
    values: &ValueStore,
    block: &Block,
    index: usize,
) -> Result<DynFix, RuntimeError> {
    match input_value(blocks, values, block, index)? {
        Value::Fixed(v) => Ok(v),
        other => Err(RuntimeError::new(format!(
            "block '{}' expected a fixed-point input, got '{}'",
            block.name,
            other.ty()
        ))),
    }
}

/// Any source value coerced to fixed-point for the cast family.
fn input_as_fixed(
    blocks: &Arena<BlockId, Block>,
    values: &ValueStore,
    block: &Block,
    index: usize,
) -> Result<DynFix, RuntimeError> {
    match input_value(blocks, values, block, index)? {
        Value::Fixed(v) => Ok(v),
        Value::Int32(v) => Ok(DynFix::from_i32(v)),
        Value::Int64(v) => Ok(DynFix::from_i64(v)),
        Value::Double(v) => Ok(DynFix::from_f64(v)),
        Value::Bool(_) => Err(RuntimeError::new(format!(
            "block '{}' cannot cast a boolean input",
            block.name
        ))),
    }
}

fn index_value(v: &DynFix, name: &str) -> Result<u64, RuntimeError> {
    v.to_i64()
        .map(|i| i as u64)
        .map_err(|e| RuntimeError::new(format!("block '{name}': bad index: {e}")))
}

fn bit(limbs: &[u32; MAX_LIMBS], index: u32) -> bool {
    (limbs[(index / 32) as usize] >> (index % 32)) & 1 != 0
}

fn any_bit_below(limbs: &[u32; MAX_LIMBS], index: u32) -> bool {
    (0..index).any(|i| bit(limbs, i))
}

fn add_one_ulp(value: &mut DynFix) {
    let mut one = *value;
    for i in 0..MAX_LIMBS {
        one.set_limb(i, 0);
    }
    one.set_limb(0, 1);
    one.accumulate_shift_left(value, 0);
    value.wrap_around();
}

fn zero_of_output(block: &Block, index: usize) -> DynFix {
    DynFix::zero_of(&block.outputs[index].ty)
}

/// Evaluates one block: reads driver values, writes the block's output
/// slots.
pub fn evaluate(
    blocks: &Arena<BlockId, Block>,
    id: BlockId,
    values: &mut ValueStore,
) -> Result<(), RuntimeError> {
    let block = &blocks[id];
    match &block.kind {
        BlockKind::Identity => {
            let v = input_value(blocks, values, block, 0)?;
            values.set(block.outputs[0].slot, v);
        }

        BlockKind::Delay { state, .. } => {
            for (i, v) in state.iter().enumerate() {
                values.set(block.outputs[i].slot, v.clone());
            }
        }

        BlockKind::Decide { paths } => {
            let decision = input_bool(blocks, values, block, 0)?;
            for path in paths {
                let (chosen, align) = if decision {
                    (path.true_input, path.true_align)
                } else {
                    (path.false_input, path.false_align)
                };
                let out_index = path.output as usize;
                let result = match input_value(blocks, values, block, chosen as usize)? {
                    Value::Fixed(v) => {
                        let mut out = zero_of_output(block, out_index);
                        v.shift_left_into(&mut out, align);
                        out.wrap_around();
                        Value::Fixed(out)
                    }
                    other => other,
                };
                values.set(block.outputs[out_index].slot, result);
            }
        }

        BlockKind::Plus { sums } => {
            for sum in sums {
                let out_index = sum.output as usize;
                let mut acc = zero_of_output(block, out_index);
                let mut summands = sum.summands.iter();
                if let Some(first) = summands.next() {
                    let v = input_fixed(blocks, values, block, first.input as usize)?;
                    v.shift_left_into(&mut acc, first.align);
                }
                for summand in summands {
                    let v = input_fixed(blocks, values, block, summand.input as usize)?;
                    v.accumulate_shift_left(&mut acc, summand.align);
                }
                acc.wrap_around();
                values.set(block.outputs[out_index].slot, Value::Fixed(acc));
            }
        }

        BlockKind::Times { products } => {
            for product in products {
                let factor1 = input_fixed(blocks, values, block, product.inputs[0] as usize)?;
                let factor2 = input_fixed(blocks, values, block, product.inputs[1] as usize)?;
                let out_index = product.output as usize;
                let mut out = zero_of_output(block, out_index);
                factor1.multiply_unsigned_into(&mut out, factor2.limbs()[0]);
                for j in 1..MAX_LIMBS - 1 {
                    factor1.accumulate_multiply_unsigned(&mut out, factor2.limbs()[j], j);
                }
                if factor2.is_signed() {
                    factor1.accumulate_multiply_signed(
                        &mut out,
                        factor2.limbs()[MAX_LIMBS - 1] as i32,
                        MAX_LIMBS - 1,
                    );
                } else {
                    factor1.accumulate_multiply_unsigned(
                        &mut out,
                        factor2.limbs()[MAX_LIMBS - 1],
                        MAX_LIMBS - 1,
                    );
                }
                out.wrap_around();
                values.set(block.outputs[out_index].slot, Value::Fixed(out));
            }
        }

        BlockKind::And { paths } | BlockKind::Or { paths } | BlockKind::Xor { paths } => {
            let is_and = matches!(block.kind, BlockKind::And { .. });
            let is_or = matches!(block.kind, BlockKind::Or { .. });
            for path in paths {
                let mut acc = is_and;
                for (i, input) in path.inputs.iter().enumerate() {
                    let v = input_bool(blocks, values, block, *input as usize)?;
                    acc = if is_and {
                        acc && v
                    } else if is_or {
                        acc || v
                    } else if i == 0 {
                        v
                    } else {
                        acc ^ v
                    };
                }
                values.set(block.outputs[path.output as usize].slot, Value::Bool(acc));
            }
        }

        BlockKind::Compare { op, paths } => {
            for path in paths {
                let lhs = input_fixed(blocks, values, block, path.lhs as usize)?;
                let rhs = input_fixed(blocks, values, block, path.rhs as usize)?;
                let wide = SignalType::Fixed {
                    signed: path.signed,
                    word_width: (MAX_LIMBS * 32) as u16,
                    fraction: 0,
                };
                let mut l = DynFix::zero_of(&wide);
                let mut r = DynFix::zero_of(&wide);
                lhs.shift_left_into(&mut l, path.lhs_align);
                rhs.shift_left_into(&mut r, path.rhs_align);

                let result = match op {
                    CompareOp::Equal => l.compare_equal(&r),
                    CompareOp::NotEqual => !l.compare_equal(&r),
                    CompareOp::Less | CompareOp::LessEqual => {
                        let ordering = if path.signed {
                            l.compare_signed(&r)
                        } else {
                            l.compare_unsigned(&r)
                        };
                        match op {
                            CompareOp::Less => ordering == Ordering::Less,
                            _ => ordering != Ordering::Greater,
                        }
                    }
                };
                values.set(block.outputs[path.output as usize].slot, Value::Bool(result));
            }
        }

        BlockKind::Negate => {
            let v = input_fixed(blocks, values, block, 0)?;
            let mut out = zero_of_output(block, 0);
            v.negate_into(&mut out);
            out.wrap_around();
            values.set(block.outputs[0].slot, Value::Fixed(out));
        }

        BlockKind::Not => match input_value(blocks, values, block, 0)? {
            Value::Bool(b) => values.set(block.outputs[0].slot, Value::Bool(!b)),
            Value::Fixed(v) => {
                let mut out = zero_of_output(block, 0);
                v.not_into(&mut out);
                out.wrap_around();
                values.set(block.outputs[0].slot, Value::Fixed(out));
            }
            other => {
                return Err(RuntimeError::new(format!(
                    "block '{}' cannot complement a '{}'",
                    block.name,
                    other.ty()
                )))
            }
        },

        BlockKind::FloorCast => {
            for index in 0..block.outputs.len() {
                let source = input_as_fixed(blocks, values, block, index)?;
                let mut out = zero_of_output(block, index);
                out.assign_aligned(&source);
                values.set(block.outputs[index].slot, Value::Fixed(out));
            }
        }

        BlockKind::ConvergentCast => {
            for index in 0..block.outputs.len() {
                let source = input_fixed(blocks, values, block, index)?;
                let mut out = zero_of_output(block, index);
                let shift = source.fraction() as i32 - out.fraction() as i32;
                out.assign_aligned(&source);
                if shift > 0 {
                    let shift = shift as u32;
                    let half_bit = bit(source.limbs(), shift - 1);
                    let below = any_bit_below(source.limbs(), shift - 1);
                    let odd = out.limbs()[0] & 1 != 0;
                    if half_bit && (below || odd) {
                        add_one_ulp(&mut out);
                    }
                }
                values.set(block.outputs[index].slot, Value::Fixed(out));
            }
        }

        BlockKind::ReinterpretCast => {
            for index in 0..block.outputs.len() {
                let source = match input_value(blocks, values, block, index)? {
                    Value::Fixed(v) => *v.limbs(),
                    Value::Int32(v) => {
                        let wide = v as i64;
                        [
                            (wide & 0xffff_ffff) as u32,
                            ((wide >> 32) & 0xffff_ffff) as u32,
                            if v < 0 { u32::MAX } else { 0 },
                            if v < 0 { u32::MAX } else { 0 },
                        ]
                    }
                    Value::Int64(v) => [
                        (v & 0xffff_ffff) as u32,
                        ((v >> 32) & 0xffff_ffff) as u32,
                        if v < 0 { u32::MAX } else { 0 },
                        if v < 0 { u32::MAX } else { 0 },
                    ],
                    Value::Bool(b) => [u32::from(b), 0, 0, 0],
                    other => {
                        return Err(RuntimeError::new(format!(
                            "block '{}' cannot reinterpret a '{}'",
                            block.name,
                            other.ty()
                        )))
                    }
                };
                let result = match block.outputs[index].ty {
                    SignalType::Int32 => Value::Int32(source[0] as i32),
                    SignalType::Int64 => {
                        Value::Int64((((source[1] as i32) as i64) << 32) | source[0] as i64)
                    }
                    _ => {
                        let mut out = zero_of_output(block, index);
                        for (i, limb) in source.iter().enumerate() {
                            out.set_limb(i, *limb);
                        }
                        out.wrap_around();
                        Value::Fixed(out)
                    }
                };
                values.set(block.outputs[index].slot, result);
            }
        }

        BlockKind::BitCompose => {
            let mut out = zero_of_output(block, 0);
            for index in 0..block.inputs.len() {
                if input_bool(blocks, values, block, index)? {
                    let limb = out.limbs()[index / 32] | 1 << (index % 32);
                    out.set_limb(index / 32, limb);
                }
            }
            out.wrap_around();
            values.set(block.outputs[0].slot, Value::Fixed(out));
        }

        BlockKind::BitExtract { first_bit, .. } => {
            let source = input_fixed(blocks, values, block, 0)?;
            for (j, output) in block.outputs.iter().enumerate() {
                values.set(
                    output.slot,
                    Value::Bool(bit(source.limbs(), first_bit + j as u32)),
                );
            }
        }

        BlockKind::Select { length } => {
            let index = input_fixed(blocks, values, block, 0)?;
            let index = index_value(&index, &block.name)?;
            // The emitted multiplexer cascade defaults to the last element.
            let chosen = (index as usize).min(*length as usize - 1);
            let v = input_value(blocks, values, block, 1 + chosen)?;
            values.set(block.outputs[0].slot, v);
        }

        BlockKind::Replace { length, values: m } => {
            let index = input_fixed(blocks, values, block, 0)?;
            let index = index_value(&index, &block.name)? as usize;
            for i in 0..*length as usize {
                let take_replacement = i >= index && i < index + *m as usize;
                let v = if take_replacement {
                    input_value(blocks, values, block, 1 + *length as usize + (i - index))?
                } else {
                    input_value(blocks, values, block, 1 + i)?
                };
                values.set(block.outputs[i].slot, v);
            }
        }

        BlockKind::Memory(state) => {
            values.set(block.outputs[0].slot, state.out.clone());
        }

        BlockKind::Function { func } => {
            let mut inputs = Vec::with_capacity(block.inputs.len());
            for index in 0..block.inputs.len() {
                inputs.push(input_value(blocks, values, block, index)?);
            }
            let result = (func.0)(&inputs)?;
            values.set(block.outputs[0].slot, result);
        }

        BlockKind::Signal { value } => {
            values.set(block.outputs[0].slot, value.clone());
        }

        BlockKind::Source(state) => {
            let width = state.current.len();
            if state.ready {
                for (i, v) in state.current.iter().enumerate() {
                    values.set(block.outputs[i].slot, v.clone());
                }
            } else {
                for i in 0..width {
                    let zero = Value::zero_of(&block.outputs[i].ty);
                    values.set(block.outputs[i].slot, zero);
                }
            }
            values.set(block.outputs[width].slot, Value::Bool(state.ready));
        }

        BlockKind::Random(state) => {
            values.set(block.outputs[0].slot, state.current.clone());
        }

        // Blocks with can_evaluate() == false are never scheduled.
        BlockKind::Temporary
        | BlockKind::Constant
        | BlockKind::Label { .. }
        | BlockKind::Terminate
        | BlockKind::Probe
        | BlockKind::Spare { .. }
        | BlockKind::Sink(_) => {}
    }
    Ok(())
}

fn random_value(rng: &mut rand::rngs::StdRng, ty: &SignalType) -> Value {
    match ty {
        SignalType::Bool => Value::Bool(rng.gen()),
        SignalType::Fixed { .. } => {
            let mut v = DynFix::zero_of(ty);
            for i in 0..MAX_LIMBS {
                v.set_limb(i, rng.gen());
            }
            v.wrap_around();
            Value::Fixed(v)
        }
        _ => Value::zero_of(ty),
    }
}

/// Advances the registered state of a clocked block.
///
/// Returns `true` when the block's outputs will change, so the simulator
/// can mark the containing component dirty.
pub fn step(design: &mut Design, id: BlockId) -> Result<bool, RuntimeError> {
    // Capture the settled input values before touching block state.
    let block = &design.blocks[id];
    let mut inputs = Vec::with_capacity(block.inputs.len());
    for index in 0..block.inputs.len() {
        if block.inputs[index].driver.is_some() {
            inputs.push(Some(input_value(
                &design.blocks,
                &design.values,
                block,
                index,
            )?));
        } else {
            inputs.push(None);
        }
    }

    let name = design.blocks[id].name.clone();
    let require = |v: &Option<Value>, what: &str| -> Result<Value, RuntimeError> {
        v.clone()
            .ok_or_else(|| RuntimeError::new(format!("block '{name}': unconnected {what} input")))
    };

    match &mut design.blocks[id].kind {
        BlockKind::Delay { state, has_enable } => {
            let enabled = if *has_enable {
                require(&inputs[state.len()], "clock-enable")?
                    .as_bool()
                    .unwrap_or(false)
            } else {
                true
            };
            if !enabled {
                return Ok(false);
            }
            let mut changed = false;
            for i in 0..state.len() {
                let next = require(&inputs[i], "data")?;
                if state[i] != next {
                    state[i] = next;
                    changed = true;
                }
            }
            Ok(changed)
        }

        BlockKind::Memory(state) => {
            let read_address = require(&inputs[0], "read-address")?;
            let write_enable = require(&inputs[1], "write-enable")?;
            if write_enable.as_bool().unwrap_or(false) {
                let write_address = require(&inputs[2], "write-address")?;
                let address = match write_address {
                    Value::Fixed(v) => index_value(&v, &name)?,
                    _ => return Err(RuntimeError::new(format!("block '{name}': bad address"))),
                } as usize;
                if address >= state.depth as usize {
                    return Err(RuntimeError::new(format!(
                        "block '{name}': write address {address} out of range (depth {})",
                        state.depth
                    )));
                }
                state.cells[address] = require(&inputs[3], "write-data")?;
            }
            let address = match read_address {
                Value::Fixed(v) => index_value(&v, &name)?,
                _ => return Err(RuntimeError::new(format!("block '{name}': bad address"))),
            } as usize;
            if address >= state.depth as usize {
                return Err(RuntimeError::new(format!(
                    "block '{name}': read address {address} out of range (depth {})",
                    state.depth
                )));
            }
            let next = state.cells[address].clone();
            let changed = state.out != next;
            state.out = next;
            Ok(changed)
        }

        BlockKind::Source(state) => {
            let enabled = require(&inputs[0], "read-enable")?.as_bool().unwrap_or(false);
            if enabled {
                state.read_next();
                Ok(true)
            } else {
                Ok(false)
            }
        }

        BlockKind::Sink(state) => {
            let enabled = require(&inputs[1], "enable")?.as_bool().unwrap_or(false);
            if enabled {
                state.data.push(require(&inputs[0], "data")?);
            }
            Ok(false)
        }

        BlockKind::Random(state) => {
            let ty = state.current.ty();
            state.current = random_value(&mut state.rng, &ty);
            Ok(true)
        }

        _ => Ok(false),
    }
}

/// Restores a clocked block's reset state and reports whether downstream
/// values change.
pub fn async_reset(design: &mut Design, id: BlockId) {
    match &mut design.blocks[id].kind {
        BlockKind::Delay { state, .. } => {
            for v in state.iter_mut() {
                *v = Value::zero_of(&v.ty());
            }
        }
        BlockKind::Memory(state) => {
            state.out = Value::zero_of(&state.out.ty());
        }
        BlockKind::Source(state) => {
            state.pos = 0;
            state.read_next();
        }
        BlockKind::Sink(state) => {
            state.data.clear();
        }
        BlockKind::Random(state) => {
            state.rng = rand::SeedableRng::seed_from_u64(state.seed);
            let ty = state.current.ty();
            state.current = random_value(&mut state.rng, &ty);
        }
        _ => {}
    }
}
