//! A source that emits one element every N cycles.

use ferro_common::{DesignError, DesignResult};
use ferro_fixed::{DynFix, SignalType};
use ferro_ir::{BlockId, CastMode, Design, ForwardNode, Node, Value};

/// A rate-limited data source.
///
/// Wraps the plain source with a modulo-`period` counter on its read
/// enable, so one element is consumed every `period` cycles. `valid` is
/// high on the cycles carrying fresh data.
#[derive(Debug, Clone, Copy)]
pub struct ThrottledSource {
    /// The emitted element.
    pub data: Node,
    /// High when `data` carries a fresh element.
    pub valid: Node,
    /// The underlying source block, for
    /// [`Design::set_source_data`].
    pub block: BlockId,
}

impl ThrottledSource {
    /// Builds a throttled source of the given element type and period.
    pub fn build(design: &mut Design, ty: SignalType, period: u32) -> DesignResult<ThrottledSource> {
        if period == 0 {
            return Err(DesignError::new("throttled source: period must be at least 1"));
        }

        let enable = if period == 1 {
            design.constant(Value::Bool(true))
        } else {
            let mut width = 1u16;
            let mut temp = period - 1;
            while temp / 2 > 0 {
                width += 1;
                temp /= 2;
            }
            let counter_ty = SignalType::ufix(width + 1, 0);

            let counter = ForwardNode::new(design, counter_ty)?;
            let zero = design.constant(Value::Fixed(DynFix::from_i64(0)));
            let one = design.constant(Value::Fixed(DynFix::from_i64(1)));
            let limit = design.constant(Value::Fixed(DynFix::from_i64(period as i64 - 1)));

            let at_limit = design.equal(counter.node(), limit)?;
            let incremented = design.plus(&[counter.node(), one])?;
            let incremented = design.floor_cast(counter_ty, incremented, CastMode::WrapAround)?;
            let wrapped = design.decide(at_limit, zero, incremented)?;
            let wrapped = design.floor_cast(counter_ty, wrapped, CastMode::WrapAround)?;
            let next = design.delay(wrapped);
            let bound = counter.bind(design, next)?;

            let zero_again = design.constant(Value::Fixed(DynFix::from_i64(0)));
            design.equal(bound, zero_again)?
        };

        let source = design.source(ty, 1, enable)?;
        let valid = design.and(&[source.ready, enable])?;
        Ok(ThrottledSource {
            data: source.data[0],
            valid,
            block: source.block,
        })
    }
}
