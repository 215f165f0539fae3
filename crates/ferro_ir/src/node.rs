//! User-facing handles on output pins.

use crate::block::BlockKind;
use crate::design::Design;
use crate::ids::BlockId;
use crate::pin::OutPin;
use crate::value::Value;
use ferro_common::{DesignError, DesignResult};
use ferro_fixed::SignalType;

/// A lightweight reference to an output pin plus its static type.
///
/// Nodes are freely copyable; they do not own anything. A node whose pin
/// belongs to a placeholder block is *temporary* until the corresponding
/// [`ForwardNode`] is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pin: OutPin,
    ty: SignalType,
}

impl Node {
    /// Creates a handle from a pin and its declared type.
    pub fn new(pin: OutPin, ty: SignalType) -> Self {
        Self { pin, ty }
    }

    /// The referenced output pin.
    pub fn pin(&self) -> OutPin {
        self.pin
    }

    /// The static signal type.
    pub fn ty(&self) -> SignalType {
        self.ty
    }
}

/// A handle that permits exactly one deferred assignment.
///
/// A forward node starts out referring to a just-created placeholder pin.
/// Consumers may connect against it immediately; the first (and only)
/// [`bind`](ForwardNode::bind) rewires every consumer of the placeholder
/// to the real driver. Binding consumes the handle, so a second assignment
/// is impossible by construction.
#[derive(Debug)]
pub struct ForwardNode {
    node: Node,
    block: BlockId,
}

impl ForwardNode {
    /// Creates a forward node of the given type.
    ///
    /// The type must be known; placeholders cannot be retyped later.
    pub fn new(design: &mut Design, ty: SignalType) -> DesignResult<Self> {
        if !ty.is_known() {
            return Err(DesignError::new(
                "a forward node requires a known signal type",
            ));
        }
        let block = design.insert_block("temporary", BlockKind::Temporary);
        let pin = design.add_output(block, Value::zero_of(&ty));
        Ok(Self {
            node: Node::new(pin, ty),
            block,
        })
    }

    /// The node consumers connect against before binding.
    pub fn node(&self) -> Node {
        self.node
    }

    /// Binds the forward node to its real driver.
    ///
    /// All consumers created against the placeholder are rewired to the
    /// source pin. The types must match exactly.
    pub fn bind(self, design: &mut Design, source: Node) -> DesignResult<Node> {
        if source.ty() != self.node.ty() {
            return Err(DesignError::new(format!(
                "forward node of type '{}' cannot be driven by a node of type '{}'",
                self.node.ty(),
                source.ty()
            )));
        }
        if source.pin().block == self.block {
            return Err(DesignError::new(
                "a forward node cannot be bound to itself",
            ));
        }

        let targets = design.blocks[self.block].outputs[0].targets.clone();
        for target in targets {
            design.connect(target, source.pin());
        }
        Ok(source)
    }
}
