//! The typed block-graph intermediate representation of a Ferro design.
//!
//! A [`Design`] owns every [`Block`] in an arena; blocks own their typed
//! input and output pins; output pins hold the simulated value of their
//! signal (as a slot in the design's [`ValueStore`]) and the list of input
//! pins they drive. Hierarchy levels form a tree of named scopes that the
//! elaborator later turns into modules.
//!
//! The block catalogue is the closed [`BlockKind`] enum; evaluation,
//! clocked stepping, and the remaining block contract are dispatched by
//! matching on the variant.

#![warn(missing_docs)]

pub mod arena;
pub mod block;
pub mod build;
pub mod design;
pub mod eval;
pub mod hierarchy;
pub mod ids;
pub mod node;
pub mod pin;
pub mod props;
pub mod value;

pub use arena::{Arena, ArenaId};
pub use block::{Block, BlockKind};
pub use build::{CastMode, SourceHandle};
pub use design::Design;
pub use hierarchy::{Hierarchy, HierarchyLevel};
pub use ids::{BlockId, LevelId, SlotId};
pub use node::{ForwardNode, Node};
pub use pin::{InPin, InputPin, OutPin, OutputPin};
pub use props::Properties;
pub use value::{Value, ValueStore};
