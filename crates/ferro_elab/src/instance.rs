//! Instances: the per-module records of the elaborated IR, and their
//! structural hash.

use crate::entity::{EntityId, InstanceId};
use serde::{Deserialize, Serialize};

/// One instance of the design hierarchy; after unification, surviving
/// instances become emitted modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    /// The enclosing instance.
    pub parent: Option<InstanceId>,
    /// Creation order of the originating hierarchy level.
    pub sequence: u32,
    /// Instance name.
    pub name: String,
    /// Module name supplied by the user; may contain `%Hash%` and a
    /// leading `!` model marker.
    pub user_module_name: String,
    /// Final module name after unification and clash resolution.
    pub module_name: String,
    /// Models are emitted into a separate directory.
    pub is_model: bool,
    /// Set when this instance was unified into a surviving duplicate.
    pub unified_with: Option<InstanceId>,
    /// Entities of this instance, in creation order.
    pub entities: Vec<EntityId>,
    /// References to `input_port` entities.
    pub input_ports: Vec<EntityId>,
    /// References to `output_port` entities.
    pub output_ports: Vec<EntityId>,
    /// Creation counter for entity indices; keeps counting past removals
    /// so structural comparison sees stable positions.
    pub next_entity_index: u32,
}

impl Instance {
    /// Creates an empty instance.
    pub fn new(
        sequence: u32,
        name: impl Into<String>,
        user_module_name: impl Into<String>,
        parent: Option<InstanceId>,
    ) -> Self {
        Self {
            parent,
            sequence,
            name: name.into(),
            user_module_name: user_module_name.into(),
            module_name: String::new(),
            is_model: false,
            unified_with: None,
            entities: Vec::new(),
            input_ports: Vec::new(),
            output_ports: Vec::new(),
            next_entity_index: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_instance_is_empty() {
        let instance = Instance::new(3, "core", "Core", None);
        assert_eq!(instance.sequence, 3);
        assert!(instance.entities.is_empty());
        assert!(instance.unified_with.is_none());
        assert!(!instance.is_model);
    }

    #[test]
    fn serde_roundtrip() {
        let instance = Instance::new(1, "a", "!Model%Hash%", Some(InstanceId::from_raw(0)));
        let json = serde_json::to_string(&instance).unwrap();
        let back: Instance = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_module_name, "!Model%Hash%");
        assert_eq!(back.parent, Some(InstanceId::from_raw(0)));
    }
}
