//! The tree of named scopes a design is built inside.
//!
//! Each level has a name, a module name used for code emission, and the
//! usual parent / first-child / next-sibling links. Entering and leaving a
//! scope moves the current-level pointer; every block records the level it
//! was created in.

use crate::ids::LevelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One named scope in the design tree; becomes a module after elaboration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyLevel {
    /// Creation order across the whole tree.
    pub sequence: u32,
    /// Instance name of the level.
    pub name: String,
    /// Module name used for code emission; may contain `%Hash%` and a
    /// leading `!` model marker.
    pub module_name: String,
    /// The enclosing level.
    pub parent: Option<LevelId>,
    /// First child level.
    pub first_child: Option<LevelId>,
    /// Next sibling level.
    pub next_sibling: Option<LevelId>,
    counters: HashMap<String, u32>,
}

impl HierarchyLevel {
    /// Generates a block name unique within this level: `prefix1`,
    /// `prefix2`, ...
    pub fn generate_block_name(&mut self, prefix: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{prefix}{counter}")
    }
}

/// The tree of hierarchy levels plus the current-level pointer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hierarchy {
    levels: Vec<HierarchyLevel>,
    current: LevelId,
    root: LevelId,
}

impl Hierarchy {
    /// Creates a hierarchy with a root level of the given instance and
    /// module name.
    pub fn new(name: &str, module_name: &str) -> Self {
        let root = HierarchyLevel {
            sequence: 0,
            name: name.to_string(),
            module_name: module_name.to_string(),
            parent: None,
            first_child: None,
            next_sibling: None,
            counters: HashMap::new(),
        };
        Self {
            levels: vec![root],
            current: LevelId::from_raw(0),
            root: LevelId::from_raw(0),
        }
    }

    /// The root level.
    pub fn root(&self) -> LevelId {
        self.root
    }

    /// The level new blocks are created in.
    pub fn current(&self) -> LevelId {
        self.current
    }

    /// Returns the level with the given ID.
    pub fn level(&self, id: LevelId) -> &HierarchyLevel {
        &self.levels[id.as_raw() as usize]
    }

    /// Returns the level with the given ID mutably.
    pub fn level_mut(&mut self, id: LevelId) -> &mut HierarchyLevel {
        &mut self.levels[id.as_raw() as usize]
    }

    /// The number of levels in the tree.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Returns `true` if the tree holds only the root.
    pub fn is_empty(&self) -> bool {
        self.levels.len() <= 1
    }

    /// Iterates over all level IDs in creation order.
    pub fn ids(&self) -> impl Iterator<Item = LevelId> {
        (0..self.levels.len() as u32).map(LevelId::from_raw)
    }

    /// Enters a new child scope of the current level and makes it current.
    pub fn enter(&mut self, name: &str, module_name: &str) -> LevelId {
        let sequence = self.levels.len() as u32;
        let id = LevelId::from_raw(sequence);
        self.levels.push(HierarchyLevel {
            sequence,
            name: name.to_string(),
            module_name: module_name.to_string(),
            parent: Some(self.current),
            first_child: None,
            next_sibling: None,
            counters: HashMap::new(),
        });

        // Append to the parent's child list.
        let parent = self.current;
        match self.level(parent).first_child {
            None => self.level_mut(parent).first_child = Some(id),
            Some(first) => {
                let mut last = first;
                while let Some(next) = self.level(last).next_sibling {
                    last = next;
                }
                self.level_mut(last).next_sibling = Some(id);
            }
        }

        self.current = id;
        id
    }

    /// Leaves the current scope, returning to its parent.
    ///
    /// Returns `false` when already at the root.
    pub fn leave(&mut self) -> bool {
        match self.level(self.current).parent {
            Some(parent) => {
                self.current = parent;
                true
            }
            None => false,
        }
    }

    /// Rebinds the current level, returning the previous one so the caller
    /// can restore it.
    pub fn goto(&mut self, level: LevelId) -> LevelId {
        std::mem::replace(&mut self.current, level)
    }

    /// The `/`-separated path from the root to the given level.
    pub fn full_name(&self, id: LevelId) -> String {
        let mut parts = vec![self.level(id).name.clone()];
        let mut current = self.level(id).parent;
        while let Some(parent) = current {
            parts.push(self.level(parent).name.clone());
            current = self.level(parent).parent;
        }
        parts.reverse();
        parts.join("/")
    }

    /// Generates a block name unique within the current level.
    pub fn generate_block_name(&mut self, prefix: &str) -> String {
        let current = self.current;
        self.level_mut(current).generate_block_name(prefix)
    }
}
