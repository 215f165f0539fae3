//! Named properties exposed by blocks to the elaborator and emitter.

use ferro_common::StructuralHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A bag of named integer and string scalars and arrays.
///
/// Blocks write their instance parameters here (a decide block's per-path
/// shift amounts, a constant's value, a memory's depth). The bag takes
/// part in module unification: two entities with different property bags
/// never unify. Keys are ordered so hashing and comparison are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    ints: BTreeMap<(String, i32, i32), i64>,
    strings: BTreeMap<(String, i32), String>,
}

impl Properties {
    /// Creates an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an unindexed integer property.
    pub fn set_int(&mut self, name: &str, value: i64) {
        self.ints.insert((name.to_string(), 0, 0), value);
    }

    /// Sets a singly indexed integer property.
    pub fn set_int_indexed(&mut self, name: &str, index: i32, value: i64) {
        self.ints.insert((name.to_string(), index, 0), value);
    }

    /// Sets a doubly indexed integer property.
    pub fn set_int_indexed2(&mut self, name: &str, index: i32, index2: i32, value: i64) {
        self.ints.insert((name.to_string(), index, index2), value);
    }

    /// Reads an unindexed integer property.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.ints.get(&(name.to_string(), 0, 0)).copied()
    }

    /// Reads a singly indexed integer property.
    pub fn get_int_indexed(&self, name: &str, index: i32) -> Option<i64> {
        self.ints.get(&(name.to_string(), index, 0)).copied()
    }

    /// Reads a doubly indexed integer property.
    pub fn get_int_indexed2(&self, name: &str, index: i32, index2: i32) -> Option<i64> {
        self.ints.get(&(name.to_string(), index, index2)).copied()
    }

    /// Sets an unindexed string property.
    pub fn set_string(&mut self, name: &str, value: impl Into<String>) {
        self.strings.insert((name.to_string(), 0), value.into());
    }

    /// Sets a singly indexed string property.
    pub fn set_string_indexed(&mut self, name: &str, index: i32, value: impl Into<String>) {
        self.strings.insert((name.to_string(), index), value.into());
    }

    /// Reads an unindexed string property.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.strings.get(&(name.to_string(), 0)).map(|s| s.as_str())
    }

    /// Reads a singly indexed string property.
    pub fn get_string_indexed(&self, name: &str, index: i32) -> Option<&str> {
        self.strings
            .get(&(name.to_string(), index))
            .map(|s| s.as_str())
    }

    /// Returns `true` if the bag holds no properties.
    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.strings.is_empty()
    }

    /// Mixes the bag into a structural hash.
    pub fn combine_hash(&self, hasher: &mut StructuralHasher) {
        for ((name, i, j), value) in &self.ints {
            hasher.combine_str(name);
            hasher.combine_u64(*i as u64);
            hasher.combine_u64(*j as u64);
            hasher.combine_u64(*value as u64);
        }
        for ((name, i), value) in &self.strings {
            hasher.combine_str(name);
            hasher.combine_u64(*i as u64);
            hasher.combine_str(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_roundtrip() {
        let mut p = Properties::new();
        p.set_int("NumberOfSummands", 4);
        assert_eq!(p.get_int("NumberOfSummands"), Some(4));
        assert_eq!(p.get_int("Missing"), None);
    }

    #[test]
    fn indexed_ints_are_distinct() {
        let mut p = Properties::new();
        p.set_int_indexed("Align", 0, 1);
        p.set_int_indexed("Align", 1, 5);
        assert_eq!(p.get_int_indexed("Align", 0), Some(1));
        assert_eq!(p.get_int_indexed("Align", 1), Some(5));
    }

    #[test]
    fn string_roundtrip() {
        let mut p = Properties::new();
        p.set_string("class", "input");
        assert_eq!(p.get_string("class"), Some("input"));
    }

    #[test]
    fn equality_and_hash_agree() {
        let mut a = Properties::new();
        a.set_int("Depth", 64);
        a.set_string("class", "output");
        let mut b = Properties::new();
        b.set_string("class", "output");
        b.set_int("Depth", 64);
        assert_eq!(a, b);

        let mut ha = StructuralHasher::new();
        a.combine_hash(&mut ha);
        let mut hb = StructuralHasher::new();
        b.combine_hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());

        b.set_int("Depth", 128);
        assert_ne!(a, b);
        let mut hc = StructuralHasher::new();
        b.combine_hash(&mut hc);
        assert_ne!(ha.finish(), hc.finish());
    }

    #[test]
    fn doubly_indexed_roundtrip() {
        let mut p = Properties::new();
        p.set_int_indexed2("Shift", 1, 2, 3);
        p.set_string_indexed("Value", 0, "0xff");
        assert_eq!(p.get_int_indexed2("Shift", 1, 2), Some(3));
        assert_eq!(p.get_int_indexed2("Shift", 2, 1), None);
        assert_eq!(p.get_string_indexed("Value", 0), Some("0xff"));
        assert!(!p.is_empty());
    }
}
