//! The address-space registry of a configuration bus.

use ferro_fixed::SignalType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;

/// Access rights of a namespace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Observation points.
    ReadOnly,
    /// Reserved for write-side-only ranges.
    WriteOnly,
    /// Write registers with read-back.
    ReadWrite,
}

/// One allocated register, observer, or range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceEntry {
    /// Access rights.
    pub access: Access,
    /// The name the entry was registered under.
    pub name: String,
    /// The stored signal type.
    pub ty: SignalType,
    /// First bus address of the entry.
    pub address: u32,
    /// Number of allocated addresses.
    pub length: u32,
}

/// Registry of every address allocated through a builder tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Namespace {
    entries: Vec<NamespaceEntry>,
    lookup: HashMap<String, usize>,
}

impl Namespace {
    /// Creates an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entry; later entries shadow earlier ones of the same
    /// name in lookup.
    pub fn add(&mut self, entry: NamespaceEntry) {
        self.lookup.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }

    /// Finds an entry by name.
    pub fn lookup(&self, name: &str) -> Option<&NamespaceEntry> {
        self.lookup.get(name).map(|index| &self.entries[*index])
    }

    /// All entries in allocation order.
    pub fn entries(&self) -> &[NamespaceEntry] {
        &self.entries
    }

    /// Writes a tabular report of the address map.
    pub fn report(&self, sink: &mut dyn io::Write) -> io::Result<()> {
        writeln!(sink, "{:>8} | {:>6} | {:<12} | name", "address", "length", "type")?;
        writeln!(sink, "{:->8}-+-{:->6}-+-{:->12}-+-----", "", "", "")?;
        for entry in &self.entries {
            writeln!(
                sink,
                "{:>8} | {:>6} | {:<12} | {}",
                entry.address,
                entry.length,
                entry.ty.to_string(),
                entry.name
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, address: u32) -> NamespaceEntry {
        NamespaceEntry {
            access: Access::ReadWrite,
            name: name.to_string(),
            ty: SignalType::ufix(8, 0),
            address,
            length: 1,
        }
    }

    #[test]
    fn lookup_finds_entries() {
        let mut ns = Namespace::new();
        ns.add(entry("gain", 0));
        ns.add(entry("offset", 1));
        assert_eq!(ns.lookup("gain").map(|e| e.address), Some(0));
        assert_eq!(ns.lookup("offset").map(|e| e.address), Some(1));
        assert!(ns.lookup("missing").is_none());
    }

    #[test]
    fn report_is_tabular() {
        let mut ns = Namespace::new();
        ns.add(entry("gain", 0));
        let mut out = Vec::new();
        ns.report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("gain"));
        assert!(text.contains("ufix<8,0>"));
    }
}
