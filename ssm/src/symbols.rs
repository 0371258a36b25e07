use std::collections::BTreeMap;
use std::fmt;

use crate::block::BlockId;
use crate::document::ChapterCode;

/// What kind of name a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind {
    Term,
    Concept,
    Chapter,
}

impl SymbolKind {
    /// Resolution order for [`SymbolTable::resolve_any`].
    pub const RESOLUTION_ORDER: [SymbolKind; 3] =
        [SymbolKind::Term, SymbolKind::Concept, SymbolKind::Chapter];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Term => "term",
            SymbolKind::Concept => "concept",
            SymbolKind::Chapter => "chapter",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered name and the block that defines it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub definition: BlockId,
    pub chapter: Option<ChapterCode>,
}

/// A second definition of an already-registered name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSymbol {
    pub namespace: String,
    pub name: String,
    pub existing: BlockId,
    pub duplicate: BlockId,
    pub chapter: Option<ChapterCode>,
}

/// Namespaced registry of symbol names. Holds ids, never blocks.
///
/// Namespaces are `<document namespace>::<kind>`; names compare
/// case-insensitively with whitespace collapsed. The first definition wins.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    namespaces: BTreeMap<String, BTreeMap<String, SymbolEntry>>,
    duplicates: Vec<DuplicateSymbol>,
}

pub fn normalize_symbol(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn namespace_key(namespace: &str, kind: SymbolKind) -> String {
    format!("{}::{}", namespace, kind.as_str())
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`. A repeated name keeps the first definition and is
    /// recorded as a duplicate, which is also returned.
    pub fn register(
        &mut self,
        namespace: &str,
        kind: SymbolKind,
        name: &str,
        definition: BlockId,
        chapter: Option<ChapterCode>,
    ) -> Result<(), DuplicateSymbol> {
        let key = normalize_symbol(name);
        if key.is_empty() {
            return Ok(());
        }
        let ns = namespace_key(namespace, kind);
        let table = self.namespaces.entry(ns.clone()).or_default();
        if let Some(existing) = table.get(&key) {
            if existing.definition == definition {
                return Ok(());
            }
            let duplicate = DuplicateSymbol {
                namespace: ns,
                name: name.to_string(),
                existing: existing.definition.clone(),
                duplicate: definition,
                chapter,
            };
            self.duplicates.push(duplicate.clone());
            return Err(duplicate);
        }
        table.insert(
            key,
            SymbolEntry {
                name: name.trim().to_string(),
                definition,
                chapter,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, namespace: &str, kind: SymbolKind, name: &str) -> Option<&SymbolEntry> {
        self.namespaces
            .get(&namespace_key(namespace, kind))
            .and_then(|table| table.get(&normalize_symbol(name)))
    }

    /// Resolve against terms, then concepts, then chapters.
    pub fn resolve_any(&self, namespace: &str, name: &str) -> Option<(SymbolKind, &SymbolEntry)> {
        SymbolKind::RESOLUTION_ORDER
            .iter()
            .find_map(|kind| self.resolve(namespace, *kind, name).map(|e| (*kind, e)))
    }

    /// Entries of one kind in name order.
    pub fn entries(&self, namespace: &str, kind: SymbolKind) -> impl Iterator<Item = &SymbolEntry> {
        self.namespaces
            .get(&namespace_key(namespace, kind))
            .into_iter()
            .flat_map(|table| table.values())
    }

    pub fn duplicates(&self) -> &[DuplicateSymbol] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.namespaces.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_definition_wins() {
        let mut table = SymbolTable::new();
        let ch = Some(ChapterCode::from_number(1));
        assert!(table
            .register("book", SymbolKind::Term, "Ownership", BlockId::new("term-1"), ch.clone())
            .is_ok());
        let dup = table
            .register("book", SymbolKind::Term, "ownership ", BlockId::new("term-2"), ch)
            .unwrap_err();
        assert_eq!(dup.existing, BlockId::new("term-1"));
        assert_eq!(table.duplicates().len(), 1);

        let entry = table.resolve("book", SymbolKind::Term, "OWNERSHIP").unwrap();
        assert_eq!(entry.definition, BlockId::new("term-1"));
        assert_eq!(entry.name, "Ownership");
    }

    #[test]
    fn namespaces_are_isolated() {
        let mut table = SymbolTable::new();
        table
            .register("a", SymbolKind::Term, "Lifetime", BlockId::new("term-a"), None)
            .unwrap();
        assert!(table.resolve("b", SymbolKind::Term, "Lifetime").is_none());
        assert!(table.resolve("a", SymbolKind::Concept, "Lifetime").is_none());
    }

    #[test]
    fn resolve_any_prefers_terms() {
        let mut table = SymbolTable::new();
        table
            .register("ns", SymbolKind::Concept, "Traits", BlockId::new("con-1"), None)
            .unwrap();
        table
            .register("ns", SymbolKind::Term, "Traits", BlockId::new("term-1"), None)
            .unwrap();
        let (kind, entry) = table.resolve_any("ns", "traits").unwrap();
        assert_eq!(kind, SymbolKind::Term);
        assert_eq!(entry.definition, BlockId::new("term-1"));
    }

    #[test]
    fn re_registering_same_definition_is_not_a_duplicate() {
        let mut table = SymbolTable::new();
        let id = BlockId::new("term-1");
        table.register("ns", SymbolKind::Term, "Crate", id.clone(), None).unwrap();
        table.register("ns", SymbolKind::Term, "Crate", id, None).unwrap();
        assert!(table.duplicates().is_empty());
        assert_eq!(table.len(), 1);
    }
}
