//! Relation linker: turns relation candidates into `relation` blocks whose
//! endpoints are real block ids, and discovers relations stated in prose.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use ssm::block::Relation;
use ssm::block::id::OccurrenceCounter;
use ssm::block::index::BlockSet;
use ssm::document::LineSpan;
use ssm::symbols::SymbolTable;
use ssm::{Block, BlockId, BlockKind, BlockType, ChapterCode, Diagnostic, Diagnostics, Stage};

use crate::assemble::{defined_symbols, document_order, stamp_provenance};
use crate::extract::{Candidate, CandidateKind, RelationCandidate};
use crate::outline::Outline;
use crate::text::{find_word, sentences};

pub const EXPLICIT_CONFIDENCE: f32 = 1.0;
pub const PROSE_CONFIDENCE: f32 = 0.6;

/// Relation verbs recognised in prose, multi-word forms first.
static RELATION_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(depends on|is part of|requires|extends|uses|implements|replaces|causes|prevents)\b")
        .unwrap()
});

/// A symbol lookup a chapter made outside itself. `target` is `None` when the
/// name did not resolve, so a later definition elsewhere still invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resolution {
    pub name: String,
    pub target: Option<BlockId>,
}

pub type Resolutions = BTreeMap<ChapterCode, BTreeSet<Resolution>>;

/// Look `name` up in the document namespace only.
pub fn resolve_global(symbols: &SymbolTable, namespace: &str, name: &str) -> Option<(BlockId, Option<ChapterCode>)> {
    symbols
        .resolve_any(namespace, name)
        .map(|(_, entry)| (entry.definition.clone(), entry.chapter.clone()))
}

/// Lowercase; spaces and dashes become underscores.
pub fn normalize_relation_type(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

struct Resolver<'a> {
    symbols: &'a SymbolTable,
    namespace: &'a str,
    /// The same definitions, namespaced by chapter code.
    local: SymbolTable,
    resolutions: Resolutions,
}

impl<'a> Resolver<'a> {
    fn new(blocks: &BlockSet, outline: &Outline, symbols: &'a SymbolTable, namespace: &'a str) -> Self {
        let mut local = SymbolTable::new();
        for block in document_order(blocks, outline) {
            let (Some(id), Some(chapter)) = (&block.id, &block.chapter) else {
                continue;
            };
            for (kind, name) in defined_symbols(block) {
                let _ = local.register(chapter.as_str(), kind, &name, id.clone(), Some(chapter.clone()));
            }
        }
        Resolver {
            symbols,
            namespace,
            local,
            resolutions: Resolutions::new(),
        }
    }

    /// Chapter-local definitions win over the document namespace.
    fn resolve(&mut self, chapter: Option<&ChapterCode>, name: &str) -> Option<BlockId> {
        if let Some(chapter) = chapter {
            if let Some((_, entry)) = self.local.resolve_any(chapter.as_str(), name) {
                return Some(entry.definition.clone());
            }
        }
        let found = resolve_global(self.symbols, self.namespace, name);
        if let Some(chapter) = chapter {
            let crosses = found.as_ref().is_none_or(|(_, owner)| owner.as_ref() != Some(chapter));
            if crosses {
                self.resolutions.entry(chapter.clone()).or_default().insert(Resolution {
                    name: name.to_string(),
                    target: found.as_ref().map(|(id, _)| id.clone()),
                });
            }
        }
        found.map(|(id, _)| id)
    }
}

/// A relation ready to become a block.
struct Linked {
    relation: Relation,
    chapter: Option<ChapterCode>,
    lines: Option<LineSpan>,
    section: Option<String>,
}

/// Create relation blocks from explicit candidates, then from prose sentences.
///
/// Prose discovery skips `frozen` chapters, which keep their cached relation
/// blocks. Returns the cross-chapter lookups made per chapter.
pub fn link(
    blocks: &mut BlockSet,
    candidates: Vec<Candidate>,
    symbols: &SymbolTable,
    outline: &Outline,
    frozen: &BTreeSet<ChapterCode>,
    namespace: &str,
    diagnostics: &mut Diagnostics,
) -> Resolutions {
    let mut resolver = Resolver::new(blocks, outline, symbols, namespace);
    let mut linked = Vec::new();

    for candidate in candidates {
        let CandidateKind::Relation(relation) = &candidate.kind else {
            continue;
        };
        if let Some(relation) = link_candidate(&candidate, relation, &mut resolver, diagnostics) {
            linked.push(Linked {
                relation,
                chapter: candidate.chapter.clone(),
                lines: Some(candidate.lines),
                section: candidate.section.clone(),
            });
        }
    }
    linked.extend(discover_prose_relations(blocks, frozen));

    let mut counter = OccurrenceCounter::new();
    let mut seen = HashSet::new();
    let mut created = Vec::new();
    for Linked {
        relation,
        chapter,
        lines,
        section,
    } in linked
    {
        let key = (chapter.clone(), relation.from.clone(), relation.relation_type.clone(), relation.to.clone());
        if !seen.insert(key) {
            continue;
        }
        let body = relation.evidence.clone();
        let mut block = Block::new(BlockKind::Relation(relation), body, blocks.allocate_index())
            .in_chapter(chapter)
            .at_lines(lines);
        if let Some(section) = section {
            block.set_meta("section", section);
        }
        stamp_provenance(&mut block, namespace);
        block.id = Some(counter.assign(BlockType::Relation, block.chapter.as_ref(), &block.salient()));
        created.push(block);
    }

    tracing::debug!(relations = created.len(), "linked relations");
    blocks.extend(created);
    resolver.resolutions
}

fn link_candidate(
    candidate: &Candidate,
    relation: &RelationCandidate,
    resolver: &mut Resolver<'_>,
    diagnostics: &mut Diagnostics,
) -> Option<Relation> {
    let warn = |code: &str, message: String| {
        Diagnostic::warning(Stage::Link, code, message)
            .at_line(candidate.lines.start)
            .with_context(relation.evidence.clone())
            .in_chapter(candidate.chapter.clone())
    };

    let (Some(from), Some(to), Some(relation_type)) = (&relation.from, &relation.to, &relation.relation_type) else {
        let missing: Vec<&str> = [
            ("from", relation.from.is_none()),
            ("to", relation.to.is_none()),
            ("relation_type", relation.relation_type.is_none()),
        ]
        .into_iter()
        .filter_map(|(field, missing)| missing.then_some(field))
        .collect();
        diagnostics.push(warn(
            "relation-incomplete",
            format!("relation dropped, missing {}", missing.join(", ")),
        ));
        return None;
    };

    let chapter = candidate.chapter.as_ref();
    let from_id = resolver.resolve(chapter, from);
    let to_id = resolver.resolve(chapter, to);
    let (Some(from_id), Some(to_id)) = (from_id.clone(), to_id.clone()) else {
        let unresolved: Vec<String> = [(from, from_id.is_none()), (to, to_id.is_none())]
            .into_iter()
            .filter_map(|(name, missing)| missing.then(|| format!("'{}'", name)))
            .collect();
        diagnostics.push(warn(
            "relation-unresolved",
            format!("relation dropped, cannot resolve {}", unresolved.join(" and ")),
        ));
        return None;
    };

    Some(Relation {
        from: from_id,
        to: to_id,
        relation_type: normalize_relation_type(relation_type),
        confidence: EXPLICIT_CONFIDENCE,
        evidence: relation.evidence.clone(),
        context: candidate.section.clone().unwrap_or_default(),
    })
}

/// `<term> <verb> <term>` sentences in facts and rationales, where both terms
/// are defined in the sentence's chapter.
fn discover_prose_relations(blocks: &BlockSet, frozen: &BTreeSet<ChapterCode>) -> Vec<Linked> {
    let mut terms: BTreeMap<&ChapterCode, Vec<(&str, &BlockId)>> = BTreeMap::new();
    let mut sources: Vec<&Block> = Vec::new();
    for block in blocks.iter() {
        let Some(chapter) = block.chapter.as_ref().filter(|c| !frozen.contains(*c)) else {
            continue;
        };
        match (&block.kind, &block.id) {
            (BlockKind::Term { name }, Some(id)) => terms.entry(chapter).or_default().push((name, id)),
            (BlockKind::Fact | BlockKind::Rationale { .. }, _) => sources.push(block),
            _ => {}
        }
    }
    sources.sort_by_key(|b| b.index);

    let mut found = Vec::new();
    for block in sources {
        let Some(chapter) = &block.chapter else {
            continue;
        };
        let Some(chapter_terms) = terms.get(chapter).filter(|t| t.len() >= 2) else {
            continue;
        };
        for sentence in sentences(&block.body) {
            let Some(verb) = RELATION_VERB.find(&sentence) else {
                continue;
            };
            let before = &sentence[..verb.start()];
            let after = &sentence[verb.end()..];
            // Nearest term on each side of the verb.
            let from = chapter_terms
                .iter()
                .filter_map(|(name, id)| find_word(before, name).map(|span| (span.end, *id)))
                .max_by_key(|(end, _)| *end);
            let to = chapter_terms
                .iter()
                .filter_map(|(name, id)| find_word(after, name).map(|span| (span.start, *id)))
                .min_by_key(|(pos, _)| *pos);
            let (Some((_, from)), Some((_, to))) = (from, to) else {
                continue;
            };
            if from == to {
                continue;
            }
            found.push(Linked {
                relation: Relation {
                    from: from.clone(),
                    to: to.clone(),
                    relation_type: normalize_relation_type(verb.as_str()),
                    confidence: PROSE_CONFIDENCE,
                    evidence: sentence.clone(),
                    context: block.meta("section").unwrap_or_default().to_string(),
                },
                chapter: Some(chapter.clone()),
                lines: block.lines,
                section: block.meta("section").map(str::to_string),
            });
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::{Assembly, assemble};
    use crate::extract::{Extractor, default_extractors, run_extractors};
    use ssm::Parser;

    struct Outcome {
        assembly: Assembly,
        resolutions: Resolutions,
        diagnostics: Diagnostics,
    }

    fn link_text(text: &str) -> Outcome {
        let mut diagnostics = Diagnostics::new();
        let doc = Parser::new(text).parse(&mut diagnostics).unwrap();
        let outline = Outline::from_document(&doc);
        let registry = default_extractors();
        let extractors: Vec<&dyn Extractor> = registry.iter().map(|e| e.as_ref()).collect();
        let candidates = run_extractors(&extractors, &doc, false, &mut diagnostics);
        let mut assembly = assemble(&doc, &outline, candidates, Vec::new(), &BTreeSet::new(), "book");
        let relations = std::mem::take(&mut assembly.relations);
        let resolutions = link(
            &mut assembly.blocks,
            relations,
            &assembly.symbols,
            &outline,
            &BTreeSet::new(),
            "book",
            &mut diagnostics,
        );
        Outcome {
            assembly,
            resolutions,
            diagnostics,
        }
    }

    fn relations(linked: &Outcome) -> Vec<&Relation> {
        linked.assembly.blocks.iter().filter_map(Block::relation).collect()
    }

    #[test]
    fn explicit_relations_resolve_to_ids() {
        let linked = link_text(
            "# Chapter 1: Basics\n\n**Borrowing**: taking a reference.\n\n**Ownership**: one owner per value.\n\n- Borrowing --Depends-On--> Ownership\n",
        );
        let found = relations(&linked);
        assert_eq!(found.len(), 1);
        let relation = found[0];
        assert_eq!(relation.relation_type, "depends_on");
        assert_eq!(relation.confidence, EXPLICIT_CONFIDENCE);
        let from = linked.assembly.blocks.get(&relation.from).unwrap();
        assert_eq!(from.title(), Some("Borrowing"));
        assert!(linked.resolutions.is_empty());
    }

    #[test]
    fn incomplete_and_unresolved_candidates_are_dropped() {
        let linked = link_text("# Chapter 1: A\n\n- Traits --> Generics\n- Nothing --uses--> Nowhere\n");
        assert!(relations(&linked).is_empty());
        assert_eq!(linked.diagnostics.with_code("relation-incomplete").count(), 1);
        assert_eq!(linked.diagnostics.with_code("relation-unresolved").count(), 1);
        // Unresolved global lookups are remembered for cache invalidation.
        let recorded = &linked.resolutions[&ChapterCode::from_number(1)];
        assert!(recorded.iter().all(|r| r.target.is_none()));
        assert_eq!(recorded.len(), 2);
    }

    #[test]
    fn cross_chapter_resolutions_are_recorded() {
        let linked = link_text(
            "# Chapter 1: Basics\n\n**Heap**: dynamically allocated memory.\n\n# Chapter 2: Boxes\n\n**Box**: an owning pointer.\n\n- Box --uses--> Heap\n",
        );
        assert_eq!(relations(&linked).len(), 1);
        let recorded = &linked.resolutions[&ChapterCode::from_number(2)];
        assert_eq!(recorded.len(), 1);
        let resolution = recorded.iter().next().unwrap();
        assert_eq!(resolution.name, "Heap");
        assert!(resolution.target.is_some());
    }

    #[test]
    fn prose_relations_between_chapter_terms() {
        let linked = link_text(
            "# Chapter 1: Basics\n\n**Borrowing**: taking a reference.\n\n**Ownership**: one owner per value.\n\nIn practice, borrowing requires ownership to be settled first.\n",
        );
        let found = relations(&linked);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relation_type, "requires");
        assert_eq!(found[0].confidence, PROSE_CONFIDENCE);
    }

    #[test]
    fn relation_types_normalize() {
        assert_eq!(normalize_relation_type("Is Part-Of"), "is_part_of");
        assert_eq!(normalize_relation_type("  uses "), "uses");
    }
}
