use std::collections::BTreeSet;

use ssm::block::id::OccurrenceCounter;
use ssm::block::index::BlockSet;
use ssm::symbols::{SymbolKind, SymbolTable};
use ssm::{Block, BlockKind, ChapterCode, Document};

use crate::extract::{Candidate, CandidateKind};
use crate::outline::Outline;

/// Metadata every block carries, emitted last in each SSM record.
pub const PROVENANCE_KEYS: [&str; 3] = ["namespace", "compiler_version", "schema_version"];

/// Output of assembly: the block list, the symbols it defines, and the
/// relation candidates left for the linker.
#[derive(Debug, Default)]
pub struct Assembly {
    pub blocks: BlockSet,
    pub symbols: SymbolTable,
    pub relations: Vec<Candidate>,
}

pub fn stamp_provenance(block: &mut Block, namespace: &str) {
    block.set_meta("namespace", namespace);
    block.set_meta("compiler_version", crate::COMPILER_VERSION);
    block.set_meta("schema_version", ssm::SCHEMA_VERSION);
}

/// Turn candidates into blocks, add one `chapter-meta` per live chapter, and
/// register symbols.
///
/// `reused` are finalized blocks of `frozen` chapters taken from the cache;
/// they keep their ids and are registered like fresh blocks, in document order.
pub fn assemble(
    document: &Document,
    outline: &Outline,
    mut candidates: Vec<Candidate>,
    reused: Vec<Block>,
    frozen: &BTreeSet<ChapterCode>,
    namespace: &str,
) -> Assembly {
    let mut counter = OccurrenceCounter::new();
    let mut blocks = Vec::new();
    let mut next_index = 0;

    let mut push = |mut block: Block, blocks: &mut Vec<Block>| {
        stamp_provenance(&mut block, namespace);
        block.id = Some(counter.assign(block.block_type(), block.chapter.as_ref(), &block.salient()));
        blocks.push(block);
    };

    for chapter in document.chapters.iter().filter(|c| !frozen.contains(&c.code)) {
        let body = match &chapter.title {
            Some(title) => format!("Chapter {}: {}", chapter.number, title),
            None => format!("Chapter {}", chapter.number),
        };
        let kind = BlockKind::ChapterMeta {
            number: chapter.number,
            title: chapter.title.clone(),
            difficulty: chapter.difficulty,
            start_line: chapter.span.start,
            line_count: chapter.span.line_count(),
            sections: chapter.sections().count() as u32,
        };
        let block = Block::new(kind, body, next_index)
            .in_chapter(Some(chapter.code.clone()))
            .at_lines(Some(chapter.span));
        next_index += 1;
        push(block, &mut blocks);
    }

    // Registry order within a line is preserved by the stable sort.
    candidates.sort_by_key(|c| (outline.rank(c.chapter.as_ref()), c.lines.start));

    let mut relations = Vec::new();
    for candidate in candidates {
        match candidate.kind {
            CandidateKind::Relation(_) => relations.push(candidate),
            CandidateKind::Block { kind, body } => {
                let mut block = Block::new(kind, body, next_index)
                    .in_chapter(candidate.chapter)
                    .at_lines(Some(candidate.lines));
                if let Some(section) = candidate.section {
                    block.set_meta("section", section);
                }
                next_index += 1;
                push(block, &mut blocks);
            }
        }
    }

    let fresh = blocks.len();
    blocks.extend(reused);
    let blocks = BlockSet::new(blocks);
    let symbols = register_symbols(&blocks, outline, namespace);

    tracing::debug!(
        blocks = fresh,
        reused = blocks.len() - fresh,
        relation_candidates = relations.len(),
        symbols = symbols.len(),
        "assembled blocks"
    );

    Assembly {
        blocks,
        symbols,
        relations,
    }
}

/// Blocks in document order: chapter rank, then assembly index.
pub fn document_order<'a>(blocks: &'a BlockSet, outline: &Outline) -> Vec<&'a Block> {
    let mut ordered: Vec<&Block> = blocks.iter().collect();
    ordered.sort_by_key(|b| (outline.rank(b.chapter.as_ref()), b.index));
    ordered
}

/// The names a block defines, if any.
pub fn defined_symbols(block: &Block) -> Vec<(SymbolKind, String)> {
    match &block.kind {
        BlockKind::Term { name } => vec![(SymbolKind::Term, name.clone())],
        BlockKind::Concept { title } => vec![(SymbolKind::Concept, title.clone())],
        BlockKind::ChapterMeta { title, .. } => {
            let mut names = Vec::new();
            if let Some(title) = title {
                names.push((SymbolKind::Chapter, title.clone()));
            }
            if let Some(code) = &block.chapter {
                names.push((SymbolKind::Chapter, code.to_string()));
            }
            names
        }
        _ => Vec::new(),
    }
}

fn register_symbols(blocks: &BlockSet, outline: &Outline, namespace: &str) -> SymbolTable {
    let mut symbols = SymbolTable::new();
    for block in document_order(blocks, outline) {
        let Some(id) = &block.id else {
            continue;
        };
        for (kind, name) in defined_symbols(block) {
            // Duplicates are recorded by the table and reported at validation.
            let _ = symbols.register(namespace, kind, &name, id.clone(), block.chapter.clone());
        }
    }
    symbols
}
