use std::collections::HashSet;

use ssm::block::id::OccurrenceCounter;
use ssm::block::index::BlockSet;
use ssm::{Diagnostic, Diagnostics, Stage};

use crate::text::truncate_chars;

/// Body prefix hashed into the id of a block created by enrichment.
pub const DERIVED_SALIENT_CHARS: usize = 120;

/// Give every block without an id one, then make ids unique in canonical
/// order: the first keeps its id, later ones get `-2`, `-3`, ….
pub fn assign_ids(blocks: &mut BlockSet, diagnostics: &mut Diagnostics) {
    let mut counter = OccurrenceCounter::new();
    for block in blocks.blocks_mut() {
        if block.id.is_none() {
            let salient = truncate_chars(&block.body, DERIVED_SALIENT_CHARS);
            block.id = Some(counter.assign(block.block_type(), block.chapter.as_ref(), &salient));
        }
    }

    let mut taken: HashSet<_> = blocks.iter().filter_map(|b| b.id.clone()).collect();
    let mut seen = HashSet::new();
    for block in blocks.blocks_mut() {
        let Some(id) = block.id.clone() else {
            continue;
        };
        if seen.insert(id.clone()) {
            continue;
        }
        let mut n = 2;
        while taken.contains(&id.with_suffix(n)) {
            n += 1;
        }
        let renamed = id.with_suffix(n);
        diagnostics.push(
            Diagnostic::warning(
                Stage::Finalize,
                "id-collision",
                format!("id {} is used twice, renamed to {}", id, renamed),
            )
            .in_chapter(block.chapter.clone()),
        );
        taken.insert(renamed.clone());
        seen.insert(renamed.clone());
        block.id = Some(renamed);
    }
    blocks.rebuild_index();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm::{Block, BlockId, BlockKind, ChapterCode};

    #[test]
    fn missing_ids_are_derived_and_collisions_suffixed() {
        let ch = Some(ChapterCode::from_number(1));
        let mut a = Block::new(BlockKind::Fact, "a", 0).in_chapter(ch.clone());
        a.id = Some(BlockId::new("fact-same"));
        let mut b = Block::new(BlockKind::Fact, "b", 1).in_chapter(ch.clone());
        b.id = Some(BlockId::new("fact-same"));
        let derived = Block::new(BlockKind::Summary, "Chapter 1.", 2).in_chapter(ch.clone());
        let twin = Block::new(BlockKind::Summary, "Chapter 1.", 3).in_chapter(ch);

        let mut blocks = BlockSet::new(vec![a, b, derived, twin]);
        let mut diagnostics = Diagnostics::new();
        assign_ids(&mut blocks, &mut diagnostics);

        let ids: Vec<&str> = blocks.iter().map(|b| b.id.as_ref().unwrap().as_str()).collect();
        assert_eq!(ids[0], "fact-same");
        assert_eq!(ids[1], "fact-same-2");
        assert!(ids[2].starts_with("sum-"));
        assert_ne!(ids[2], ids[3]);
        assert_eq!(diagnostics.with_code("id-collision").count(), 1);
        assert!(blocks.contains(&BlockId::new("fact-same-2")));
    }
}
