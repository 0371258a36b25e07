use ssm::block::index::BlockSet;
use ssm::{Block, BlockId};

use crate::outline::Outline;

/// (chapter rank, type priority, assembly index, id). Total over distinct
/// blocks, so the sort is deterministic.
pub type SortKey = (usize, u8, usize, Option<BlockId>);

pub fn sort_key(block: &Block, outline: &Outline) -> SortKey {
    (
        outline.rank(block.chapter.as_ref()),
        block.block_type().priority(),
        block.index,
        block.id.clone(),
    )
}

pub fn canonical_sort(blocks: &mut BlockSet, outline: &Outline) {
    blocks.sort_by(|a, b| sort_key(a, outline).cmp(&sort_key(b, outline)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm::{BlockKind, ChapterCode, Diagnostics, Parser};

    #[test]
    fn chapters_then_types_then_index() {
        let mut diagnostics = Diagnostics::new();
        let doc = Parser::new("# Chapter 1: A\n\n# Chapter 2: B\n").parse(&mut diagnostics).unwrap();
        let outline = Outline::from_document(&doc);
        let ch = |n| Some(ChapterCode::from_number(n));

        let fact = |index, chapter| Block::new(BlockKind::Fact, "f", index).in_chapter(chapter);
        let term = |index, chapter| Block::new(BlockKind::Term { name: "t".into() }, "t", index).in_chapter(chapter);
        let mut blocks = BlockSet::new(vec![
            fact(0, ch(2)),
            term(1, ch(2)),
            fact(2, ch(1)),
            fact(3, None),
            fact(4, ch(7)),
            fact(1, ch(1)),
        ]);
        canonical_sort(&mut blocks, &outline);
        let order: Vec<(Option<ChapterCode>, usize)> =
            blocks.iter().map(|b| (b.chapter.clone(), b.index)).collect();
        assert_eq!(
            order,
            [(None, 3), (ch(1), 1), (ch(1), 2), (ch(2), 1), (ch(2), 0), (ch(7), 4)]
        );
    }
}
