use std::collections::HashMap;

use crate::block::{Block, BlockId};

/// Map from block id to its position in the owning block list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    positions: HashMap<BlockId, usize>,
}

impl BlockIndex {
    /// Index `blocks`; the first block wins when ids repeat.
    pub fn build(blocks: &[Block]) -> Self {
        let mut positions = HashMap::with_capacity(blocks.len());
        for (pos, block) in blocks.iter().enumerate() {
            if let Some(id) = &block.id {
                positions.entry(id.clone()).or_insert(pos);
            }
        }
        BlockIndex { positions }
    }

    pub fn position(&self, id: &BlockId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.positions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// The block list together with an index that is never observed stale.
///
/// Operations that change the number of blocks rebuild the index before
/// returning. Callers that rewrite ids through [`BlockSet::blocks_mut`]
/// must call [`BlockSet::rebuild_index`] before the next lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockSet {
    blocks: Vec<Block>,
    index: BlockIndex,
    next_index: usize,
}

impl BlockSet {
    pub fn new(blocks: Vec<Block>) -> Self {
        let next_index = blocks.iter().map(|b| b.index + 1).max().unwrap_or(0);
        let index = BlockIndex::build(&blocks);
        BlockSet {
            blocks,
            index,
            next_index,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Block> {
        self.blocks.iter()
    }

    pub fn get(&self, id: &BlockId) -> Option<&Block> {
        self.index.position(id).map(|pos| &self.blocks[pos])
    }

    pub fn get_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        self.index.position(id).map(|pos| &mut self.blocks[pos])
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.index.contains(id)
    }

    /// Next free assembly index for blocks created after assembly.
    pub fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    pub fn push(&mut self, block: Block) {
        self.next_index = self.next_index.max(block.index + 1);
        self.blocks.push(block);
        self.rebuild_index();
    }

    pub fn extend(&mut self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            self.next_index = self.next_index.max(block.index + 1);
            self.blocks.push(block);
        }
        self.rebuild_index();
    }

    pub fn retain(&mut self, keep: impl FnMut(&Block) -> bool) {
        self.blocks.retain(keep);
        self.rebuild_index();
    }

    /// Reorder blocks; the index is rebuilt afterwards.
    pub fn sort_by(&mut self, compare: impl FnMut(&Block, &Block) -> std::cmp::Ordering) {
        self.blocks.sort_by(compare);
        self.rebuild_index();
    }

    pub fn rebuild_index(&mut self) {
        self.index = BlockIndex::build(&self.blocks);
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;

    fn fact(id: &str, index: usize) -> Block {
        let mut block = Block::new(BlockKind::Fact, format!("fact {}", id), index);
        block.id = Some(BlockId::new(id));
        block
    }

    #[test]
    fn index_follows_mutations() {
        let mut set = BlockSet::new(vec![fact("fact-a", 0), fact("fact-b", 1)]);
        assert_eq!(set.index().position(&BlockId::new("fact-b")), Some(1));

        set.retain(|b| b.id.as_ref().map(BlockId::as_str) != Some("fact-a"));
        assert_eq!(set.index().position(&BlockId::new("fact-b")), Some(0));
        assert!(!set.contains(&BlockId::new("fact-a")));

        let index = set.allocate_index();
        assert_eq!(index, 2);
        set.push(fact("fact-c", index));
        assert_eq!(set.get(&BlockId::new("fact-c")).map(|b| b.index), Some(2));
    }

    #[test]
    fn first_duplicate_id_wins() {
        let index = BlockIndex::build(&[fact("fact-a", 0), fact("fact-a", 1)]);
        assert_eq!(index.position(&BlockId::new("fact-a")), Some(0));
        assert_eq!(index.len(), 1);
    }
}
