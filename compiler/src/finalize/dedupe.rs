use std::collections::{BTreeSet, HashMap, HashSet};

use ssm::block::id::normalize_salient;
use ssm::block::index::BlockSet;
use ssm::{Block, BlockId, BlockKind, BlockType, ChapterCode};

use crate::outline::Outline;

/// Metadata keys whose values are block ids (comma separated).
const ID_LIST_KEYS: [&str; 3] = ["source", "hubs", "related"];

type DedupeKey = (BlockType, String, Option<ChapterCode>);

/// Collapse blocks with the same type, normalized salient content and
/// chapter. The first in document order survives, absorbs the links of the
/// others, and every reference to a dropped id is redirected to it.
///
/// Relations and reasoning chains are keyed by ids, so they are collapsed
/// in a second round, after references to other blocks have been remapped.
/// Returns the number of blocks removed.
pub fn dedupe(blocks: &mut BlockSet, outline: &Outline) -> usize {
    let by_id = |t: BlockType| matches!(t, BlockType::Relation | BlockType::ReasoningChain);
    let first = collapse(blocks, outline, |b| !by_id(b.block_type()));
    let second = collapse(blocks, outline, |b| by_id(b.block_type()));
    first + second
}

fn collapse(blocks: &mut BlockSet, outline: &Outline, eligible: impl Fn(&Block) -> bool) -> usize {
    let mut order: Vec<usize> = (0..blocks.len()).filter(|&i| eligible(&blocks.blocks()[i])).collect();
    order.sort_by_key(|&i| {
        let b = &blocks.blocks()[i];
        (outline.rank(b.chapter.as_ref()), b.index)
    });

    let mut survivors: HashMap<DedupeKey, usize> = HashMap::new();
    let mut dropped: HashSet<usize> = HashSet::new();
    let mut absorbed: Vec<(usize, BTreeSet<BlockId>)> = Vec::new();
    let mut remap: HashMap<BlockId, BlockId> = HashMap::new();

    for i in order {
        let block = &blocks.blocks()[i];
        let key = (block.block_type(), normalize_salient(&block.salient()), block.chapter.clone());
        match survivors.get(&key) {
            Some(&keep) => {
                dropped.insert(i);
                absorbed.push((keep, block.links.clone()));
                if let (Some(gone), Some(kept)) = (&block.id, &blocks.blocks()[keep].id) {
                    if gone != kept {
                        remap.insert(gone.clone(), kept.clone());
                    }
                }
            }
            None => {
                survivors.insert(key, i);
            }
        }
    }
    if dropped.is_empty() {
        return 0;
    }

    for (keep, links) in absorbed {
        blocks.blocks_mut()[keep].links.extend(links);
    }
    let mut position = 0;
    blocks.retain(|_| {
        let keep = !dropped.contains(&position);
        position += 1;
        keep
    });
    for block in blocks.blocks_mut() {
        remap_references(block, &remap);
    }
    blocks.rebuild_index();
    tracing::debug!(removed = dropped.len(), "deduplicated blocks");
    dropped.len()
}

fn remap_references(block: &mut Block, remap: &HashMap<BlockId, BlockId>) {
    if remap.is_empty() {
        return;
    }
    let map = |id: &BlockId| remap.get(id).cloned().unwrap_or_else(|| id.clone());
    block.links = block.links.iter().map(map).collect();
    if let Some(own) = &block.id {
        block.links.remove(own);
    }
    match &mut block.kind {
        BlockKind::Relation(relation) => {
            relation.from = map(&relation.from);
            relation.to = map(&relation.to);
        }
        BlockKind::ReasoningChain { steps } => {
            for step in steps.iter_mut() {
                *step = map(step);
            }
            steps.dedup();
        }
        _ => {}
    }
    for key in ID_LIST_KEYS {
        if let Some(value) = block.extra.get_mut(key) {
            let ids: Vec<String> = value
                .split(", ")
                .map(|id| map(&BlockId::new(id)).to_string())
                .collect();
            *value = ids.join(", ");
        }
    }
}
