use std::collections::{BTreeMap, BTreeSet};

use ssm::{BlockId, BlockKind, ChapterCode};

use super::{Pass, PassContext, is_live};
use crate::capability::Capability;
use crate::error::PassError;

pub const MAX_RELATED: usize = 8;

/// Two-hop neighbourhoods among a chapter's terms and concepts, recorded as
/// `related` (ids reachable through one intermediate block of the same
/// chapter, not already linked) and `degree` (direct links).
pub struct ConceptGraph;

impl Capability for ConceptGraph {
    fn name(&self) -> &'static str {
        "concept-graph"
    }
}

impl Pass for ConceptGraph {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        // Undirected adjacency restricted to same-chapter edges.
        let mut adjacency: BTreeMap<&BlockId, BTreeSet<&BlockId>> = BTreeMap::new();
        let mut chapter_of: BTreeMap<&BlockId, &ChapterCode> = BTreeMap::new();
        let mut index_of: BTreeMap<&BlockId, usize> = BTreeMap::new();
        for block in cx.blocks.iter() {
            if let (Some(id), Some(chapter)) = (&block.id, &block.chapter) {
                chapter_of.insert(id, chapter);
                index_of.insert(id, block.index);
            }
        }
        for block in cx.blocks.iter() {
            let Some(id) = &block.id else {
                continue;
            };
            for target in &block.links {
                if chapter_of.get(id).is_some() && chapter_of.get(id) == chapter_of.get(target) {
                    adjacency.entry(id).or_default().insert(target);
                    adjacency.entry(target).or_default().insert(id);
                }
            }
        }

        let is_node = |kind: &BlockKind| matches!(kind, BlockKind::Term { .. } | BlockKind::Concept { .. });
        let nodes: BTreeSet<&BlockId> = cx
            .blocks
            .iter()
            .filter(|b| is_node(&b.kind))
            .filter_map(|b| b.id.as_ref())
            .collect();

        let mut updates: Vec<(BlockId, String, usize)> = Vec::new();
        for block in cx.blocks.iter() {
            let Some(id) = &block.id else {
                continue;
            };
            if !is_node(&block.kind) || block.chapter.is_none() || !cx.is_live(block.chapter.as_ref()) {
                continue;
            }
            let empty = BTreeSet::new();
            let direct = adjacency.get(id).unwrap_or(&empty);
            let mut reachable: BTreeSet<&BlockId> = BTreeSet::new();
            for hop in direct {
                for far in adjacency.get(hop).into_iter().flatten() {
                    if *far != id && nodes.contains(far) && !direct.contains(far) {
                        reachable.insert(*far);
                    }
                }
            }
            let mut related: Vec<&BlockId> = reachable.into_iter().collect();
            related.sort_by_key(|far| (index_of.get(far).copied().unwrap_or(usize::MAX), *far));
            let related: Vec<&str> = related.into_iter().take(MAX_RELATED).map(BlockId::as_str).collect();
            updates.push((id.clone(), related.join(", "), block.links.len()));
        }

        let frozen = cx.frozen;
        for (id, related, degree) in updates {
            if let Some(block) = cx.blocks.get_mut(&id).filter(|b| is_live(frozen, b.chapter.as_ref())) {
                if related.is_empty() {
                    block.extra.remove("related");
                } else {
                    block.set_meta("related", related);
                }
                block.set_meta("degree", degree.to_string());
            }
        }
        Ok(())
    }
}
