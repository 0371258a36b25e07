use ssm::{BlockKind, BlockType};

use super::{Pass, PassContext, is_live};
use crate::capability::Capability;
use crate::error::PassError;

/// Block types kept even with an empty body.
const BODYLESS: [BlockType; 3] = [BlockType::ChapterMeta, BlockType::Relation, BlockType::Summary];

/// Normalize bodies, drop empty blocks, and scrub references to blocks that
/// no longer exist.
pub struct Cleanup;

impl Capability for Cleanup {
    fn name(&self) -> &'static str {
        "cleanup"
    }
}

impl Pass for Cleanup {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let frozen = cx.frozen;
        for block in cx.blocks.blocks_mut() {
            if is_live(frozen, block.chapter.as_ref()) {
                block.body = collapse_blank_runs(block.body.trim());
                block.extra.retain(|_, value| !value.trim().is_empty());
            }
        }

        let before = cx.blocks.len();
        cx.blocks.retain(|b| {
            !is_live(frozen, b.chapter.as_ref()) || !b.body.is_empty() || BODYLESS.contains(&b.block_type())
        });

        let index = cx.blocks.index().clone();
        for block in cx.blocks.blocks_mut() {
            if !is_live(frozen, block.chapter.as_ref()) {
                continue;
            }
            block.links.retain(|id| index.contains(id));
            if let BlockKind::ReasoningChain { steps } = &mut block.kind {
                steps.retain(|id| index.contains(id));
            }
        }
        // A chain needs a start and at least one step after it.
        cx.blocks.retain(|b| match &b.kind {
            BlockKind::ReasoningChain { steps } => !is_live(frozen, b.chapter.as_ref()) || steps.len() >= 2,
            _ => true,
        });

        tracing::debug!(removed = before - cx.blocks.len(), "cleanup");
        Ok(())
    }
}

/// Collapse runs of blank lines to one and strip trailing spaces.
fn collapse_blank_runs(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() && out.last().is_some_and(|prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::Fixture;
    use ssm::{Block, BlockId};

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_runs("a  \n\n\n\nb\n\nc"), "a\n\nb\n\nc");
    }

    #[test]
    fn empty_blocks_and_dangling_links_go() {
        let mut fixture = Fixture::new("# Chapter 1: A\n\n**Crate**: a unit of compilation.\n");
        let code = Some(ssm::ChapterCode::from_number(1));
        let index = fixture.blocks.allocate_index();
        let empty = Block::new(BlockKind::Fact, "   \n", index).in_chapter(code.clone());
        let mut linked = Block::new(BlockKind::Fact, "  Text\n\n\n\nmore  ", index + 1)
            .in_chapter(code)
            .with_meta("keywords", "");
        linked.id = Some(BlockId::new("fact-linked"));
        linked.links.insert(BlockId::new("fact-gone"));
        fixture.blocks.extend([empty, linked]);

        fixture.run(&[&Cleanup]);
        assert!(fixture.blocks.iter().all(|b| !b.body.trim().is_empty() || b.block_type() == BlockType::ChapterMeta));
        let linked = fixture.blocks.get(&BlockId::new("fact-linked")).unwrap();
        assert_eq!(linked.body, "Text\n\nmore");
        assert!(linked.links.is_empty());
        assert_eq!(linked.meta("keywords"), None);
    }
}
