use ssm::{BlockId, ChapterCode, Diagnostic, Stage};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;

/// Derived blocks take the chapter of their `source`; chapter codes missing
/// from the outline are cleared.
pub struct ChapterAttribution;

impl Capability for ChapterAttribution {
    fn name(&self) -> &'static str {
        "chapter-attribution"
    }
}

impl Pass for ChapterAttribution {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let mut moves: Vec<(usize, Option<ChapterCode>)> = Vec::new();
        for (pos, block) in cx.blocks.iter().enumerate() {
            if !cx.is_live(block.chapter.as_ref()) {
                continue;
            }
            let inherited = block
                .meta("source")
                .and_then(|source| cx.blocks.get(&BlockId::new(source)))
                .map(|source| source.chapter.clone());
            let mut chapter = inherited.unwrap_or_else(|| block.chapter.clone());
            if let Some(code) = chapter.as_ref().filter(|c| !cx.outline.contains(c)) {
                cx.diagnostics.push(
                    Diagnostic::warning(
                        Stage::Enrich,
                        "unknown-chapter",
                        format!("block refers to unknown chapter {}, made document-global", code),
                    )
                    .with_context(block.body.chars().take(60).collect::<String>()),
                );
                chapter = None;
            }
            if chapter != block.chapter && cx.is_live(chapter.as_ref()) {
                moves.push((pos, chapter));
            }
        }

        for (pos, chapter) in moves {
            cx.blocks.blocks_mut()[pos].chapter = chapter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::Fixture;
    use ssm::{Block, BlockKind};

    #[test]
    fn derived_blocks_follow_their_source() {
        let mut fixture = Fixture::new("# Chapter 1: A\n\n**Crate**: a unit of compilation.\n\n# Chapter 2: B\n");
        let source = fixture.titled("Crate").id.clone().unwrap();
        let index = fixture.blocks.allocate_index();
        let stray = Block::new(BlockKind::Qa { question: "What is Crate?".into() }, "A unit.", index)
            .in_chapter(Some(ChapterCode::from_number(2)))
            .with_meta("source", source.as_str());
        let orphan = Block::new(BlockKind::Fact, "Lost text.", index + 1).in_chapter(Some(ChapterCode::from_number(9)));
        fixture.blocks.extend([stray, orphan]);

        fixture.run(&[&ChapterAttribution]);
        let qa = fixture.titled("What is Crate?");
        assert_eq!(qa.chapter, Some(ChapterCode::from_number(1)));
        let orphan = fixture.blocks.iter().find(|b| b.body == "Lost text.").unwrap();
        assert_eq!(orphan.chapter, None);
        assert_eq!(fixture.diagnostics.with_code("unknown-chapter").count(), 1);
    }
}
