use ssm::{Block, BlockId, BlockKind};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;
use crate::text::first_sentence;

/// Per section: the concept, then its rationales, then its antipatterns, as
/// one `reasoning-chain` block that lists the step ids.
pub struct ReasoningChains;

impl Capability for ReasoningChains {
    fn name(&self) -> &'static str {
        "reasoning-chains"
    }
}

impl Pass for ReasoningChains {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let mut chains = Vec::new();
        let mut concepts: Vec<&Block> = cx
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Concept { .. }))
            .filter(|b| b.id.is_some() && b.chapter.is_some() && cx.is_live(b.chapter.as_ref()))
            .collect();
        concepts.sort_by_key(|b| b.index);

        for concept in concepts {
            let Some(section) = concept.title() else {
                continue;
            };
            let mut members: Vec<&Block> = cx
                .blocks
                .iter()
                .filter(|b| b.chapter == concept.chapter && b.meta("section") == Some(section))
                .filter(|b| b.id.is_some())
                .collect();
            members.sort_by_key(|b| b.index);
            let rationales = members.iter().filter(|b| matches!(b.kind, BlockKind::Rationale { .. }));
            let antipatterns = members.iter().filter(|b| matches!(b.kind, BlockKind::Antipattern { .. }));
            let tail: Vec<&Block> = rationales.chain(antipatterns).copied().collect();
            if tail.is_empty() {
                continue;
            }

            let steps: Vec<BlockId> = std::iter::once(concept)
                .chain(tail.iter().copied())
                .filter_map(|b| b.id.clone())
                .collect();
            let exists = cx.blocks.iter().any(|b| match &b.kind {
                BlockKind::ReasoningChain { steps: existing } => existing == &steps,
                _ => false,
            });
            if exists {
                continue;
            }

            let mut body = vec![format!("1. {}", section)];
            for (n, step) in tail.iter().enumerate() {
                let label = match step.kind {
                    BlockKind::Antipattern { .. } => "Avoid",
                    _ => "Because",
                };
                body.push(format!("{}. {}: {}", n + 2, label, first_sentence(&step.body)));
            }
            chains.push((
                steps,
                body.join("\n"),
                concept.chapter.clone(),
                concept.id.clone(),
                section.to_string(),
            ));
        }

        for (steps, body, chapter, source, section) in chains {
            let links = steps.iter().cloned().collect();
            let mut block = cx.derive(BlockKind::ReasoningChain { steps }, body, chapter);
            block.links = links;
            block.set_meta("section", section);
            if let Some(source) = source {
                block.set_meta("source", source.to_string());
            }
            cx.blocks.push(block);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::Fixture;
    use ssm::BlockType;

    const TEXT: &str = "# Chapter 1: Errors\n\n## Panics\n\nA panic unwinds the stack of the current thread.\n\nRationale: unrecoverable bugs should stop the program.\n\n❌ Using panic for expected failures\n\n## Results\n\nNothing else here to chain up with anything.\n";

    #[test]
    fn chains_follow_section_order() {
        let mut fixture = Fixture::new(TEXT);
        fixture.run(&[&ReasoningChains]);
        let chains = fixture.of_type(BlockType::ReasoningChain);
        assert_eq!(chains.len(), 1);
        let BlockKind::ReasoningChain { steps } = &chains[0].kind else {
            unreachable!()
        };
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0], fixture.titled("Panics").id.clone().unwrap());
        assert!(chains[0].body.contains("2. Because: unrecoverable bugs should stop the program."));
        assert!(chains[0].body.contains("3. Avoid: Using panic for expected failures"));
        assert_eq!(chains[0].meta("section"), Some("Panics"));
    }

    #[test]
    fn existing_chains_are_not_duplicated() {
        let mut fixture = Fixture::new(TEXT);
        fixture.run(&[&ReasoningChains, &ReasoningChains]);
        assert_eq!(fixture.of_type(BlockType::ReasoningChain).len(), 1);
    }
}
