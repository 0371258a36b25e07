use std::collections::BTreeSet;

use ssm::{BlockId, BlockKind, ChapterCode};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;
use crate::text::first_sentence;

/// Question/answer pairs from terms, antipatterns with a fix, and contrasts.
/// Each `qa` block records its `source` and links to it.
pub struct QaSynthesis;

impl Capability for QaSynthesis {
    fn name(&self) -> &'static str {
        "qa-synthesis"
    }
}

impl Pass for QaSynthesis {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let answered: BTreeSet<&str> = cx
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Qa { .. }))
            .filter_map(|b| b.meta("source"))
            .collect();

        let mut pairs: Vec<(String, String, Option<ChapterCode>, BlockId, Option<String>)> = Vec::new();
        let mut sources: Vec<_> = cx
            .blocks
            .iter()
            .filter(|b| cx.is_live(b.chapter.as_ref()))
            .filter(|b| b.id.as_ref().is_some_and(|id| !answered.contains(id.as_str())))
            .collect();
        sources.sort_by_key(|b| b.index);

        for block in sources {
            let qa = match &block.kind {
                BlockKind::Term { name } => Some((format!("What is {}?", name), block.body.clone())),
                BlockKind::Antipattern { fix: Some(fix) } => {
                    let mistake = first_sentence(&block.body);
                    let mistake = mistake.trim_end_matches(['.', '!']);
                    Some((format!("What should be done instead of: {}?", mistake), fix.clone()))
                }
                BlockKind::Contrast { left, right } => {
                    Some((format!("How does {} differ from {}?", left, right), block.body.clone()))
                }
                _ => None,
            };
            if let (Some((question, answer)), Some(id)) = (qa, &block.id) {
                if !answer.trim().is_empty() {
                    let section = block.meta("section").map(str::to_string);
                    pairs.push((question, answer, block.chapter.clone(), id.clone(), section));
                }
            }
        }

        for (question, answer, chapter, source, section) in pairs {
            let mut block = cx.derive(BlockKind::Qa { question }, answer, chapter);
            block.set_meta("source", source.to_string());
            if let Some(section) = section {
                block.set_meta("section", section);
            }
            block.links.insert(source);
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

    const TEXT: &str = "# Chapter 1: Pointers\n\n**Box**: an owning heap pointer.\n\n## Box vs Rc\n\nBox has one owner while Rc counts references.\n\n- ❌ Cloning an Rc to get mutability\n- ✅ Use RefCell inside the Rc\n";

    #[test]
    fn questions_from_three_sources() {
        let mut fixture = Fixture::new(TEXT);
        fixture.run(&[&QaSynthesis]);
        let questions: Vec<&str> = fixture
            .of_type(BlockType::Qa)
            .iter()
            .filter_map(|b| b.title())
            .collect();
        assert_eq!(
            questions,
            [
                "What is Box?",
                "How does Box differ from Rc?",
                "What should be done instead of: Cloning an Rc to get mutability?",
            ]
        );
        let qa = fixture.titled("What is Box?");
        let term = fixture.titled("Box").id.clone().unwrap();
        assert_eq!(qa.meta("source"), Some(term.as_str()));
        assert!(qa.links.contains(&term));
    }

    #[test]
    fn sources_are_answered_once() {
        let mut fixture = Fixture::new(TEXT);
        fixture.run(&[&QaSynthesis, &QaSynthesis]);
        assert_eq!(fixture.of_type(BlockType::Qa).len(), 3);
    }
}
