use ssm::block::index::BlockSet;
use ssm::{BlockKind, Diagnostic, Diagnostics, Stage};

/// Drop relations whose endpoints are gone (one warning each), then strip
/// links and chain steps to missing ids (one warning in total).
pub fn prune_dangling(blocks: &mut BlockSet, diagnostics: &mut Diagnostics) {
    let mut dangling = Vec::new();
    for (position, block) in blocks.iter().enumerate() {
        let Some(relation) = block.relation() else {
            continue;
        };
        let missing: Vec<&str> = [&relation.from, &relation.to]
            .into_iter()
            .filter(|id| !blocks.contains(id))
            .map(|id| id.as_str())
            .collect();
        if !missing.is_empty() {
            dangling.push((position, block.chapter.clone(), block.lines, missing.join(", ")));
        }
    }
    for (_, chapter, lines, missing) in &dangling {
        let mut diagnostic = Diagnostic::warning(
            Stage::Finalize,
            "dangling-relation",
            format!("relation dropped, endpoint {} does not exist", missing),
        )
        .in_chapter(chapter.clone());
        if let Some(lines) = lines {
            diagnostic = diagnostic.at_line(lines.start);
        }
        diagnostics.push(diagnostic);
    }
    if !dangling.is_empty() {
        tracing::debug!(count = dangling.len(), "dropping dangling relations");
        let mut position = 0;
        blocks.retain(|_| {
            let keep = !dangling.iter().any(|(dropped, ..)| *dropped == position);
            position += 1;
            keep
        });
    }

    let index = blocks.index().clone();
    let mut stripped = 0;
    for block in blocks.blocks_mut() {
        let before = block.links.len();
        block.links.retain(|id| index.contains(id));
        stripped += before - block.links.len();
        if let BlockKind::ReasoningChain { steps } = &mut block.kind {
            let before = steps.len();
            steps.retain(|id| index.contains(id));
            stripped += before - steps.len();
        }
    }
    if stripped > 0 {
        diagnostics.push(Diagnostic::warning(
            Stage::Finalize,
            "dangling-links",
            format!("removed {} link(s) to blocks that no longer exist", stripped),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssm::block::Relation;
    use ssm::{Block, BlockId};

    #[test]
    fn dangling_relations_and_links_are_reported() {
        let mut fact = Block::new(BlockKind::Fact, "x", 0);
        fact.id = Some(BlockId::new("fact-x"));
        fact.links.insert(BlockId::new("fact-gone"));
        fact.links.insert(BlockId::new("fact-gone-too"));
        let mut relation = Block::new(
            BlockKind::Relation(Relation {
                from: BlockId::new("fact-x"),
                to: BlockId::new("term-gone"),
                relation_type: "uses".into(),
                confidence: 1.0,
                evidence: String::new(),
                context: String::new(),
            }),
            "",
            1,
        );
        relation.id = Some(BlockId::new("rel-1"));
        let mut blocks = BlockSet::new(vec![fact, relation]);
        let mut diagnostics = Diagnostics::new();

        prune_dangling(&mut blocks, &mut diagnostics);
        assert_eq!(blocks.len(), 1);
        assert!(blocks.blocks()[0].links.is_empty());
        assert_eq!(diagnostics.with_code("dangling-relation").count(), 1);
        assert_eq!(diagnostics.with_code("dangling-links").count(), 1);
        assert!(!diagnostics.has_errors());
    }
}
