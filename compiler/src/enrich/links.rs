use std::collections::BTreeMap;

use ssm::{BlockId, BlockKind, ChapterCode};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;
use crate::text::mentions;

/// Wire relation endpoints to each other, and term mentions to their
/// definitions, in both directions. Links never leave a chapter except from a
/// relation to its own endpoints.
pub struct BidirectionalLinks;

impl Capability for BidirectionalLinks {
    fn name(&self) -> &'static str {
        "bidirectional-links"
    }
}

impl Pass for BidirectionalLinks {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let mut edges: Vec<(BlockId, BlockId)> = Vec::new();
        let mut terms: BTreeMap<&ChapterCode, Vec<(&str, &BlockId)>> = BTreeMap::new();

        for block in cx.blocks.iter() {
            let (Some(id), Some(chapter)) = (&block.id, &block.chapter) else {
                continue;
            };
            if !cx.is_live(Some(chapter)) {
                continue;
            }
            match &block.kind {
                BlockKind::Relation(relation) => {
                    let local = |target: &BlockId| {
                        cx.blocks.get(target).is_some_and(|b| b.chapter.as_ref() == Some(chapter))
                    };
                    for endpoint in [&relation.from, &relation.to] {
                        edges.push((id.clone(), endpoint.clone()));
                        if local(endpoint) {
                            edges.push((endpoint.clone(), id.clone()));
                        }
                    }
                    if local(&relation.from) && local(&relation.to) {
                        edges.push((relation.from.clone(), relation.to.clone()));
                        edges.push((relation.to.clone(), relation.from.clone()));
                    }
                }
                BlockKind::Term { name } => terms.entry(chapter).or_default().push((name, id)),
                _ => {}
            }
        }

        for block in cx.blocks.iter() {
            let (Some(id), Some(chapter)) = (&block.id, &block.chapter) else {
                continue;
            };
            if matches!(block.kind, BlockKind::ChapterMeta { .. } | BlockKind::Relation(_)) {
                continue;
            }
            for (name, term) in terms.get(chapter).into_iter().flatten() {
                if *term != id && mentions(&block.body, name) {
                    edges.push((id.clone(), (*term).clone()));
                    edges.push(((*term).clone(), id.clone()));
                }
            }
        }

        let mut added = 0;
        for (from, to) in edges {
            if from == to {
                continue;
            }
            if let Some(block) = cx.blocks.get_mut(&from) {
                if block.links.insert(to) {
                    added += 1;
                }
            }
        }
        tracing::debug!(added, "bidirectional links");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::testing::Fixture;
    use ssm::BlockType;

    #[test]
    fn relations_and_mentions_link_both_ways() {
        let mut fixture = Fixture::new(
            "# Chapter 1: Basics\n\n**Borrowing**: taking a reference.\n\n**Ownership**: one owner per value.\n\n- Borrowing --requires--> Ownership\n\nOwnership is checked by the compiler at every single move.\n",
        );
        fixture.run(&[&BidirectionalLinks]);

        let borrowing = fixture.titled("Borrowing").id.clone().unwrap();
        let ownership = fixture.titled("Ownership").id.clone().unwrap();
        let relation = fixture.of_type(BlockType::Relation)[0].id.clone().unwrap();
        let fact = fixture.of_type(BlockType::Fact)[0].id.clone().unwrap();

        let links = |id: &BlockId| fixture.blocks.get(id).unwrap().links.clone();
        assert!(links(&borrowing).contains(&ownership));
        assert!(links(&ownership).contains(&borrowing));
        assert!(links(&relation).contains(&borrowing));
        assert!(links(&borrowing).contains(&relation));
        assert!(links(&fact).contains(&ownership));
        assert!(links(&ownership).contains(&fact));
    }

    #[test]
    fn mentions_survive_case_folding_elsewhere_in_the_body() {
        let mut fixture = Fixture::new(
            "# Chapter 1: Basics\n\n**Ownership**: one owner per value.\n\nİzmir and İstanbul both teach that ownership ends when the owner drops.\n",
        );
        fixture.run(&[&BidirectionalLinks]);
        let ownership = fixture.titled("Ownership").id.clone().unwrap();
        let fact = fixture.of_type(BlockType::Fact)[0];
        assert!(fact.links.contains(&ownership));
    }

    #[test]
    fn running_twice_adds_nothing() {
        let mut fixture = Fixture::new(
            "# Chapter 1: Basics\n\n**Trait**: shared behaviour.\n\nA trait lists methods that implementing types must provide.\n",
        );
        fixture.run(&[&BidirectionalLinks]);
        let once = fixture.blocks.clone();
        fixture.run(&[&BidirectionalLinks]);
        assert_eq!(fixture.blocks, once);
    }
}
