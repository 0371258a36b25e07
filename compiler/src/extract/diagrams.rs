use ssm::document::NodeKind;
use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, caption_before, node_groups};
use crate::capability::Capability;
use crate::error::ExtractError;

pub struct DiagramExtractor;

impl Capability for DiagramExtractor {
    fn name(&self) -> &'static str {
        "diagrams"
    }
}

impl Extractor for DiagramExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                if let NodeKind::Diagram { notation, content } = &node.kind {
                    let kind = BlockKind::Diagram {
                        notation: notation.clone(),
                        caption: caption_before(nodes, i),
                    };
                    out.push(Candidate::block(self.name(), node, kind, content.trim_end_matches('\n')));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CandidateKind, parse};

    #[test]
    fn diagrams_keep_notation() {
        let doc = parse("# Chapter 1: A\n\nFlow:\n\n```mermaid\ngraph TD; A-->B\n```\n\n```\n+---+\n| x |\n+---+\n```\n");
        let found = DiagramExtractor.extract(&doc).unwrap();
        let notations: Vec<(String, Option<String>)> = found
            .iter()
            .filter_map(|c| match &c.kind {
                CandidateKind::Block {
                    kind: BlockKind::Diagram { notation, caption },
                    ..
                } => Some((notation.clone(), caption.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            notations,
            vec![("mermaid".into(), Some("Flow".into())), ("ascii".into(), None)]
        );
    }
}
