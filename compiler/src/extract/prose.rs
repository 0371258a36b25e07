use ssm::document::NodeKind;
use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, node_groups, prose_text};
use crate::capability::Capability;
use crate::error::ExtractError;

/// Paragraphs shorter than this are not worth a fact block.
pub const MIN_FACT_CHARS: usize = 40;

/// One concept per section heading, one fact per substantial paragraph.
pub struct ProseExtractor;

impl Capability for ProseExtractor {
    fn name(&self) -> &'static str {
        "prose"
    }
}

impl Extractor for ProseExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                match &node.kind {
                    NodeKind::Section { title, .. } => {
                        let first_paragraph = nodes[i + 1..]
                            .iter()
                            .take_while(|n| !matches!(n.kind, NodeKind::Section { .. }))
                            .find(|n| matches!(n.kind, NodeKind::Paragraph(_)));
                        let kind = BlockKind::Concept {
                            title: title.clone(),
                        };
                        let candidate = match first_paragraph.and_then(|p| prose_text(p).map(|t| (p, t))) {
                            Some((paragraph, text)) => Candidate::block(self.name(), node, kind, text).spanning(paragraph),
                            None => Candidate::block(self.name(), node, kind, title.clone()),
                        };
                        out.push(candidate);
                    }
                    NodeKind::Paragraph(_) => {
                        if let Some(text) = prose_text(node).filter(|t| t.chars().count() >= MIN_FACT_CHARS) {
                            out.push(Candidate::block(self.name(), node, BlockKind::Fact, text));
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(out)
    }
}
