use ssm::document::NodeKind;
use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, caption_before, node_groups};
use crate::capability::Capability;
use crate::error::ExtractError;

/// Every fenced or indented code block that is not a diagram.
pub struct CodeExtractor;

impl Capability for CodeExtractor {
    fn name(&self) -> &'static str {
        "code"
    }
}

impl Extractor for CodeExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                if let NodeKind::CodeBlock { language, content } = &node.kind {
                    let body = content.trim_end_matches('\n');
                    if body.trim().is_empty() {
                        continue;
                    }
                    let kind = BlockKind::Code {
                        language: language.clone(),
                        caption: caption_before(nodes, i),
                    };
                    out.push(Candidate::block(self.name(), node, kind, body));
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
    fn code_blocks_with_captions() {
        let doc = parse(
            "# Chapter 1: A\n\nA minimal program:\n\n```rust\nfn main() {}\n```\n\n```mermaid\ngraph TD; A-->B\n```\n\n```\n\n```\n",
        );
        let found = CodeExtractor.extract(&doc).unwrap();
        assert_eq!(found.len(), 1);
        match &found[0].kind {
            CandidateKind::Block { kind, body } => {
                assert_eq!(
                    kind,
                    &BlockKind::Code {
                        language: Some("rust".into()),
                        caption: Some("A minimal program".into()),
                    }
                );
                assert_eq!(body, "fn main() {}");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
