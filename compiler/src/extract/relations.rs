use std::sync::LazyLock;

use regex::Regex;
use ssm::document::LineSpan;
use ssm::Document;

use super::{Candidate, CandidateKind, Extractor, RelationCandidate, node_groups};
use crate::capability::Capability;
use crate::error::ExtractError;
use crate::text::inline_lines;

/// `From --type--> To`, or the untyped `From --> To`.
static ARROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?P<from>.*?)\s*(?:--(?P<ty>[^>]*?)-->|-->)\s*(?P<to>.*?)\s*$").unwrap()
});

/// Explicit relation notation in paragraphs and list items. Endpoints stay
/// names here; the linker resolves them once blocks exist.
pub struct RelationExtractor;

impl Capability for RelationExtractor {
    fn name(&self) -> &'static str {
        "relations"
    }
}

impl Extractor for RelationExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for node in nodes {
                let Some(inlines) = node.kind.inlines() else {
                    continue;
                };
                for (offset, line) in inline_lines(inlines).into_iter().enumerate() {
                    let Some(candidate) = parse_arrow(&line) else {
                        continue;
                    };
                    let line_no = (node.span.start + offset as u32).min(node.span.end);
                    out.push(Candidate {
                        kind: CandidateKind::Relation(candidate),
                        chapter: node.chapter.clone(),
                        lines: LineSpan::single(line_no),
                        section: node.section.clone(),
                        extractor: self.name(),
                    });
                }
            }
        }
        Ok(out)
    }
}

fn parse_arrow(line: &str) -> Option<RelationCandidate> {
    if !line.contains("-->") {
        return None;
    }
    let caps = ARROW.captures(line)?;
    let part = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().trim().trim_matches('-').trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    Some(RelationCandidate {
        from: part("from"),
        to: part("to"),
        relation_type: part("ty"),
        evidence: line.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse;

    #[test]
    fn arrow_forms() {
        let full = parse_arrow("Borrowing --requires--> Ownership").unwrap();
        assert_eq!(full.from.as_deref(), Some("Borrowing"));
        assert_eq!(full.relation_type.as_deref(), Some("requires"));
        assert_eq!(full.to.as_deref(), Some("Ownership"));

        let spaced = parse_arrow("Module --is part of--> Crate").unwrap();
        assert_eq!(spaced.relation_type.as_deref(), Some("is part of"));

        let untyped = parse_arrow("Traits --> Generics").unwrap();
        assert_eq!(untyped.relation_type, None);
        assert_eq!(untyped.to.as_deref(), Some("Generics"));

        let dangling = parse_arrow("--uses--> Heap").unwrap();
        assert_eq!(dangling.from, None);

        assert!(parse_arrow("plain prose").is_none());
    }

    #[test]
    fn one_candidate_per_line() {
        let doc = parse("# Chapter 1: A\n\n- A --uses--> B\n- C --> D\n\nX --extends--> Y\nZ --causes--> W\n");
        let found = RelationExtractor.extract(&doc).unwrap();
        assert_eq!(found.len(), 4);
        assert_eq!(found[0].lines, LineSpan::single(3));
        assert_eq!(found[3].lines, LineSpan::single(7));
    }
}
