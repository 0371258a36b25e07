use ssm::document::{InlineNode, NodeKind, plain_text};
use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, node_groups};
use crate::capability::Capability;
use crate::error::ExtractError;

const MAX_TERM_CHARS: usize = 60;

/// Bold-led definitions and glossary tables.
pub struct TermExtractor;

impl Capability for TermExtractor {
    fn name(&self) -> &'static str {
        "terms"
    }
}

impl Extractor for TermExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for node in nodes {
                match &node.kind {
                    NodeKind::Paragraph(inlines) | NodeKind::ListItem { content: inlines, .. } => {
                        if let Some((name, definition)) = bold_definition(inlines) {
                            out.push(Candidate::block(self.name(), node, BlockKind::Term { name }, definition));
                        }
                    }
                    NodeKind::Table { headers, rows } if is_glossary(headers) => {
                        for row in rows {
                            let name = row.first().map(|c| plain_text(c)).unwrap_or_default();
                            let definition = row.get(1).map(|c| plain_text(c)).unwrap_or_default();
                            if valid_name(&name) && !definition.is_empty() {
                                out.push(Candidate::block(self.name(), node, BlockKind::Term { name }, definition));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(out)
    }
}

/// A two-column table headed `Term | Definition` (or close synonyms).
pub(crate) fn is_glossary(headers: &[Vec<InlineNode>]) -> bool {
    let header = |i: usize| {
        headers
            .get(i)
            .map(|cell| plain_text(cell).to_lowercase())
            .unwrap_or_default()
    };
    matches!(header(0).as_str(), "term" | "name" | "concept")
        && matches!(header(1).as_str(), "definition" | "meaning" | "description")
}

/// `**Term**: def`, `**Term** — def` or `**Term** is ...`.
fn bold_definition(inlines: &[InlineNode]) -> Option<(String, String)> {
    let (first, rest) = inlines.split_first()?;
    let InlineNode::Strong(children) = first else {
        return None;
    };
    let name = plain_text(children);
    let name = name.trim_end_matches(':').trim().to_string();
    if !valid_name(&name) {
        return None;
    }
    let rest = plain_text(rest);
    // A colon inside the bold text, `**Term:** def`, counts as a separator.
    let separated_inside = plain_text(children).trim_end().ends_with(':');
    let definition = if separated_inside {
        rest
    } else if let Some(def) = rest.strip_prefix([':', '—', '–', '-']) {
        def.trim().to_string()
    } else if rest.starts_with("is ") || rest.starts_with("are ") {
        format!("{} {}", name, rest)
    } else {
        return None;
    };
    if definition.is_empty() {
        None
    } else {
        Some((name, definition))
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().count() <= MAX_TERM_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CandidateKind, parse};

    fn terms(text: &str) -> Vec<(String, String)> {
        TermExtractor
            .extract(&parse(text))
            .unwrap()
            .into_iter()
            .filter_map(|c| match c.kind {
                CandidateKind::Block {
                    kind: BlockKind::Term { name },
                    body,
                } => Some((name, body)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bold_definitions() {
        let found = terms(
            "# Chapter 1: A\n\n**Crate**: a compilation unit.\n\n- **Borrow** — a reference to a value.\n\n**Trait** is a set of methods.\n\n**Note** this is not a definition.\n\n**Lifetime:** how long a reference lives.\n",
        );
        assert_eq!(
            found,
            vec![
                ("Crate".into(), "a compilation unit.".into()),
                ("Borrow".into(), "a reference to a value.".into()),
                ("Trait".into(), "Trait is a set of methods.".into()),
                ("Lifetime".into(), "how long a reference lives.".into()),
            ]
        );
    }

    #[test]
    fn glossary_tables() {
        let found = terms(
            "# Chapter 1: A\n\n| Term | Definition |\n|---|---|\n| Move | Transfer of ownership |\n| Copy | Bitwise duplicate |\n",
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[1], ("Copy".into(), "Bitwise duplicate".into()));
    }
}
