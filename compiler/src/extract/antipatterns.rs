use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, node_groups, prose_text};
use crate::capability::Capability;
use crate::error::ExtractError;
use crate::text::strip_prefix_ci;

const MARKERS: &[&str] = &["anti-pattern:", "antipattern:", "avoid:", "don't:", "don’t:"];
const FIX_MARKERS: &[&str] = &["instead:", "do:", "fix:"];

pub struct AntipatternExtractor;

impl Capability for AntipatternExtractor {
    fn name(&self) -> &'static str {
        "antipatterns"
    }
}

impl Extractor for AntipatternExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                let Some(text) = prose_text(node) else {
                    continue;
                };
                let Some(body) = strip_marker(&text, "❌", MARKERS) else {
                    continue;
                };
                let fix_node = nodes
                    .get(i + 1)
                    .and_then(|next| prose_text(next).map(|t| (next, t)))
                    .and_then(|(next, t)| strip_marker(&t, "✅", FIX_MARKERS).map(|fix| (next, fix)));
                let candidate = match fix_node {
                    Some((next, fix)) => Candidate::block(
                        self.name(),
                        node,
                        BlockKind::Antipattern { fix: Some(fix) },
                        body,
                    )
                    .spanning(next),
                    None => Candidate::block(self.name(), node, BlockKind::Antipattern { fix: None }, body),
                };
                out.push(candidate);
            }
        }
        Ok(out)
    }
}

/// Text after an emoji or word marker, when present and non-empty.
fn strip_marker(text: &str, emoji: &str, words: &[&str]) -> Option<String> {
    let rest = match text.strip_prefix(emoji) {
        Some(rest) => rest.trim_start_matches([':', ' ']).trim(),
        None => words.iter().find_map(|w| strip_prefix_ci(text, w))?,
    };
    if rest.is_empty() { None } else { Some(rest.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CandidateKind, parse};
    use ssm::document::LineSpan;

    #[test]
    fn antipatterns_pick_up_fixes() {
        let doc = parse(
            "# Chapter 1: A\n\n- ❌ Calling unwrap on user input\n- ✅ Propagate the error with ?\n\nAvoid: global mutable state.\n\nUnrelated text.\n",
        );
        let found = AntipatternExtractor.extract(&doc).unwrap();
        let pairs: Vec<(String, Option<String>, LineSpan)> = found
            .into_iter()
            .filter_map(|c| match c.kind {
                CandidateKind::Block {
                    kind: BlockKind::Antipattern { fix },
                    body,
                } => Some((body, fix, c.lines)),
                _ => None,
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "Calling unwrap on user input".into(),
                    Some("Propagate the error with ?".into()),
                    LineSpan::new(3, 4)
                ),
                ("global mutable state.".into(), None, LineSpan::single(6)),
            ]
        );
    }
}
