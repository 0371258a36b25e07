use std::sync::LazyLock;

use regex::Regex;
use ssm::document::NodeKind;
use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, node_groups, prose_text};
use crate::capability::Capability;
use crate::error::ExtractError;
use crate::text::sentences;

static VERSUS_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s+(?:vs\.?|versus)\s+(.+?)\s*$").unwrap());

static UNLIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:unlike|in contrast to)\s+([^,]+),\s*(.+)$").unwrap());

static WHEREAS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(.+?),?\s+whereas\s+(.+)$").unwrap());

/// Verbs that end the subject phrase of a clause.
static CLAUSE_VERB: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s(?:is|are|was|were|does|do|has|have|can|cannot|will|uses|use|lets|let|makes|make|must|should|requires|gives|keeps)\s").unwrap()
});

pub struct ContrastExtractor;

impl Capability for ContrastExtractor {
    fn name(&self) -> &'static str {
        "contrast"
    }
}

impl Extractor for ContrastExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                if let NodeKind::Section { title, .. } = &node.kind {
                    if let Some(caps) = VERSUS_HEADING.captures(title) {
                        let kind = BlockKind::Contrast {
                            left: caps[1].trim().to_string(),
                            right: caps[2].trim().to_string(),
                        };
                        let body = nodes
                            .get(i + 1)
                            .filter(|n| matches!(n.kind, NodeKind::Paragraph(_)))
                            .and_then(prose_text)
                            .unwrap_or_else(|| title.clone());
                        out.push(Candidate::block(self.name(), node, kind, body));
                    }
                    continue;
                }
                let Some(text) = prose_text(node) else {
                    continue;
                };
                for sentence in sentences(&text) {
                    if let Some((left, right)) = contrast_sides(&sentence) {
                        let kind = BlockKind::Contrast { left, right };
                        out.push(Candidate::block(self.name(), node, kind, sentence));
                    }
                }
            }
        }
        Ok(out)
    }
}

fn contrast_sides(sentence: &str) -> Option<(String, String)> {
    if let Some(caps) = UNLIKE.captures(sentence) {
        return sides(caps[1].trim(), &subject(&caps[2]));
    }
    let caps = WHEREAS.captures(sentence)?;
    sides(&subject(&caps[1]), &subject(&caps[2]))
}

fn sides(left: &str, right: &str) -> Option<(String, String)> {
    let clean = |s: &str| s.trim().trim_end_matches(['.', ',', ';']).to_string();
    let (left, right) = (clean(left), clean(right));
    if left.is_empty() || right.is_empty() || left.eq_ignore_ascii_case(&right) {
        None
    } else {
        Some((left, right))
    }
}

/// The words before the clause's first verb, or its first word.
fn subject(clause: &str) -> String {
    let clause = clause.trim();
    match CLAUSE_VERB.find(clause) {
        Some(m) => clause[..m.start()].trim().to_string(),
        None => clause.split_whitespace().next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CandidateKind, parse};

    fn contrasts(text: &str) -> Vec<(String, String)> {
        ContrastExtractor
            .extract(&parse(text))
            .unwrap()
            .into_iter()
            .filter_map(|c| match c.kind {
                CandidateKind::Block {
                    kind: BlockKind::Contrast { left, right },
                    ..
                } => Some((left, right)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn headings_and_sentences() {
        let found = contrasts(
            "# Chapter 1: A\n\n## Box vs Rc\n\nBox has one owner.\n\nUnlike C++, Rust checks lifetimes at compile time.\n\nA Vec is growable, whereas an array is fixed.\n",
        );
        assert_eq!(
            found,
            vec![
                ("Box".into(), "Rc".into()),
                ("C++".into(), "Rust".into()),
                ("A Vec".into(), "an array".into()),
            ]
        );
    }

    #[test]
    fn subjects_stop_at_verbs() {
        assert_eq!(subject("Rust is strict"), "Rust");
        assert_eq!(subject("borrowing"), "borrowing");
    }
}
