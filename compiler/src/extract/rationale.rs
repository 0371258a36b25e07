use ssm::{BlockKind, Document};

use super::{Candidate, Extractor, node_groups, prose_text};
use crate::capability::Capability;
use crate::error::ExtractError;
use crate::text::strip_prefix_ci;

const PREFIXES: &[(&str, &str)] = &[("rationale:", "rationale"), ("why:", "why"), ("reason:", "reason")];

/// Explicit `Rationale:`/`Why:`/`Reason:` notes. A reason given in running
/// prose stays part of its fact.
pub struct RationaleExtractor;

impl Capability for RationaleExtractor {
    fn name(&self) -> &'static str {
        "rationale"
    }
}

impl Extractor for RationaleExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for node in nodes {
                let Some(text) = prose_text(node) else {
                    continue;
                };
                let Some((body, trigger)) = PREFIXES
                    .iter()
                    .find_map(|(prefix, trigger)| strip_prefix_ci(&text, prefix).map(|b| (b, *trigger)))
                else {
                    continue;
                };
                if !body.is_empty() {
                    let kind = BlockKind::Rationale {
                        trigger: trigger.to_string(),
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

    fn rationales(text: &str) -> Vec<(String, String)> {
        RationaleExtractor
            .extract(&parse(text))
            .unwrap()
            .into_iter()
            .filter_map(|c| match c.kind {
                CandidateKind::Block {
                    kind: BlockKind::Rationale { trigger },
                    body,
                } => Some((trigger, body)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn explicit_prefixes() {
        let found = rationales(
            "# Chapter 1: A\n\nWhy: moves avoid double frees.\n\n- Reason: the borrow checker runs at compile time.\n\nRationale:\n",
        );
        assert_eq!(
            found,
            vec![
                ("why".into(), "moves avoid double frees.".into()),
                ("reason".into(), "the borrow checker runs at compile time.".into()),
            ]
        );
    }

    #[test]
    fn reasons_in_running_prose_are_not_rationales() {
        let found = rationales(
            "# Chapter 1: A\n\nValues drop at scope end because ownership is tracked, so that memory is freed exactly once. The reason is simple.\n",
        );
        assert!(found.is_empty(), "{found:?}");
    }
}
