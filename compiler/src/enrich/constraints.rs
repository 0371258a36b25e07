use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use ssm::block::Modality;
use ssm::{Block, BlockId, BlockKind, ChapterCode};

use super::{Pass, PassContext};
use crate::capability::Capability;
use crate::error::PassError;
use crate::text::{sentences, strip_prefix_ci};

const MARKERS: &[&str] = &["constraint:", "rule:", "invariant:"];

static MUST_NOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(must not|mustn't|shall not|never)\b").unwrap());
static SHOULD_NOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(should not|shouldn't)\b").unwrap());
static MUST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(must|always|shall)\b").unwrap());
static SHOULD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bshould\b").unwrap());

/// Strongest modality stated in `sentence`, negations first.
pub fn modality(sentence: &str) -> Option<Modality> {
    if MUST_NOT.is_match(sentence) {
        Some(Modality::MustNot)
    } else if SHOULD_NOT.is_match(sentence) {
        Some(Modality::ShouldNot)
    } else if MUST.is_match(sentence) {
        Some(Modality::Must)
    } else if SHOULD.is_match(sentence) {
        Some(Modality::Should)
    } else {
        None
    }
}

/// Body of a fact that opens with an explicit `Constraint:`/`Rule:`/`Invariant:` marker.
fn marked(body: &str) -> Option<&str> {
    MARKERS.iter().find_map(|marker| strip_prefix_ci(body, marker))
}

/// `constraint` blocks from rationales and from explicitly marked facts. In a
/// rationale only modal sentences count; in a marked fact every sentence
/// does, defaulting to `must`.
pub struct ConstraintExtraction;

impl Capability for ConstraintExtraction {
    fn name(&self) -> &'static str {
        "constraint-extraction"
    }
}

impl Pass for ConstraintExtraction {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        let mut known: BTreeSet<(String, String)> = cx
            .blocks
            .iter()
            .filter(|b| matches!(b.kind, BlockKind::Constraint { .. }))
            .filter_map(|b| b.meta("source").map(|s| (s.to_string(), b.body.clone())))
            .collect();

        let mut sources: Vec<(&Block, &str, bool)> = cx
            .blocks
            .iter()
            .filter(|b| b.id.is_some() && cx.is_live(b.chapter.as_ref()))
            .filter_map(|b| match &b.kind {
                BlockKind::Rationale { .. } => Some((b, b.body.as_str(), false)),
                BlockKind::Fact => marked(&b.body).map(|body| (b, body, true)),
                _ => None,
            })
            .collect();
        sources.sort_by_key(|(b, ..)| b.index);

        let mut found: Vec<(Modality, String, Option<ChapterCode>, BlockId, Option<String>)> = Vec::new();
        for (block, body, explicit) in sources {
            let Some(id) = &block.id else {
                continue;
            };
            for sentence in sentences(body) {
                let Some(modality) = modality(&sentence).or(explicit.then_some(Modality::Must)) else {
                    continue;
                };
                if known.insert((id.to_string(), sentence.clone())) {
                    let section = block.meta("section").map(str::to_string);
                    found.push((modality, sentence, block.chapter.clone(), id.clone(), section));
                }
            }
        }

        for (modality, sentence, chapter, source, section) in found {
            let mut block = cx.derive(BlockKind::Constraint { modality }, sentence, chapter);
            block.set_meta("source", source.to_string());
            if let Some(section) = section {
                block.set_meta("section", section);
            }
            block.links.insert(source);
            cx.blocks.push(block);
        }
        Ok(())
    }
}
