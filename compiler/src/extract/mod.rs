//! Structural extractors: read-only passes from the AST to typed candidates.

mod antipatterns;
mod code;
mod contrast;
mod diagrams;
mod prose;
mod rationale;
mod relations;
mod tables;
mod terms;

use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use ssm::document::{LineSpan, Node, NodeKind, plain_text};
use ssm::{BlockKind, ChapterCode, Diagnostic, Diagnostics, Document, Stage};

use crate::capability::Capability;
use crate::error::{ExtractError, panic_message};

pub use antipatterns::AntipatternExtractor;
pub use code::CodeExtractor;
pub use contrast::ContrastExtractor;
pub use diagrams::DiagramExtractor;
pub use prose::ProseExtractor;
pub use rationale::RationaleExtractor;
pub use relations::RelationExtractor;
pub use tables::TableExtractor;
pub use terms::TermExtractor;

/// Extractor names in registry order.
pub const EXTRACTOR_NAMES: [&str; 9] = [
    "prose",
    "terms",
    "code",
    "relations",
    "diagrams",
    "tables",
    "antipatterns",
    "rationale",
    "contrast",
];

pub fn is_known(name: &str) -> bool {
    EXTRACTOR_NAMES.contains(&name)
}

/// A pure `Document -> candidates` function for one concern.
pub trait Extractor: Capability + Send + Sync {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError>;
}

pub fn default_extractors() -> Vec<Box<dyn Extractor>> {
    vec![
        Box::new(ProseExtractor),
        Box::new(TermExtractor),
        Box::new(CodeExtractor),
        Box::new(RelationExtractor),
        Box::new(DiagramExtractor),
        Box::new(TableExtractor),
        Box::new(AntipatternExtractor),
        Box::new(RationaleExtractor),
        Box::new(ContrastExtractor),
    ]
}

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub chapter: Option<ChapterCode>,
    pub lines: LineSpan,
    pub section: Option<String>,
    pub extractor: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CandidateKind {
    Block { kind: BlockKind, body: String },
    Relation(RelationCandidate),
}

/// An explicit relation as written in the source, endpoints still by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCandidate {
    pub from: Option<String>,
    pub to: Option<String>,
    pub relation_type: Option<String>,
    pub evidence: String,
}

impl Candidate {
    pub fn block(extractor: &'static str, node: &Node, kind: BlockKind, body: impl Into<String>) -> Self {
        Candidate {
            kind: CandidateKind::Block {
                kind,
                body: body.into(),
            },
            chapter: node.chapter.clone(),
            lines: node.span,
            section: node.section.clone(),
            extractor,
        }
    }

    pub fn spanning(mut self, end: &Node) -> Self {
        self.lines = LineSpan::new(self.lines.start, end.span.end);
        self
    }
}

// ---------------------------------------------------------------------------
// Running
// ---------------------------------------------------------------------------

/// Run `extractors` over `document` and fan their candidates in, in registry
/// order. A failing or panicking extractor contributes nothing and leaves a
/// warning.
pub fn run_extractors(
    extractors: &[&dyn Extractor],
    document: &Document,
    parallel: bool,
    diagnostics: &mut Diagnostics,
) -> Vec<Candidate> {
    let run_one = |extractor: &&dyn Extractor| {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(document)));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(ExtractError::new(
                extractor.name(),
                format!("panicked: {}", panic_message(payload.as_ref())),
            )),
        };
        (extractor.name(), result)
    };

    let results: Vec<(&'static str, Result<Vec<Candidate>, ExtractError>)> = if parallel {
        extractors.par_iter().map(run_one).collect()
    } else {
        extractors.iter().map(run_one).collect()
    };

    let mut candidates = Vec::new();
    for (name, result) in results {
        match result {
            Ok(found) => {
                tracing::debug!(extractor = name, candidates = found.len(), "extractor finished");
                candidates.extend(found);
            }
            Err(err) => {
                tracing::warn!(extractor = name, error = %err, "extractor failed");
                diagnostics.push(Diagnostic::warning(Stage::Extract, "extractor-failed", err.to_string()));
            }
        }
    }
    candidates
}

// ---------------------------------------------------------------------------
// Helpers shared by extractors
// ---------------------------------------------------------------------------

/// Preamble then each chapter, as node slices.
pub(crate) fn node_groups(document: &Document) -> impl Iterator<Item = &[Node]> {
    std::iter::once(document.preamble.as_slice()).chain(document.chapters.iter().map(|c| c.nodes.as_slice()))
}

/// Plain text of a paragraph or list item.
pub(crate) fn prose_text(node: &Node) -> Option<String> {
    node.kind.plain_text().filter(|text| !text.is_empty())
}

/// Caption from the paragraph right before `nodes[i]`, when it ends with `:`.
pub(crate) fn caption_before(nodes: &[Node], i: usize) -> Option<String> {
    let prev = nodes.get(i.checked_sub(1)?)?;
    let NodeKind::Paragraph(inlines) = &prev.kind else {
        return None;
    };
    let text = plain_text(inlines);
    let caption = text.strip_suffix(':')?.trim();
    if caption.is_empty() { None } else { Some(caption.to_string()) }
}

#[cfg(test)]
pub(crate) fn parse(text: &str) -> Document {
    let mut diagnostics = Diagnostics::new();
    ssm::Parser::new(text).parse(&mut diagnostics).expect("test document parses")
}
