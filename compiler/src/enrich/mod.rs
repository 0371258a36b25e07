//! Enrichment pipeline: ordered, in-place passes over the assembled blocks.
//!
//! Passes run strictly in registry order and each may rely on the ones
//! before it. Every pass touches only live (non-frozen) chapters and is
//! idempotent, so running the pipeline twice adds nothing the second time.

mod attribution;
mod chains;
mod cleanup;
mod constraints;
mod graph;
mod links;
mod metadata;
mod qa;
mod summary;

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};

use ssm::block::index::BlockSet;
use ssm::symbols::SymbolTable;
use ssm::{Block, BlockKind, ChapterCode, Diagnostic, Diagnostics, Stage};

use crate::assemble::stamp_provenance;
use crate::capability::Capability;
use crate::error::{PassError, panic_message};
use crate::outline::Outline;

pub use attribution::ChapterAttribution;
pub use chains::ReasoningChains;
pub use cleanup::Cleanup;
pub use constraints::ConstraintExtraction;
pub use graph::ConceptGraph;
pub use links::BidirectionalLinks;
pub use metadata::EmbeddingMetadata;
pub use qa::QaSynthesis;
pub use summary::ChapterSummary;

pub const PASS_NAMES: [&str; 9] = [
    "bidirectional-links",
    "embedding-metadata",
    "chapter-summary",
    "reasoning-chains",
    "qa-synthesis",
    "constraint-extraction",
    "concept-graph",
    "chapter-attribution",
    "cleanup",
];

pub trait Pass: Capability + Send + Sync {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError>;
}

pub fn default_passes() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(BidirectionalLinks),
        Box::new(EmbeddingMetadata),
        Box::new(ChapterSummary),
        Box::new(ReasoningChains),
        Box::new(QaSynthesis),
        Box::new(ConstraintExtraction),
        Box::new(ConceptGraph),
        Box::new(ChapterAttribution),
        Box::new(Cleanup),
    ]
}

/// Everything a pass may read, plus the blocks it mutates.
pub struct PassContext<'a> {
    pub blocks: &'a mut BlockSet,
    pub outline: &'a Outline,
    pub symbols: &'a SymbolTable,
    pub frozen: &'a BTreeSet<ChapterCode>,
    pub namespace: &'a str,
    pub diagnostics: &'a mut Diagnostics,
}

impl PassContext<'_> {
    /// Whether blocks of `chapter` may be created or changed. Document-global
    /// blocks are always live.
    pub fn is_live(&self, chapter: Option<&ChapterCode>) -> bool {
        is_live(self.frozen, chapter)
    }

    /// Live chapters in document order.
    pub fn live_chapters(&self) -> Vec<ChapterCode> {
        self.outline
            .iter()
            .map(|c| c.code.clone())
            .filter(|c| !self.frozen.contains(c))
            .collect()
    }

    /// A derived block: fresh index, provenance stamped, no id until the
    /// finalizer assigns one.
    pub fn derive(&mut self, kind: BlockKind, body: impl Into<String>, chapter: Option<ChapterCode>) -> Block {
        let mut block = Block::new(kind, body, self.blocks.allocate_index()).in_chapter(chapter);
        stamp_provenance(&mut block, self.namespace);
        block
    }
}

pub(crate) fn is_live(frozen: &BTreeSet<ChapterCode>, chapter: Option<&ChapterCode>) -> bool {
    chapter.is_none_or(|c| !frozen.contains(c))
}

/// Run `passes` in order. A pass that errors or panics is rolled back to the
/// blocks as they stood before it and reported as `pass-failed`.
pub fn run_passes(
    passes: &[&dyn Pass],
    blocks: &mut BlockSet,
    outline: &Outline,
    symbols: &SymbolTable,
    frozen: &BTreeSet<ChapterCode>,
    namespace: &str,
    diagnostics: &mut Diagnostics,
) {
    for pass in passes {
        let snapshot = blocks.clone();
        let mut local = Diagnostics::new();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut cx = PassContext {
                blocks: &mut *blocks,
                outline,
                symbols,
                frozen,
                namespace,
                diagnostics: &mut local,
            };
            pass.run(&mut cx)
        }));
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(PassError::new(
                pass.name(),
                format!("panicked: {}", panic_message(payload.as_ref())),
            )),
        };
        match result {
            Ok(()) => {
                blocks.rebuild_index();
                tracing::debug!(pass = pass.name(), blocks = blocks.len(), "pass finished");
                diagnostics.extend(local.into_vec());
            }
            Err(err) => {
                tracing::warn!(pass = pass.name(), error = %err, "pass failed, rolled back");
                *blocks = snapshot;
                diagnostics.push(Diagnostic::error(Stage::Enrich, "pass-failed", err.to_string()));
            }
        }
    }
}
