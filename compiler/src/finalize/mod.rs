//! Finalizer: deduplicate, prune dangling references, sort canonically,
//! assign ids, validate. Always in that order; validation only reports.

mod dedupe;
mod ids;
mod prune;
mod sort;
mod validate;

use ssm::block::index::BlockSet;
use ssm::symbols::SymbolTable;
use ssm::Diagnostics;

use crate::outline::Outline;

pub use dedupe::dedupe;
pub use ids::{DERIVED_SALIENT_CHARS, assign_ids};
pub use prune::prune_dangling;
pub use sort::{SortKey, canonical_sort, sort_key};
pub use validate::validate;

pub fn finalize(
    blocks: &mut BlockSet,
    outline: &Outline,
    symbols: &SymbolTable,
    namespace: &str,
    diagnostics: &mut Diagnostics,
) {
    let before = blocks.len();
    let merged = dedupe(blocks, outline);
    prune_dangling(blocks, diagnostics);
    canonical_sort(blocks, outline);
    assign_ids(blocks, diagnostics);
    validate(blocks, symbols, namespace, diagnostics);
    tracing::debug!(before, after = blocks.len(), merged, "finalized blocks");
}
