//! Content-addressed block ids.
//!
//! ```text
//! id = <type prefix> "-" hex(SHA-256("ssm/1" NUL type NUL chapter NUL salient NUL occurrence))[..12]
//! ```
//!
//! `salient` is normalized (lowercase, collapsed whitespace, at most
//! [`SALIENT_LIMIT`] chars). `occurrence` counts earlier blocks in the same
//! chapter with the same type and salient content, so positions are
//! chapter-relative and edits elsewhere in the document never move an id.

use std::collections::HashMap;

use crate::block::{BlockId, BlockType};
use crate::document::ChapterCode;
use crate::hash::sha256_parts;

pub const ID_SCHEME: &str = "ssm/1";
pub const SALIENT_LIMIT: usize = 256;
const ID_HEX_LEN: usize = 12;

/// Lowercase, collapse whitespace, truncate to [`SALIENT_LIMIT`] chars.
pub fn normalize_salient(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed.chars().take(SALIENT_LIMIT).collect()
}

pub fn content_id(
    block_type: BlockType,
    chapter: Option<&ChapterCode>,
    normalized_salient: &str,
    occurrence: u32,
) -> BlockId {
    let chapter = chapter.map(ChapterCode::as_str).unwrap_or("-");
    let occurrence = occurrence.to_string();
    let digest = sha256_parts([
        ID_SCHEME,
        block_type.as_str(),
        chapter,
        normalized_salient,
        occurrence.as_str(),
    ]);
    BlockId::new(format!("{}-{}", block_type.id_prefix(), &digest[..ID_HEX_LEN]))
}

/// Hands out chapter-relative occurrence numbers for identical salient content.
#[derive(Debug, Default)]
pub struct OccurrenceCounter {
    seen: HashMap<(BlockType, Option<ChapterCode>, String), u32>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next occurrence number for this key, starting at 0.
    pub fn next(
        &mut self,
        block_type: BlockType,
        chapter: Option<&ChapterCode>,
        normalized_salient: &str,
    ) -> u32 {
        let slot = self
            .seen
            .entry((block_type, chapter.cloned(), normalized_salient.to_string()))
            .or_insert(0);
        let occurrence = *slot;
        *slot += 1;
        occurrence
    }

    /// Convenience: normalize, count, and hash in one step.
    pub fn assign(
        &mut self,
        block_type: BlockType,
        chapter: Option<&ChapterCode>,
        salient: &str,
    ) -> BlockId {
        let normalized = normalize_salient(salient);
        let occurrence = self.next(block_type, chapter, &normalized);
        content_id(block_type, chapter, &normalized, occurrence)
    }
}
