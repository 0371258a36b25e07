//! Incremental cache: one JSON sidecar per source document.
//!
//! A chapter is reused when its text, its neighbours, the compiler and schema
//! versions and the namespace are all unchanged, and every symbol lookup it
//! made outside itself still resolves to the same block. Reused chapters
//! skip extraction, prose linking and enrichment; their finalized blocks are
//! fed back into assembly.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ssm::document::LineSpan;
use ssm::hash::sha256_hex;
use ssm::symbols::SymbolTable;
use ssm::{Block, BlockId, BlockKind, ChapterCode, Diagnostic};

use crate::error::CacheError;
use crate::link::{Resolution, resolve_global};
use crate::outline::Outline;

pub const CACHE_SUFFIX: &str = "ssm-cache.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterHash {
    pub chapter_code: ChapterCode,
    pub content_hash: String,
    pub line_range: LineSpan,
    pub block_count: usize,
    pub last_modified: DateTime<Utc>,
}

/// Everything needed to reuse one chapter without recompiling it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterState {
    pub hash: ChapterHash,
    pub prev: Option<ChapterCode>,
    pub next: Option<ChapterCode>,
    /// Finalized blocks, absolute lines.
    pub blocks: Vec<Block>,
    pub resolutions: BTreeSet<Resolution>,
    /// Extraction, link and enrichment diagnostics raised for the chapter.
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileState {
    pub source_hash: String,
    pub compiler_version: String,
    pub schema_version: String,
    pub namespace: String,
    pub total_blocks: usize,
    pub cached_block_ids: Vec<BlockId>,
    pub chapters: BTreeMap<ChapterCode, ChapterState>,
}

impl CompileState {
    /// Whether anything in this state may be reused under `namespace`.
    pub fn is_compatible(&self, namespace: &str) -> bool {
        self.compiler_version == crate::COMPILER_VERSION
            && self.schema_version == ssm::SCHEMA_VERSION
            && self.namespace == namespace
    }

    /// Chapters whose text and neighbours are unchanged.
    pub fn reusable_chapters(&self, outline: &Outline, namespace: &str) -> BTreeSet<ChapterCode> {
        if !self.is_compatible(namespace) {
            tracing::debug!("cache is for another compiler, schema or namespace");
            return BTreeSet::new();
        }
        outline
            .iter()
            .filter(|info| {
                let Some(stored) = self.chapters.get(&info.code) else {
                    return false;
                };
                let (prev, next) = outline.neighbours(&info.code);
                stored.hash.content_hash == info.content_hash && stored.prev == prev && stored.next == next
            })
            .map(|info| info.code.clone())
            .collect()
    }

    /// Chapters among `frozen` with a recorded lookup that now resolves
    /// differently.
    pub fn stale_resolutions(
        &self,
        frozen: &BTreeSet<ChapterCode>,
        symbols: &SymbolTable,
        namespace: &str,
    ) -> BTreeSet<ChapterCode> {
        frozen
            .iter()
            .filter(|code| {
                self.chapters.get(*code).is_some_and(|stored| {
                    stored.resolutions.iter().any(|resolution| {
                        let now = resolve_global(symbols, namespace, &resolution.name).map(|(id, _)| id);
                        now != resolution.target
                    })
                })
            })
            .cloned()
            .collect()
    }

    /// Stored blocks of `code`, moved to where the chapter starts now.
    pub fn reused_blocks(&self, code: &ChapterCode, outline: &Outline) -> Vec<Block> {
        let (Some(stored), Some(info)) = (self.chapters.get(code), outline.get(code)) else {
            return Vec::new();
        };
        let delta = info.span.start as i64 - stored.hash.line_range.start as i64;
        stored.blocks.iter().map(|block| shift_block(block.clone(), delta)).collect()
    }

    /// Stored diagnostics of `code`, moved like its blocks.
    pub fn reused_diagnostics(&self, code: &ChapterCode, outline: &Outline) -> Vec<Diagnostic> {
        let (Some(stored), Some(info)) = (self.chapters.get(code), outline.get(code)) else {
            return Vec::new();
        };
        let delta = info.span.start as i64 - stored.hash.line_range.start as i64;
        stored
            .diagnostics
            .iter()
            .cloned()
            .map(|mut diagnostic| {
                diagnostic.line = diagnostic.line.map(|line| (line as i64 + delta).max(1) as u32);
                diagnostic
            })
            .collect()
    }
}

fn shift_block(mut block: Block, delta: i64) -> Block {
    if delta == 0 {
        return block;
    }
    block.lines = block.lines.map(|lines| lines.shifted(delta));
    if let BlockKind::ChapterMeta { start_line, .. } = &mut block.kind {
        *start_line = (*start_line as i64 + delta).max(1) as u32;
    }
    block
}

/// Location of the cache sidecar for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    /// `<file name>.ssm-cache.json` next to the source, or inside `dir` with
    /// a short hash of the source path so equal file names do not clash.
    pub fn for_source(source: &Path, dir: Option<&Path>) -> Self {
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let path = match dir {
            Some(dir) => {
                let digest = sha256_hex(source.to_string_lossy().as_bytes());
                dir.join(format!("{}.{}.{}", file_name, &digest[..8], CACHE_SUFFIX))
            }
            None => source
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(format!("{}.{}", file_name, CACHE_SUFFIX)),
        };
        CacheStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when there is no cache yet.
    pub fn load(&self) -> Result<Option<CompileState>, CacheError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let state = serde_json::from_str(&text).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "loaded cache");
        Ok(Some(state))
    }

    /// Write through a temporary file and rename it into place, so readers
    /// never see a partial cache.
    pub fn save(&self, state: &CompileState) -> Result<(), CacheError> {
        let text = serde_json::to_string_pretty(state).map_err(CacheError::Encode)?;
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp_path = parent.join(format!(".{}.tmp", file_name));
        fs::write(&tmp_path, text).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            write_err(source)
        })?;
        tracing::debug!(path = %self.path.display(), chapters = state.chapters.len(), "saved cache");
        Ok(())
    }
}
