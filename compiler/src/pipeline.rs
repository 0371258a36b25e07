//! Compile driver: parse, extract, assemble, link, enrich, finalize,
//! serialize, with the incremental cache consulted before extraction and
//! written after a clean compile.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ssm::block::index::BlockSet;
use ssm::hash::sha256_hex;
use ssm::symbols::SymbolTable;
use ssm::{Block, ChapterCode, Diagnostic, Diagnostics, Document, Parser, Stage};

use crate::assemble::assemble;
use crate::cache::{CacheStore, ChapterHash, ChapterState, CompileState};
use crate::capability::{self, CapabilityKind, CapabilityStatus};
use crate::config::CompileOptions;
use crate::enrich::{Pass, default_passes, run_passes};
use crate::error::CompileError;
use crate::extract::{Extractor, default_extractors, run_extractors};
use crate::finalize::finalize;
use crate::link::{Resolutions, link};
use crate::outline::Outline;
use crate::report::Report;
use crate::serialize::serialize;

/// The result of one compile job. Produced whenever the input could be read
/// and parsed, errors included; check [`Compilation::is_success`].
#[derive(Debug)]
pub struct Compilation {
    pub output: String,
    pub blocks: Vec<Block>,
    pub diagnostics: Diagnostics,
    pub report: Report,
    pub state: CompileState,
    /// Set when a cache was consulted.
    pub cache_path: Option<PathBuf>,
    /// Chapters taken from the cache instead of recompiled.
    pub reused: BTreeSet<ChapterCode>,
}

impl Compilation {
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Extraction through linking, for one choice of frozen chapters.
struct FrontEnd {
    blocks: BlockSet,
    symbols: SymbolTable,
    resolutions: Resolutions,
    diagnostics: Diagnostics,
}

pub struct Compiler {
    options: CompileOptions,
    extractors: Vec<Box<dyn Extractor>>,
    passes: Vec<Box<dyn Pass>>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Compiler {
            options,
            extractors: default_extractors(),
            passes: default_passes(),
        }
    }

    /// Replace the extractor registry.
    pub fn with_extractors(mut self, extractors: Vec<Box<dyn Extractor>>) -> Self {
        self.extractors = extractors;
        self
    }

    /// Replace the pass registry.
    pub fn with_passes(mut self, passes: Vec<Box<dyn Pass>>) -> Self {
        self.passes = passes;
        self
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Vec<CapabilityStatus> {
        let mut statuses = capability::describe(
            CapabilityKind::Extractor,
            &self.extractors,
            &self.options.extractors.disabled,
        );
        statuses.extend(capability::describe(
            CapabilityKind::Pass,
            &self.passes,
            &self.options.passes.disabled,
        ));
        statuses
    }

    pub fn compile_file(&self, path: &Path) -> Result<Compilation, CompileError> {
        let source = std::fs::read_to_string(path).map_err(|source| CompileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.compile_source(&source, Some(path))
    }

    /// Compile `source`. `path` names the namespace fallback and the cache
    /// sidecar; without it the cache is not used.
    pub fn compile_source(&self, source: &str, path: Option<&Path>) -> Result<Compilation, CompileError> {
        let mut diagnostics = Diagnostics::new();
        let document = Parser::new(source).parse(&mut diagnostics)?;
        let outline = Outline::from_document(&document);
        let namespace = self.options.namespace_for(path);

        let extractors = capability::select(
            CapabilityKind::Extractor,
            &self.extractors,
            &self.options.extractors.disabled,
            &mut diagnostics,
        );
        let passes = capability::select(
            CapabilityKind::Pass,
            &self.passes,
            &self.options.passes.disabled,
            &mut diagnostics,
        );

        let store = path
            .filter(|_| self.options.cache.enabled)
            .map(|path| CacheStore::for_source(path, self.options.cache.dir.as_deref()));
        let cached = store.as_ref().and_then(|store| match store.load() {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring cache");
                diagnostics.push(Diagnostic::warning(Stage::Cache, "cache-load-failed", err.to_string()));
                None
            }
        });

        let mut frozen = cached
            .as_ref()
            .map(|state| state.reusable_chapters(&outline, &namespace))
            .unwrap_or_default();
        let front = loop {
            let front = self.front_end(&document, &outline, &extractors, cached.as_ref(), &frozen, &namespace);
            let stale = match &cached {
                Some(state) if !frozen.is_empty() => state.stale_resolutions(&frozen, &front.symbols, &namespace),
                _ => BTreeSet::new(),
            };
            if stale.is_empty() {
                break front;
            }
            tracing::debug!(chapters = stale.len(), "cached chapters resolve differently, recompiling them");
            frozen.retain(|code| !stale.contains(code));
        };
        let FrontEnd {
            mut blocks,
            symbols,
            resolutions,
            diagnostics: front_diagnostics,
        } = front;
        diagnostics.extend(front_diagnostics.into_vec());
        if let Some(state) = &cached {
            for code in &frozen {
                diagnostics.extend(state.reused_diagnostics(code, &outline));
            }
        }

        run_passes(&passes, &mut blocks, &outline, &symbols, &frozen, &namespace, &mut diagnostics);
        finalize(&mut blocks, &outline, &symbols, &namespace, &mut diagnostics);

        let blocks = blocks.into_blocks();
        let output = serialize(&blocks, &namespace);
        let state = snapshot(
            source,
            &blocks,
            &outline,
            resolutions,
            &diagnostics,
            &frozen,
            cached.as_ref(),
            &namespace,
        );

        if let Some(store) = &store {
            if diagnostics.has_errors() {
                tracing::debug!("compile had errors, cache left untouched");
            } else if let Err(err) = store.save(&state) {
                tracing::warn!(error = %err, "cache not written");
                diagnostics.push(Diagnostic::warning(Stage::Io, "cache-write-failed", err.to_string()));
            }
        }

        let report = Report::build(&blocks, &diagnostics, &namespace, outline.len(), frozen.len());
        tracing::info!(
            blocks = blocks.len(),
            chapters = outline.len(),
            reused = frozen.len(),
            errors = report.summary.error_count,
            warnings = report.summary.warning_count,
            "compiled document"
        );

        Ok(Compilation {
            output,
            blocks,
            diagnostics,
            report,
            state,
            cache_path: store.map(|store| store.path().to_path_buf()),
            reused: frozen,
        })
    }

    fn front_end(
        &self,
        document: &Document,
        outline: &Outline,
        extractors: &[&dyn Extractor],
        cached: Option<&CompileState>,
        frozen: &BTreeSet<ChapterCode>,
        namespace: &str,
    ) -> FrontEnd {
        let mut diagnostics = Diagnostics::new();
        let live = document.without_chapters(frozen);
        let candidates = run_extractors(extractors, &live, self.options.parallel_extractors, &mut diagnostics);
        let reused = match cached {
            Some(state) => frozen
                .iter()
                .flat_map(|code| state.reused_blocks(code, outline))
                .collect(),
            None => Vec::new(),
        };
        let mut assembly = assemble(document, outline, candidates, reused, frozen, namespace);
        let relations = std::mem::take(&mut assembly.relations);
        let resolutions = link(
            &mut assembly.blocks,
            relations,
            &assembly.symbols,
            outline,
            frozen,
            namespace,
            &mut diagnostics,
        );
        FrontEnd {
            blocks: assembly.blocks,
            symbols: assembly.symbols,
            resolutions,
            diagnostics,
        }
    }
}

/// Cache state describing this compile. Frozen chapters keep their recorded
/// lookups and timestamps.
#[allow(clippy::too_many_arguments)]
fn snapshot(
    source: &str,
    blocks: &[Block],
    outline: &Outline,
    mut resolutions: Resolutions,
    diagnostics: &Diagnostics,
    frozen: &BTreeSet<ChapterCode>,
    previous: Option<&CompileState>,
    namespace: &str,
) -> CompileState {
    let now = Utc::now();
    let chapters = outline
        .iter()
        .map(|info| {
            let code = &info.code;
            let owned: Vec<Block> = blocks
                .iter()
                .filter(|b| b.chapter.as_ref() == Some(code))
                .cloned()
                .collect();
            let stored = previous
                .filter(|_| frozen.contains(code))
                .and_then(|state| state.chapters.get(code));
            let chapter_resolutions = match stored {
                Some(stored) => stored.resolutions.clone(),
                None => resolutions.remove(code).unwrap_or_default(),
            };
            let chapter_diagnostics = diagnostics
                .iter()
                .filter(|d| d.chapter.as_ref() == Some(code))
                .filter(|d| matches!(d.stage, Stage::Extract | Stage::Link | Stage::Enrich))
                .cloned()
                .collect();
            let (prev, next) = outline.neighbours(code);
            let state = ChapterState {
                hash: ChapterHash {
                    chapter_code: code.clone(),
                    content_hash: info.content_hash.clone(),
                    line_range: info.span,
                    block_count: owned.len(),
                    last_modified: stored.map_or(now, |s| s.hash.last_modified),
                },
                prev,
                next,
                blocks: owned,
                resolutions: chapter_resolutions,
                diagnostics: chapter_diagnostics,
            };
            (code.clone(), state)
        })
        .collect();

    CompileState {
        source_hash: sha256_hex(source),
        compiler_version: crate::COMPILER_VERSION.to_string(),
        schema_version: ssm::SCHEMA_VERSION.to_string(),
        namespace: namespace.to_string(),
        total_blocks: blocks.len(),
        cached_block_ids: blocks.iter().filter_map(|b| b.id.clone()).collect(),
        chapters,
    }
}
