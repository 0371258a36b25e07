use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use ssm::{BlockId, BlockType, ChapterCode, Document, Severity};
use ssm_compiler::capability::Capability;
use ssm_compiler::enrich::{PASS_NAMES, Pass, PassContext, default_passes};
use ssm_compiler::error::{ExtractError, PassError};
use ssm_compiler::extract::{Candidate, EXTRACTOR_NAMES, Extractor, ProseExtractor, default_extractors};
use ssm_compiler::{Compilation, CompileOptions, CompileState, Compiler};

const NOTES: &str = "# Rust Notes

This preamble introduces the notes and explains how they are organised.

# Chapter 1: Ownership [Beginner]

## Moves

**Ownership**: every value has a single owner that drops it.

**Borrowing**: access to a value through a reference without taking ownership.

Borrowing requires Ownership to be tracked by the compiler at all times.

- Borrowing --requires--> Ownership

# Chapter 2: Lifetimes

## Scopes

**Lifetime**: the region of code where a reference is valid.

A Lifetime depends on the scope in which the borrowed value was declared.

- Lifetime --extends--> Borrowing
";

fn compile(source: &str) -> Compilation {
    Compiler::new(CompileOptions::default())
        .compile_source(source, None)
        .expect("document compiles")
}

fn compile_file(path: &Path, options: CompileOptions) -> Compilation {
    Compiler::new(options).compile_file(path).expect("document compiles")
}

fn uncached() -> CompileOptions {
    let mut options = CompileOptions::default();
    options.cache.enabled = false;
    options
}

/// Serialized records keyed by id.
fn records(output: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut current: Option<Vec<&str>> = None;
    for line in output.lines() {
        if line.starts_with(":::ssm ") {
            current = Some(vec![line]);
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
            if line == ":::" {
                let id = lines
                    .iter()
                    .find_map(|l| l.strip_prefix("id: "))
                    .expect("record has an id")
                    .to_string();
                out.insert(id, lines.join("\n"));
                current = None;
            }
        }
    }
    out
}

fn chapter_records(output: &str, code: &str) -> BTreeMap<String, String> {
    let marker = format!("\nchapter: {}\n", code);
    records(output)
        .into_iter()
        .filter(|(_, record)| record.contains(&marker))
        .collect()
}

fn count(compilation: &Compilation, block_type: BlockType) -> usize {
    compilation.blocks.iter().filter(|b| b.block_type() == block_type).count()
}

#[test]
fn plain_two_chapter_document() {
    let compilation = compile(
        "# Chapter 1: Basics

## Values

Values in Rust live on the stack unless they are boxed explicitly.

# Chapter 2: Modules

## Paths

Modules group related items and control their visibility to other code.
",
    );
    assert!(compilation.is_success());
    assert_eq!(count(&compilation, BlockType::ChapterMeta), 2);
    for block in &compilation.blocks {
        assert!(
            matches!(
                block.block_type(),
                BlockType::ChapterMeta | BlockType::Concept | BlockType::Fact
            ),
            "unexpected {} block",
            block.block_type()
        );
    }
    assert_eq!(compilation.report.summary.error_count, 0);
}

#[test]
fn everyday_prose_stays_plain() {
    let compilation = compile(
        "# Chapter 1: Ownership

## Moves

A value must always have exactly one owner, because the compiler frees it when that owner goes out of scope.

You should never rely on a moved value again. The reason is that its memory now belongs to someone else, so that double frees cannot happen.

# Chapter 2: Borrowing

## References

A shared reference must not outlive the value it points to, and this ensures that reads stay valid.
",
    );
    assert!(compilation.is_success());
    assert_eq!(count(&compilation, BlockType::ChapterMeta), 2);
    let types: Vec<BlockType> = compilation.blocks.iter().map(|b| b.block_type()).collect();
    assert!(
        types
            .iter()
            .all(|t| matches!(t, BlockType::ChapterMeta | BlockType::Concept | BlockType::Fact)),
        "{types:?}"
    );
    assert!(count(&compilation, BlockType::Fact) >= 3);
}

#[test]
fn untyped_relation_is_dropped_with_one_warning() {
    let compilation = compile(
        "# Chapter 1: Traits

**Traits**: shared behaviour that types can implement.

**Generics**: code that works over many types.

- Traits --> Generics
",
    );
    assert_eq!(count(&compilation, BlockType::Relation), 0);
    let warnings: Vec<&str> = compilation.diagnostics.warnings().map(|d| d.code.as_str()).collect();
    assert_eq!(warnings, ["relation-incomplete"]);
    assert!(compilation.is_success());
}

#[test]
fn recompiling_an_unchanged_document_reuses_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, NOTES).unwrap();

    let first = compile_file(&path, CompileOptions::default());
    let cache_path = first.cache_path.clone().unwrap();
    let stored: CompileState = serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();

    let second = compile_file(&path, CompileOptions::default());
    assert_eq!(second.report.summary.error_count, 0);
    assert_eq!(second.reused.len(), 2);
    assert_eq!(second.output, first.output);

    let restored: CompileState = serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(restored.source_hash, stored.source_hash);
    assert_eq!(restored.cached_block_ids, stored.cached_block_ids);
    for (code, chapter) in &restored.chapters {
        assert_eq!(chapter.hash.last_modified, stored.chapters[code].hash.last_modified);
    }
}

#[test]
fn duplicate_extraction_collapses() {
    struct ProseAgain;

    impl Capability for ProseAgain {
        fn name(&self) -> &'static str {
            "prose-again"
        }
    }

    impl Extractor for ProseAgain {
        fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
            ProseExtractor.extract(document)
        }
    }

    let baseline = compile(NOTES);
    let mut extractors = default_extractors();
    extractors.push(Box::new(ProseAgain));
    let doubled = Compiler::new(CompileOptions::default())
        .with_extractors(extractors)
        .compile_source(NOTES, None)
        .unwrap();

    for block_type in [BlockType::Concept, BlockType::Fact] {
        assert_eq!(count(&doubled, block_type), count(&baseline, block_type));
    }
    let mut seen = BTreeSet::new();
    for block in &doubled.blocks {
        let key = (block.block_type(), block.chapter.clone(), block.body.clone());
        if matches!(block.block_type(), BlockType::Concept | BlockType::Fact) {
            assert!(seen.insert(key), "duplicate {} survived", block.block_type());
        }
    }
    assert!(doubled.is_success());
}

#[test]
fn corrupt_cache_degrades_to_full_compile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, NOTES).unwrap();

    let first = compile_file(&path, CompileOptions::default());
    fs::write(first.cache_path.as_ref().unwrap(), "{ \"source_hash\": ").unwrap();

    let second = compile_file(&path, CompileOptions::default());
    assert!(second.is_success());
    assert!(second.reused.is_empty());
    assert_eq!(second.diagnostics.with_code("cache-load-failed").count(), 1);
    assert_eq!(second.output, first.output);

    // The rewritten cache is valid again.
    let third = compile_file(&path, CompileOptions::default());
    assert_eq!(third.reused.len(), 2);
}

#[test]
fn cold_compiles_are_byte_identical() {
    assert_eq!(compile(NOTES).output, compile(NOTES).output);
}

#[test]
fn parallel_extraction_matches_serial() {
    let options = CompileOptions {
        parallel_extractors: true,
        ..CompileOptions::default()
    };
    let parallel = Compiler::new(options).compile_source(NOTES, None).unwrap();
    assert_eq!(parallel.output, compile(NOTES).output);
}

#[test]
fn ids_survive_edits_in_later_chapters() {
    let extended = format!("{}\n# Chapter 3: Traits\n\n**Trait**: a set of shared methods.\n", NOTES);
    let ids = |c: &Compilation| -> BTreeSet<BlockId> {
        c.blocks
            .iter()
            .filter(|b| b.chapter == Some(ChapterCode::from_number(1)))
            .filter_map(|b| b.id.clone())
            .collect()
    };
    let before = compile(NOTES);
    let after = compile(&extended);
    assert!(!ids(&before).is_empty());
    assert_eq!(ids(&before), ids(&after));
}

#[test]
fn relations_and_links_resolve() {
    let compilation = compile(NOTES);
    let ids: BTreeSet<&BlockId> = compilation.blocks.iter().filter_map(|b| b.id.as_ref()).collect();
    assert_eq!(ids.len(), compilation.blocks.len(), "ids are unique");

    let mut relations = 0;
    for block in &compilation.blocks {
        if let Some(relation) = block.relation() {
            relations += 1;
            assert!(ids.contains(&relation.from));
            assert!(ids.contains(&relation.to));
        }
        for link in &block.links {
            assert!(ids.contains(link), "dangling link {}", link);
        }
    }
    assert_eq!(relations, 2);
    assert!(compilation.output.contains("relation_type: extends"));
}

#[test]
fn editing_one_chapter_leaves_the_other_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, NOTES).unwrap();
    let first = compile_file(&path, CompileOptions::default());

    let edited = NOTES.replace(
        "Borrowing requires Ownership",
        "Moving a value transfers ownership to the new binding and invalidates the old one.\n\nBorrowing requires Ownership",
    );
    fs::write(&path, &edited).unwrap();
    let second = compile_file(&path, CompileOptions::default());

    assert_eq!(second.reused, BTreeSet::from([ChapterCode::from_number(2)]));
    assert_eq!(chapter_records(&second.output, "CH-02"), chapter_records(&first.output, "CH-02"));
    assert_ne!(chapter_records(&second.output, "CH-01"), chapter_records(&first.output, "CH-01"));

    assert_eq!(second.output, compile_file(&path, uncached()).output);
}

#[test]
fn a_new_definition_recompiles_chapters_that_looked_it_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    let original = NOTES.replace("- Lifetime --extends--> Borrowing", "- Lifetime --uses--> Heap");
    fs::write(&path, &original).unwrap();

    let first = compile_file(&path, CompileOptions::default());
    assert_eq!(first.diagnostics.with_code("relation-unresolved").count(), 1);

    let defined = original.replace(
        "- Borrowing --requires--> Ownership",
        "- Borrowing --requires--> Ownership\n\n**Heap**: memory for values whose size is known only at runtime.",
    );
    fs::write(&path, &defined).unwrap();
    let second = compile_file(&path, CompileOptions::default());

    assert!(second.reused.is_empty());
    assert_eq!(second.diagnostics.with_code("relation-unresolved").count(), 0);
    assert!(second.output.contains("relation_type: uses"));
    assert_eq!(second.output, compile_file(&path, uncached()).output);
}

#[test]
fn disabling_any_capability_keeps_a_clean_compile_clean() {
    let baseline = compile(NOTES);
    assert!(baseline.is_success());

    for name in EXTRACTOR_NAMES.iter().chain(PASS_NAMES.iter()) {
        let mut options = CompileOptions::default();
        options.disable(name);
        let compilation = Compiler::new(options).compile_source(NOTES, None).unwrap();
        assert!(compilation.is_success(), "disabling {} caused errors", name);
        assert!(
            compilation
                .diagnostics
                .with_code("capability-disabled")
                .any(|d| d.severity == Severity::Info && d.message.contains(*name)),
            "no notice for {}",
            name
        );
        if EXTRACTOR_NAMES.contains(name) {
            assert!(compilation.blocks.len() <= baseline.blocks.len(), "disabling {} added blocks", name);
        }
    }
}

#[test]
fn unknown_capability_names_warn() {
    let mut options = CompileOptions::default();
    options.disable("spellcheck");
    let compilation = Compiler::new(options).compile_source(NOTES, None).unwrap();
    assert_eq!(compilation.diagnostics.with_code("unknown-capability").count(), 1);
}

struct Exploding;

impl Capability for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }
}

impl Pass for Exploding {
    fn run(&self, cx: &mut PassContext<'_>) -> Result<(), PassError> {
        cx.blocks.retain(|_| false);
        panic!("boom");
    }
}

impl Extractor for Exploding {
    fn extract(&self, _document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        panic!("boom");
    }
}

#[test]
fn a_failing_pass_is_rolled_back_and_blocks_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    fs::write(&path, NOTES).unwrap();

    let mut passes = default_passes();
    passes.insert(1, Box::new(Exploding));
    let compilation = Compiler::new(CompileOptions::default())
        .with_passes(passes)
        .compile_file(&path)
        .unwrap();

    assert!(!compilation.is_success());
    assert_eq!(compilation.diagnostics.with_code("pass-failed").count(), 1);
    assert!(!compilation.blocks.is_empty());
    assert!(!compilation.cache_path.unwrap().exists());

    let clean = Compiler::new(CompileOptions::default()).compile_source(NOTES, None).unwrap();
    assert_eq!(
        compilation.blocks.len(),
        clean.blocks.len(),
        "later passes still ran on the rolled-back blocks"
    );
}

#[test]
fn a_panicking_extractor_only_warns() {
    let mut extractors = default_extractors();
    extractors.push(Box::new(Exploding));
    let compilation = Compiler::new(CompileOptions::default())
        .with_extractors(extractors)
        .compile_source(NOTES, None)
        .unwrap();
    assert!(compilation.is_success());
    assert_eq!(compilation.diagnostics.with_code("extractor-failed").count(), 1);
    assert_eq!(compilation.output, compile(NOTES).output);
}

#[test]
fn empty_input_is_fatal() {
    let result = Compiler::new(CompileOptions::default()).compile_source("  \n\n", None);
    assert!(result.is_err());
}

#[test]
fn missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let result = Compiler::new(CompileOptions::default()).compile_file(&dir.path().join("absent.md"));
    assert!(matches!(result, Err(ssm_compiler::CompileError::Read { .. })));
}

#[test]
fn report_counts_match_output() {
    let compilation = compile(NOTES);
    let report = &compilation.report;
    assert_eq!(report.summary.total_blocks, compilation.blocks.len());
    assert_eq!(report.summary.namespace, "default");
    assert_eq!(report.metrics.chapters, 2);
    assert_eq!(report.metrics.chapters_recompiled, 2);
    assert_eq!(report.metrics.relations, count(&compilation, BlockType::Relation));
    let by_type: usize = report.metrics.blocks_by_type.values().sum();
    assert_eq!(by_type, compilation.blocks.len());
}
