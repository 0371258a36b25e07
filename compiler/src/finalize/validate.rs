use std::sync::LazyLock;

use regex::Regex;
use ssm::block::index::BlockSet;
use ssm::symbols::SymbolTable;
use ssm::{Block, BlockKind, Diagnostic, Diagnostics, Stage};

/// `[[Name]]` cross-references in bodies.
static WIKI_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[([^\[\]]+)\]\]").unwrap());

/// Schema and reference checks. Never mutates blocks.
pub fn validate(blocks: &BlockSet, symbols: &SymbolTable, namespace: &str, diagnostics: &mut Diagnostics) {
    for block in blocks.iter() {
        let at = |diagnostic: Diagnostic| {
            let diagnostic = diagnostic.in_chapter(block.chapter.clone());
            match block.lines {
                Some(lines) => diagnostic.at_line(lines.start),
                None => diagnostic,
            }
        };
        let label = block.id.as_ref().map_or_else(|| block.block_type().to_string(), |id| id.to_string());

        for field in missing_fields(block) {
            diagnostics.push(at(Diagnostic::error(
                Stage::Finalize,
                "missing-field",
                format!("{} block {} is missing '{}'", block.block_type(), label, field),
            )));
        }

        if let Some(relation) = block.relation() {
            for endpoint in [&relation.from, &relation.to] {
                if !blocks.contains(endpoint) {
                    diagnostics.push(at(Diagnostic::error(
                        Stage::Finalize,
                        "dangling-relation",
                        format!("relation {} points at missing block {}", label, endpoint),
                    )));
                }
            }
        }

        for caps in WIKI_REFERENCE.captures_iter(&block.body) {
            let name = caps[1].trim();
            if symbols.resolve_any(namespace, name).is_none() {
                diagnostics.push(at(Diagnostic::warning(
                    Stage::Finalize,
                    "unresolved-reference",
                    format!("reference [[{}]] does not name a term, concept or chapter", name),
                )
                .with_context(caps[0].to_string())));
            }
        }
    }

    for duplicate in symbols.duplicates() {
        if blocks.contains(&duplicate.existing) && blocks.contains(&duplicate.duplicate) {
            diagnostics.push(
                Diagnostic::warning(
                    Stage::Finalize,
                    "duplicate-symbol",
                    format!(
                        "'{}' is defined by both {} and {}",
                        duplicate.name, duplicate.existing, duplicate.duplicate
                    ),
                )
                .in_chapter(duplicate.chapter.clone()),
            );
        }
    }
}

fn missing_fields(block: &Block) -> Vec<&'static str> {
    let blank = |s: &str| s.trim().is_empty();
    let mut missing = Vec::new();
    if block.id.is_none() {
        missing.push("id");
    }
    match &block.kind {
        BlockKind::Concept { title } if blank(title) => missing.push("title"),
        BlockKind::Term { name } if blank(name) => missing.push("name"),
        BlockKind::Rationale { trigger } if blank(trigger) => missing.push("trigger"),
        BlockKind::Contrast { left, right } => {
            if blank(left) {
                missing.push("left");
            }
            if blank(right) {
                missing.push("right");
            }
        }
        BlockKind::Diagram { notation, .. } if blank(notation) => missing.push("notation"),
        BlockKind::ReasoningChain { steps } if steps.is_empty() => missing.push("steps"),
        BlockKind::Qa { question } if blank(question) => missing.push("question"),
        BlockKind::Relation(relation) if blank(&relation.relation_type) => missing.push("relation_type"),
        _ => {}
    }
    let bodyless = matches!(
        block.kind,
        BlockKind::ChapterMeta { .. } | BlockKind::Relation(_) | BlockKind::Summary
    );
    if !bodyless && blank(&block.body) {
        missing.push("body");
    }
    missing
}
