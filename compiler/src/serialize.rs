//! Blocks to SSM text.
//!
//! Output depends only on the block list and the namespace, so identical
//! finalized blocks always produce identical bytes.

use std::collections::HashMap;
use std::fmt::Write;

use ssm::{Block, BlockKind, ChapterCode};

use crate::assemble::PROVENANCE_KEYS;
use crate::text::one_line;

pub const FORMAT_TAG: &str = "%SSM";
pub const RECORD_OPEN: &str = ":::ssm";
pub const RECORD_CLOSE: &str = ":::";
pub const BODY_SEPARATOR: &str = "---";

/// Serialize finalized blocks, in the order given.
pub fn serialize(blocks: &[Block], namespace: &str) -> String {
    let origins = chapter_origins(blocks);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} namespace={} compiler={}",
        FORMAT_TAG,
        ssm::SCHEMA_VERSION,
        header_value(namespace),
        crate::COMPILER_VERSION
    );
    for block in blocks {
        out.push('\n');
        write_record(&mut out, block, &origins);
    }
    out
}

/// Header values are space-separated `key=value` pairs, so a value keeps
/// to one token.
fn header_value(value: &str) -> String {
    one_line(value).replace(' ', "_")
}

/// First line of each chapter, taken from its `chapter-meta` block.
fn chapter_origins(blocks: &[Block]) -> HashMap<&ChapterCode, u32> {
    blocks
        .iter()
        .filter_map(|block| match (&block.kind, &block.chapter) {
            (BlockKind::ChapterMeta { start_line, .. }, Some(code)) => Some((code, *start_line)),
            _ => None,
        })
        .collect()
}

fn write_record(out: &mut String, block: &Block, origins: &HashMap<&ChapterCode, u32>) {
    let _ = writeln!(out, "{} {}", RECORD_OPEN, block.block_type());
    let mut field = |key: &str, value: &str| {
        let value = one_line(value);
        if !value.is_empty() {
            let _ = writeln!(out, "{}: {}", key, value);
        }
    };

    if let Some(id) = &block.id {
        field("id", id.as_str());
    }
    if let Some(chapter) = &block.chapter {
        field("chapter", chapter.as_str());
    }
    if let Some(lines) = block.lines {
        let lines = match block.chapter.as_ref().and_then(|c| origins.get(c)) {
            Some(origin) => lines.relative_to(*origin),
            None => lines,
        };
        field("lines", &lines.to_string());
    }
    for (key, value) in block.kind.fields() {
        field(key, &value);
    }
    if !block.links.is_empty() {
        let links: Vec<&str> = block.links.iter().map(|id| id.as_str()).collect();
        field("links", &links.join(", "));
    }
    for (key, value) in &block.extra {
        if !PROVENANCE_KEYS.contains(&key.as_str()) {
            field(key, value);
        }
    }
    for key in PROVENANCE_KEYS {
        if let Some(value) = block.meta(key) {
            field(key, value);
        }
    }

    out.push_str(BODY_SEPARATOR);
    out.push('\n');
    // A leading backslash marks an escaped line; readers strip exactly one.
    for line in block.body.lines() {
        if line.starts_with(RECORD_CLOSE) || line == BODY_SEPARATOR || line.starts_with('\\') {
            out.push('\\');
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(RECORD_CLOSE);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use ssm::document::LineSpan;
    use ssm::BlockId;

    use crate::assemble::stamp_provenance;

    fn chapter_meta() -> Block {
        let mut block = Block::new(
            BlockKind::ChapterMeta {
                number: 1,
                title: Some("Basics".into()),
                difficulty: None,
                start_line: 10,
                line_count: 6,
                sections: 0,
            },
            "Chapter 1: Basics",
            0,
        )
        .in_chapter(Some(ChapterCode::from_number(1)))
        .at_lines(Some(LineSpan::new(10, 15)));
        block.id = Some(BlockId::new("ch-000000000001"));
        block
    }

    #[test]
    fn records_use_relative_lines_and_ordered_metadata() {
        let mut term = Block::new(BlockKind::Term { name: "Heap".into() }, "Memory for\n:::data\n---", 1)
            .in_chapter(Some(ChapterCode::from_number(1)))
            .at_lines(Some(LineSpan::new(12, 12)))
            .with_meta("section", "Memory")
            .with_meta("keywords", "memory,\ndata");
        term.id = Some(BlockId::new("term-000000000002"));
        term.links.insert(BlockId::new("fact-b"));
        term.links.insert(BlockId::new("fact-a"));
        stamp_provenance(&mut term, "book");

        let out = serialize(&[chapter_meta(), term], "book");
        let version = crate::COMPILER_VERSION;
        let expected = format!(
            "%SSM 1.0 namespace=book compiler={version}

:::ssm chapter-meta
id: ch-000000000001
chapter: CH-01
lines: 1-6
number: 1
title: Basics
line_count: 6
sections: 0
---
Chapter 1: Basics
:::

:::ssm term
id: term-000000000002
chapter: CH-01
lines: 3-3
name: Heap
links: fact-a, fact-b
keywords: memory, data
section: Memory
namespace: book
compiler_version: {version}
schema_version: 1.0
---
Memory for
\\:::data
\\---
:::
"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn global_blocks_keep_absolute_lines() {
        let mut fact = Block::new(BlockKind::Fact, "Preamble fact.", 0).at_lines(Some(LineSpan::new(2, 3)));
        fact.id = Some(BlockId::new("fact-0"));
        let out = serialize(&[fact], "book");
        assert!(out.contains("lines: 2-3\n"));
        assert!(!out.contains("chapter:"));
    }

    #[test]
    fn escaped_body_lines_stay_distinguishable() {
        let mut fact = Block::new(BlockKind::Fact, ":::\n\\:::\n---\n\\---\n\\n is a newline", 0);
        fact.id = Some(BlockId::new("fact-0"));
        let out = serialize(&[fact], "book");
        let body: Vec<&str> = out
            .lines()
            .skip_while(|line| *line != BODY_SEPARATOR)
            .skip(1)
            .take_while(|line| *line != RECORD_CLOSE)
            .collect();
        assert_eq!(body, [r"\:::", r"\\:::", r"\---", r"\\---", r"\\n is a newline"]);
        let restored: Vec<&str> = body.iter().map(|line| line.strip_prefix('\\').unwrap_or(line)).collect();
        assert_eq!(restored, [":::", r"\:::", "---", r"\---", r"\n is a newline"]);
    }

    #[test]
    fn header_namespace_stays_on_one_line() {
        let out = serialize(&[], "my\nbook  notes");
        let header = out.lines().next().unwrap();
        assert!(header.starts_with("%SSM "));
        assert!(header.contains(" namespace=my_book_notes compiler="), "{header}");
        assert_eq!(out.lines().count(), 1);
    }
}
