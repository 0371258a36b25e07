mod chapters;
pub mod error;
pub mod lines;
mod structural;

pub use chapters::TITLE_LOOKAHEAD;
pub use error::ParseError;
pub use lines::LineIndex;

use crate::diagnostics::Diagnostics;
use crate::document::{Chapter, Document, LineSpan};
use crate::hash::sha256_hex;

use chapters::Scan;

/// Parser entry point.
pub struct Parser<'a> {
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Parser { source }
    }

    /// Parse the source into a [`Document`]. Only empty or binary input is
    /// fatal; everything else is reported through `diagnostics`.
    pub fn parse(&self, diagnostics: &mut Diagnostics) -> Result<Document, ParseError> {
        if let Some(offset) = self.source.find('\0') {
            return Err(ParseError::BinaryContent { offset });
        }
        if self.source.trim().is_empty() {
            return Err(ParseError::EmptyInput);
        }

        let lines: Vec<&str> = self.source.split('\n').collect();
        let scan = chapters::scan(&lines);
        let masked = mask(&lines, &scan);
        let index = LineIndex::new(self.source);
        diagnostics.extend(scan.diagnostics.iter().cloned());

        let preamble_end = scan
            .chapters
            .first()
            .map(|c| c.marker_line - 1)
            .unwrap_or(index.line_count());
        let preamble = if preamble_end >= 1 {
            structural::build_nodes(&masked, index.lines_range(1, preamble_end), &index, None)
        } else {
            Vec::new()
        };

        let chapters = scan
            .chapters
            .into_iter()
            .map(|scanned| {
                let raw = &self.source[index.lines_range(scanned.marker_line, scanned.end_line)];
                let nodes = if scanned.end_line > scanned.marker_line {
                    structural::build_nodes(
                        &masked,
                        index.lines_range(scanned.marker_line + 1, scanned.end_line),
                        &index,
                        Some(&scanned.code),
                    )
                } else {
                    Vec::new()
                };
                Chapter {
                    number: scanned.number,
                    code: scanned.code,
                    title: scanned.title,
                    difficulty: scanned.difficulty,
                    span: LineSpan::new(scanned.marker_line, scanned.end_line),
                    content_hash: sha256_hex(raw),
                    nodes,
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            chapters = chapters.len(),
            preamble_nodes = preamble.len(),
            "parsed document"
        );

        Ok(Document {
            preamble,
            chapters,
            line_count: index.line_count(),
        })
    }
}

/// Copy of the source with adopted title lines blanked and unterminated fence
/// openers defused. Byte offsets are unchanged.
fn mask(lines: &[&str], scan: &Scan) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line_no = i as u32 + 1;
            if scan.consumed.contains(&line_no) {
                " ".repeat(line.len())
            } else if scan.neutralized.contains(&line_no) {
                line.replacen("```", "'''", 1).replacen("~~~", "'''", 1)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
