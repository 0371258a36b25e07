use ssm::document::{InlineNode, NodeKind, markdown_text};
use ssm::{BlockKind, Document};

use super::terms::is_glossary;
use super::{Candidate, Extractor, caption_before, node_groups};
use crate::capability::Capability;
use crate::error::ExtractError;

/// Every table except glossaries, which become terms.
pub struct TableExtractor;

impl Capability for TableExtractor {
    fn name(&self) -> &'static str {
        "tables"
    }
}

impl Extractor for TableExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<Candidate>, ExtractError> {
        let mut out = Vec::new();
        for nodes in node_groups(document) {
            for (i, node) in nodes.iter().enumerate() {
                let NodeKind::Table { headers, rows } = &node.kind else {
                    continue;
                };
                if is_glossary(headers) {
                    continue;
                }
                let kind = BlockKind::Table {
                    columns: headers.len() as u32,
                    rows: rows.len() as u32,
                    caption: caption_before(nodes, i),
                };
                out.push(Candidate::block(self.name(), node, kind, render_table(headers, rows)));
            }
        }
        Ok(out)
    }
}

/// Normalized pipe-table markdown.
fn render_table(headers: &[Vec<InlineNode>], rows: &[Vec<Vec<InlineNode>>]) -> String {
    let row = |cells: &[Vec<InlineNode>]| {
        let cells: Vec<String> = cells.iter().map(|c| markdown_text(c).replace('|', "\\|")).collect();
        format!("| {} |", cells.join(" | "))
    };
    let mut lines = vec![row(headers), format!("|{}", " --- |".repeat(headers.len()))];
    lines.extend(rows.iter().map(|r| row(r)));
    lines.join("\n")
}
