use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser as CmarkParser, Tag, TagEnd};

use crate::document::{ChapterCode, InlineNode, LineSpan, Node, NodeKind, plain_text};
use crate::parser::lines::LineIndex;

type Events<'a> = [(Event<'a>, Range<usize>)];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build AST nodes for `source[range]`. Line numbers are absolute in `source`.
pub(crate) fn build_nodes(
    source: &str,
    range: Range<usize>,
    lines: &LineIndex,
    chapter: Option<&ChapterCode>,
) -> Vec<Node> {
    let base = range.start;
    let text = &source[range];
    if text.trim().is_empty() {
        return Vec::new();
    }
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let events: Vec<(Event<'_>, Range<usize>)> =
        CmarkParser::new_ext(text, options).into_offset_iter().collect();

    let mut state = NodeBuilder {
        base,
        lines,
        chapter: chapter.cloned(),
        section: None,
        list_stack: Vec::new(),
        nodes: Vec::new(),
    };
    state.process_events(&events);
    state.nodes
}

// ---------------------------------------------------------------------------
// Build state
// ---------------------------------------------------------------------------

struct NodeBuilder<'a> {
    base: usize,
    lines: &'a LineIndex,
    chapter: Option<ChapterCode>,
    /// Title of the innermost section heading seen so far.
    section: Option<String>,
    /// One entry per open list: `true` when ordered.
    list_stack: Vec<bool>,
    nodes: Vec<Node>,
}

impl NodeBuilder<'_> {
    fn process_events(&mut self, events: &Events<'_>) {
        let mut i = 0;

        while i < events.len() {
            let (ref ev, ref range) = events[i];

            match ev {
                Event::Start(Tag::Heading { level, .. }) => {
                    let level = heading_level_to_u8(level);
                    let span = self.span(range);
                    i += 1;
                    let inlines = collect_inlines(events, &mut i, &|e| matches!(e, TagEnd::Heading(_)));
                    let title = plain_text(&inlines);
                    if title.is_empty() {
                        continue;
                    }
                    self.section = Some(title.clone());
                    self.push(NodeKind::Section { level, title }, span);
                }

                Event::Start(Tag::Paragraph) => {
                    let span = self.span(range);
                    i += 1;
                    let inlines = collect_inlines(events, &mut i, &|e| matches!(e, TagEnd::Paragraph));
                    if !plain_text(&inlines).is_empty() {
                        self.push(NodeKind::Paragraph(inlines), span);
                    }
                }

                Event::Start(Tag::List(start)) => {
                    self.list_stack.push(start.is_some());
                    i += 1;
                }

                Event::End(TagEnd::List(_)) => {
                    self.list_stack.pop();
                    i += 1;
                }

                // The item's own text; nested lists and further paragraphs
                // are picked up by this loop as separate nodes.
                Event::Start(Tag::Item) => {
                    let start = range.start;
                    i += 1;
                    let content = if matches!(events.get(i), Some((Event::Start(Tag::Paragraph), _))) {
                        i += 1;
                        collect_inlines(events, &mut i, &|e| matches!(e, TagEnd::Paragraph))
                    } else {
                        collect_inlines(events, &mut i, &|_| false)
                    };
                    let end = events[i - 1].1.end.max(start + 1);
                    if !plain_text(&content).is_empty() {
                        let ordered = self.list_stack.last().copied().unwrap_or(false);
                        let depth = self.list_stack.len().max(1) as u8;
                        let span = self.span(&(start..end));
                        self.push(
                            NodeKind::ListItem {
                                ordered,
                                depth,
                                content,
                            },
                            span,
                        );
                    }
                }

                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(|lang| lang.to_string()),
                        CodeBlockKind::Indented => None,
                    };
                    let span = self.span(range);
                    i += 1;
                    let content = collect_text_until(events, &mut i, |e| matches!(e, TagEnd::CodeBlock));
                    let kind = match classify_diagram(language.as_deref(), &content) {
                        Some(notation) => NodeKind::Diagram { notation, content },
                        None => NodeKind::CodeBlock { language, content },
                    };
                    self.push(kind, span);
                }

                Event::Start(Tag::Table(_)) => {
                    let span = self.span(range);
                    i += 1;
                    let (headers, rows) = collect_table(events, &mut i);
                    self.push(NodeKind::Table { headers, rows }, span);
                }

                // Blockquotes are flattened: their paragraphs become ordinary nodes.
                _ => {
                    i += 1;
                }
            }
        }
    }

    fn span(&self, range: &Range<usize>) -> LineSpan {
        let start = self.lines.line_of(self.base + range.start);
        let last_byte = (self.base + range.end).saturating_sub(1).max(self.base + range.start);
        LineSpan::new(start, self.lines.line_of(last_byte))
    }

    fn push(&mut self, kind: NodeKind, span: LineSpan) {
        self.nodes.push(Node {
            kind,
            span,
            chapter: self.chapter.clone(),
            section: self.section.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

/// Collect inline nodes until a matching End tag. Stops without consuming at
/// the start of a nested block or at the end of the enclosing list item.
fn collect_inlines(events: &Events<'_>, i: &mut usize, is_end: &dyn Fn(&TagEnd) -> bool) -> Vec<InlineNode> {
    let mut inlines = Vec::new();

    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::End(TagEnd::Item) => break,
            Event::Start(tag) if is_block(tag) => break,
            Event::Text(s) => {
                inlines.push(InlineNode::Text(s.to_string()));
                *i += 1;
            }
            Event::Code(s) => {
                inlines.push(InlineNode::CodeSpan(s.to_string()));
                *i += 1;
            }
            Event::SoftBreak => {
                inlines.push(InlineNode::SoftBreak);
                *i += 1;
            }
            Event::HardBreak => {
                inlines.push(InlineNode::HardBreak);
                *i += 1;
            }
            Event::Start(Tag::Strong) => {
                *i += 1;
                let children = collect_inlines(events, i, &|e| matches!(e, TagEnd::Strong));
                inlines.push(InlineNode::Strong(children));
            }
            Event::Start(Tag::Emphasis) => {
                *i += 1;
                let children = collect_inlines(events, i, &|e| matches!(e, TagEnd::Emphasis));
                inlines.push(InlineNode::Emphasis(children));
            }
            Event::Start(Tag::Strikethrough) => {
                *i += 1;
                let children = collect_inlines(events, i, &|e| matches!(e, TagEnd::Strikethrough));
                inlines.push(InlineNode::Strikethrough(children));
            }
            Event::Start(Tag::Link { dest_url, .. }) => {
                let dest = dest_url.to_string();
                *i += 1;
                let content = collect_inlines(events, i, &|e| matches!(e, TagEnd::Link));
                inlines.push(InlineNode::Link { dest, content });
            }
            // Image alt text reads as plain text.
            Event::Start(Tag::Image { .. }) => {
                *i += 1;
                let alt = collect_inlines(events, i, &|e| matches!(e, TagEnd::Image));
                inlines.extend(alt);
            }
            _ => {
                *i += 1;
            }
        }
    }

    inlines
}

fn is_block(tag: &Tag<'_>) -> bool {
    matches!(
        tag,
        Tag::Paragraph
            | Tag::Heading { .. }
            | Tag::BlockQuote(_)
            | Tag::CodeBlock(_)
            | Tag::List(_)
            | Tag::Item
            | Tag::Table(_)
            | Tag::HtmlBlock
    )
}

/// Collect table headers and rows.
fn collect_table(events: &Events<'_>, i: &mut usize) -> (Vec<Vec<InlineNode>>, Vec<Vec<Vec<InlineNode>>>) {
    let mut headers: Vec<Vec<InlineNode>> = Vec::new();
    let mut rows: Vec<Vec<Vec<InlineNode>>> = Vec::new();
    let mut in_head = false;
    let mut current_row: Vec<Vec<InlineNode>> = Vec::new();

    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(TagEnd::Table) => {
                *i += 1;
                break;
            }
            Event::Start(Tag::TableHead) => {
                in_head = true;
                current_row = Vec::new();
                *i += 1;
            }
            Event::End(TagEnd::TableHead) => {
                in_head = false;
                headers = std::mem::take(&mut current_row);
                *i += 1;
            }
            Event::Start(Tag::TableRow) => {
                current_row = Vec::new();
                *i += 1;
            }
            Event::End(TagEnd::TableRow) => {
                if !in_head {
                    rows.push(std::mem::take(&mut current_row));
                }
                *i += 1;
            }
            Event::Start(Tag::TableCell) => {
                *i += 1;
                let cell = collect_inlines(events, i, &|e| matches!(e, TagEnd::TableCell));
                current_row.push(cell);
            }
            _ => {
                *i += 1;
            }
        }
    }

    (headers, rows)
}

/// Collect all text content until a matching End tag.
fn collect_text_until(events: &Events<'_>, i: &mut usize, is_end: impl Fn(&TagEnd) -> bool) -> String {
    let mut text = String::new();
    while *i < events.len() {
        let (ref ev, _) = events[*i];
        match ev {
            Event::End(tag_end) if is_end(tag_end) => {
                *i += 1;
                break;
            }
            Event::Text(s) => {
                text.push_str(s);
                *i += 1;
            }
            _ => {
                *i += 1;
            }
        }
    }
    text
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn heading_level_to_u8(level: &HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Decide whether a code block is a diagram, returning its notation.
pub(crate) fn classify_diagram(language: Option<&str>, content: &str) -> Option<String> {
    let language = language.map(str::to_ascii_lowercase);
    match language.as_deref() {
        Some("mermaid") => Some("mermaid".to_string()),
        Some("plantuml" | "puml") => Some("plantuml".to_string()),
        Some("dot" | "graphviz") => Some("graphviz".to_string()),
        Some("ditaa") => Some("ditaa".to_string()),
        Some("ascii" | "diagram" | "svgbob") => Some("ascii".to_string()),
        None | Some("text" | "txt" | "plain") if is_box_art(content) => Some("ascii".to_string()),
        _ => None,
    }
}

/// At least two lines, and most non-blank lines, drawn with box characters.
fn is_box_art(content: &str) -> bool {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return false;
    }
    let drawn = lines.iter().filter(|l| is_drawing_line(l)).count();
    drawn * 2 >= lines.len() && drawn >= 2
}

fn is_drawing_line(line: &str) -> bool {
    if line.chars().any(|c| ('\u{2500}'..='\u{257F}').contains(&c)) {
        return true;
    }
    let trimmed = line.trim();
    (trimmed.starts_with('+') && (trimmed.contains("-+") || trimmed.contains("--")))
        || (trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1)
        || trimmed.contains("-->")
        || trimmed.contains("<--")
        || (trimmed.len() > 1 && trimmed.chars().all(|c| matches!(c, '|' | 'v' | '^' | ' ')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(text: &str) -> Vec<Node> {
        let lines = LineIndex::new(text);
        build_nodes(text, 0..text.len(), &lines, Some(&ChapterCode::from_number(1)))
    }

    #[test]
    fn sections_track_provenance() {
        let text = "## Borrowing\n\nReferences let you\nuse a value.\n\n## Moves\n\nText.";
        let nodes = nodes(text);
        assert_eq!(nodes.len(), 4);
        assert!(matches!(&nodes[0].kind, NodeKind::Section { level: 2, title } if title == "Borrowing"));
        assert_eq!(nodes[1].span, LineSpan::new(3, 4));
        assert_eq!(nodes[1].section.as_deref(), Some("Borrowing"));
        assert_eq!(nodes[3].section.as_deref(), Some("Moves"));
        assert_eq!(nodes[3].chapter, Some(ChapterCode::from_number(1)));
    }

    #[test]
    fn list_items_carry_depth_and_order() {
        let text = "1. first\n2. second\n   - nested\n";
        let nodes = nodes(text);
        let items: Vec<(bool, u8, String)> = nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::ListItem { ordered, depth, content } => Some((*ordered, *depth, plain_text(content))),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (true, 1, "first".to_string()),
                (true, 1, "second".to_string()),
                (false, 2, "nested".to_string()),
            ]
        );
        assert_eq!(nodes[2].span.start, 3);
    }

    #[test]
    fn loose_list_items_and_blockquotes() {
        let text = "- one\n\n- two\n\n> quoted text\n";
        let nodes = nodes(text);
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[1].kind, NodeKind::ListItem { content, .. } if plain_text(content) == "two"));
        assert!(matches!(&nodes[2].kind, NodeKind::Paragraph(inl) if plain_text(inl) == "quoted text"));
    }

    #[test]
    fn code_tables_and_diagrams() {
        let text = "```rust\nfn main() {}\n```\n\n```mermaid\ngraph TD; A-->B\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |\n";
        let nodes = nodes(text);
        assert!(matches!(&nodes[0].kind, NodeKind::CodeBlock { language: Some(l), content } if l == "rust" && content == "fn main() {}\n"));
        assert_eq!(nodes[0].span, LineSpan::new(1, 3));
        assert!(matches!(&nodes[1].kind, NodeKind::Diagram { notation, .. } if notation == "mermaid"));
        match &nodes[2].kind {
            NodeKind::Table { headers, rows } => {
                assert_eq!(headers.len(), 2);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn untagged_box_art_is_a_diagram() {
        let art = "┌─────┐\n│ box │\n└─────┘\n";
        assert_eq!(classify_diagram(None, art).as_deref(), Some("ascii"));
        assert_eq!(classify_diagram(None, "let x = 1;\nlet y = 2;\n"), None);
        assert_eq!(classify_diagram(Some("rust"), art), None);
    }
}
