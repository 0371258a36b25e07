use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Inclusive, 1-based range of source lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(start: u32, end: u32) -> Self {
        LineSpan {
            start,
            end: end.max(start),
        }
    }

    pub fn single(line: u32) -> Self {
        LineSpan {
            start: line,
            end: line,
        }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }

    pub fn line_count(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Move the span by `delta` lines, clamping at line 1.
    pub fn shifted(&self, delta: i64) -> Self {
        let shift = |line: u32| (line as i64 + delta).max(1) as u32;
        LineSpan {
            start: shift(self.start),
            end: shift(self.end),
        }
    }

    /// Express the span relative to `origin` (origin becomes line 1).
    pub fn relative_to(&self, origin: u32) -> Self {
        let rel = |line: u32| line.saturating_sub(origin) + 1;
        LineSpan {
            start: rel(self.start),
            end: rel(self.end),
        }
    }
}

impl fmt::Display for LineSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Chapter identifier such as `CH-03`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterCode(String);

impl ChapterCode {
    pub fn from_number(number: u32) -> Self {
        ChapterCode(format!("CH-{:02}", number))
    }

    /// Code for the `nth` (>= 2) chapter sharing the same number.
    pub fn duplicate(number: u32, nth: u32) -> Self {
        ChapterCode(format!("CH-{:02}-{}", number, nth))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a code of the form `CH-NN` (optionally suffixed), case-insensitive.
    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let rest = upper.strip_prefix("CH-")?;
        let digits = rest.split('-').next()?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(ChapterCode(upper))
    }
}

impl fmt::Display for ChapterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Difficulty tag attached to a chapter heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl Difficulty {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "beginner" | "basic" | "easy" => Some(Difficulty::Beginner),
            "intermediate" | "medium" => Some(Difficulty::Intermediate),
            "advanced" | "hard" => Some(Difficulty::Advanced),
            "expert" => Some(Difficulty::Expert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }
}

/// A parsed source document: optional preamble followed by chapters.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Nodes before the first chapter marker (document-global).
    pub preamble: Vec<Node>,
    pub chapters: Vec<Chapter>,
    pub line_count: u32,
}

impl Document {
    pub fn empty() -> Self {
        Document {
            preamble: Vec::new(),
            chapters: Vec::new(),
            line_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preamble.is_empty() && self.chapters.is_empty()
    }

    /// All nodes in document order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.preamble
            .iter()
            .chain(self.chapters.iter().flat_map(|c| c.nodes.iter()))
    }

    pub fn chapter(&self, code: &ChapterCode) -> Option<&Chapter> {
        self.chapters.iter().find(|c| &c.code == code)
    }

    pub fn chapter_codes(&self) -> Vec<ChapterCode> {
        self.chapters.iter().map(|c| c.code.clone()).collect()
    }

    /// A copy of this document with the given chapters left out.
    pub fn without_chapters(&self, skip: &BTreeSet<ChapterCode>) -> Document {
        Document {
            preamble: self.preamble.clone(),
            chapters: self
                .chapters
                .iter()
                .filter(|c| !skip.contains(&c.code))
                .cloned()
                .collect(),
            line_count: self.line_count,
        }
    }
}

/// A top-level structural unit introduced by a chapter heading or marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub number: u32,
    pub code: ChapterCode,
    pub title: Option<String>,
    pub difficulty: Option<Difficulty>,
    /// Lines from the chapter marker through the last line before the next chapter.
    pub span: LineSpan,
    /// SHA-256 of the chapter's raw source text.
    pub content_hash: String,
    pub nodes: Vec<Node>,
}

impl Chapter {
    pub fn sections(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Section { .. }))
    }
}

/// A single block-level node with its source provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: LineSpan,
    /// Owning chapter, `None` for preamble nodes.
    pub chapter: Option<ChapterCode>,
    /// Title of the innermost enclosing section heading, if any.
    pub section: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Section {
        level: u8,
        title: String,
    },
    Paragraph(Vec<InlineNode>),
    CodeBlock {
        language: Option<String>,
        content: String,
    },
    Table {
        headers: Vec<Vec<InlineNode>>,
        rows: Vec<Vec<Vec<InlineNode>>>,
    },
    Diagram {
        notation: String,
        content: String,
    },
    ListItem {
        ordered: bool,
        depth: u8,
        content: Vec<InlineNode>,
    },
}

impl NodeKind {
    /// Inline content of paragraphs and list items.
    pub fn inlines(&self) -> Option<&[InlineNode]> {
        match self {
            NodeKind::Paragraph(inlines) => Some(inlines),
            NodeKind::ListItem { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Plain text of paragraphs and list items, without inline markup.
    pub fn plain_text(&self) -> Option<String> {
        self.inlines().map(plain_text)
    }
}

/// Inline elements that appear within a line of text.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineNode {
    Text(String),
    Strong(Vec<InlineNode>),
    Emphasis(Vec<InlineNode>),
    Strikethrough(Vec<InlineNode>),
    CodeSpan(String),
    Link {
        dest: String,
        content: Vec<InlineNode>,
    },
    SoftBreak,
    HardBreak,
}

/// Render inlines as text with markup stripped; breaks become spaces.
pub fn plain_text(inlines: &[InlineNode]) -> String {
    let mut out = String::new();
    push_plain(inlines, &mut out);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_plain(inlines: &[InlineNode], out: &mut String) {
    for inline in inlines {
        match inline {
            InlineNode::Text(s) | InlineNode::CodeSpan(s) => out.push_str(s),
            InlineNode::Strong(children)
            | InlineNode::Emphasis(children)
            | InlineNode::Strikethrough(children)
            | InlineNode::Link {
                content: children, ..
            } => push_plain(children, out),
            InlineNode::SoftBreak | InlineNode::HardBreak => out.push(' '),
        }
    }
}

/// Render inlines back to compact markdown.
pub fn markdown_text(inlines: &[InlineNode]) -> String {
    let text: String = inlines.iter().map(|i| i.to_string()).collect();
    text.trim().to_string()
}

impl fmt::Display for InlineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InlineNode::Text(s) => write!(f, "{}", s),
            InlineNode::Strong(children) => {
                write!(f, "**")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "**")
            }
            InlineNode::Emphasis(children) => {
                write!(f, "*")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "*")
            }
            InlineNode::Strikethrough(children) => {
                write!(f, "~~")?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, "~~")
            }
            InlineNode::CodeSpan(code) => write!(f, "`{}`", code),
            InlineNode::Link { dest, content } => {
                write!(f, "[")?;
                for child in content {
                    write!(f, "{}", child)?;
                }
                write!(f, "]({})", dest)
            }
            InlineNode::SoftBreak | InlineNode::HardBreak => write!(f, " "),
        }
    }
}
