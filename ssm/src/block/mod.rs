pub mod id;
pub mod index;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{ChapterCode, Difficulty, LineSpan};

/// Content-addressed block identifier, e.g. `term-3fa2c01b9d4e`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        BlockId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The same id with a `-n` disambiguation suffix.
    pub fn with_suffix(&self, n: u32) -> Self {
        BlockId(format!("{}-{}", self.0, n))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of block types, in canonical sort priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockType {
    ChapterMeta,
    Summary,
    Concept,
    Term,
    Fact,
    Rationale,
    Contrast,
    Antipattern,
    Code,
    Diagram,
    Table,
    Constraint,
    ReasoningChain,
    Qa,
    Relation,
}

impl BlockType {
    pub const ALL: [BlockType; 15] = [
        BlockType::ChapterMeta,
        BlockType::Summary,
        BlockType::Concept,
        BlockType::Term,
        BlockType::Fact,
        BlockType::Rationale,
        BlockType::Contrast,
        BlockType::Antipattern,
        BlockType::Code,
        BlockType::Diagram,
        BlockType::Table,
        BlockType::Constraint,
        BlockType::ReasoningChain,
        BlockType::Qa,
        BlockType::Relation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::ChapterMeta => "chapter-meta",
            BlockType::Summary => "summary",
            BlockType::Concept => "concept",
            BlockType::Term => "term",
            BlockType::Fact => "fact",
            BlockType::Rationale => "rationale",
            BlockType::Contrast => "contrast",
            BlockType::Antipattern => "antipattern",
            BlockType::Code => "code",
            BlockType::Diagram => "diagram",
            BlockType::Table => "table",
            BlockType::Constraint => "constraint",
            BlockType::ReasoningChain => "reasoning-chain",
            BlockType::Qa => "qa",
            BlockType::Relation => "relation",
        }
    }

    /// Secondary canonical sort key.
    pub fn priority(&self) -> u8 {
        *self as u8
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            BlockType::ChapterMeta => "ch",
            BlockType::Summary => "sum",
            BlockType::Concept => "con",
            BlockType::Term => "term",
            BlockType::Fact => "fact",
            BlockType::Rationale => "why",
            BlockType::Contrast => "cmp",
            BlockType::Antipattern => "anti",
            BlockType::Code => "code",
            BlockType::Diagram => "dia",
            BlockType::Table => "tab",
            BlockType::Constraint => "req",
            BlockType::ReasoningChain => "chain",
            BlockType::Qa => "qa",
            BlockType::Relation => "rel",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlockType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown block type: {}", s))
    }
}

/// A directed, typed edge between two blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from: BlockId,
    pub to: BlockId,
    pub relation_type: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub evidence: String,
    pub context: String,
}

/// Strength of a normative statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    Must,
    MustNot,
    Should,
    ShouldNot,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Must => "must",
            Modality::MustNot => "must-not",
            Modality::Should => "should",
            Modality::ShouldNot => "should-not",
        }
    }
}

/// Per-type fields every consumer relies on. Anything else goes in `Block::extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockKind {
    ChapterMeta {
        number: u32,
        title: Option<String>,
        difficulty: Option<Difficulty>,
        /// Absolute line of the chapter marker; never serialized to SSM.
        start_line: u32,
        line_count: u32,
        sections: u32,
    },
    Summary,
    Concept {
        title: String,
    },
    Term {
        name: String,
    },
    Fact,
    Rationale {
        trigger: String,
    },
    Contrast {
        left: String,
        right: String,
    },
    Antipattern {
        fix: Option<String>,
    },
    Code {
        language: Option<String>,
        caption: Option<String>,
    },
    Diagram {
        notation: String,
        caption: Option<String>,
    },
    Table {
        columns: u32,
        rows: u32,
        caption: Option<String>,
    },
    Constraint {
        modality: Modality,
    },
    ReasoningChain {
        steps: Vec<BlockId>,
    },
    Qa {
        question: String,
    },
    Relation(Relation),
}

impl BlockKind {
    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::ChapterMeta { .. } => BlockType::ChapterMeta,
            BlockKind::Summary => BlockType::Summary,
            BlockKind::Concept { .. } => BlockType::Concept,
            BlockKind::Term { .. } => BlockType::Term,
            BlockKind::Fact => BlockType::Fact,
            BlockKind::Rationale { .. } => BlockType::Rationale,
            BlockKind::Contrast { .. } => BlockType::Contrast,
            BlockKind::Antipattern { .. } => BlockType::Antipattern,
            BlockKind::Code { .. } => BlockType::Code,
            BlockKind::Diagram { .. } => BlockType::Diagram,
            BlockKind::Table { .. } => BlockType::Table,
            BlockKind::Constraint { .. } => BlockType::Constraint,
            BlockKind::ReasoningChain { .. } => BlockType::ReasoningChain,
            BlockKind::Qa { .. } => BlockType::Qa,
            BlockKind::Relation(_) => BlockType::Relation,
        }
    }

    /// Typed metadata in declaration order, as `key: value` pairs for SSM.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        match self {
            BlockKind::ChapterMeta {
                number,
                title,
                difficulty,
                line_count,
                sections,
                ..
            } => {
                fields.push(("number", number.to_string()));
                if let Some(title) = title {
                    fields.push(("title", title.clone()));
                }
                if let Some(difficulty) = difficulty {
                    fields.push(("difficulty", difficulty.as_str().to_string()));
                }
                fields.push(("line_count", line_count.to_string()));
                fields.push(("sections", sections.to_string()));
            }
            BlockKind::Summary | BlockKind::Fact => {}
            BlockKind::Concept { title } => fields.push(("title", title.clone())),
            BlockKind::Term { name } => fields.push(("name", name.clone())),
            BlockKind::Rationale { trigger } => fields.push(("trigger", trigger.clone())),
            BlockKind::Contrast { left, right } => {
                fields.push(("left", left.clone()));
                fields.push(("right", right.clone()));
            }
            BlockKind::Antipattern { fix } => {
                if let Some(fix) = fix {
                    fields.push(("fix", fix.clone()));
                }
            }
            BlockKind::Code { language, caption } => {
                if let Some(language) = language {
                    fields.push(("language", language.clone()));
                }
                if let Some(caption) = caption {
                    fields.push(("caption", caption.clone()));
                }
            }
            BlockKind::Diagram { notation, caption } => {
                fields.push(("notation", notation.clone()));
                if let Some(caption) = caption {
                    fields.push(("caption", caption.clone()));
                }
            }
            BlockKind::Table {
                columns,
                rows,
                caption,
            } => {
                fields.push(("columns", columns.to_string()));
                fields.push(("rows", rows.to_string()));
                if let Some(caption) = caption {
                    fields.push(("caption", caption.clone()));
                }
            }
            BlockKind::Constraint { modality } => {
                fields.push(("modality", modality.as_str().to_string()))
            }
            BlockKind::ReasoningChain { steps } => {
                let steps: Vec<&str> = steps.iter().map(BlockId::as_str).collect();
                fields.push(("steps", steps.join(", ")));
            }
            BlockKind::Qa { question } => fields.push(("question", question.clone())),
            BlockKind::Relation(relation) => {
                fields.push(("from", relation.from.to_string()));
                fields.push(("to", relation.to.to_string()));
                fields.push(("relation_type", relation.relation_type.clone()));
                fields.push(("confidence", format!("{:.2}", relation.confidence)));
                fields.push(("evidence", relation.evidence.clone()));
                fields.push(("context", relation.context.clone()));
            }
        }
        fields
    }
}

/// The unit of SSM output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Assigned by the assembler, or by the finalizer for derived blocks.
    pub id: Option<BlockId>,
    /// Assembly-time sequence number; the last canonical sort tie-break.
    pub index: usize,
    /// Owning chapter, `None` for document-global blocks.
    pub chapter: Option<ChapterCode>,
    pub kind: BlockKind,
    pub body: String,
    /// Absolute source lines, when the block maps to source text.
    pub lines: Option<LineSpan>,
    pub links: BTreeSet<BlockId>,
    /// Free-form per-block attributes.
    pub extra: BTreeMap<String, String>,
}

impl Block {
    pub fn new(kind: BlockKind, body: impl Into<String>, index: usize) -> Self {
        Block {
            id: None,
            index,
            chapter: None,
            kind,
            body: body.into(),
            lines: None,
            links: BTreeSet::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn in_chapter(mut self, chapter: Option<ChapterCode>) -> Self {
        self.chapter = chapter;
        self
    }

    pub fn at_lines(mut self, lines: Option<LineSpan>) -> Self {
        self.lines = lines;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        self.extra.insert(key.to_string(), value.into());
    }

    pub fn relation(&self) -> Option<&Relation> {
        match &self.kind {
            BlockKind::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    /// Human-facing name of the block: term name, concept or chapter title.
    pub fn title(&self) -> Option<&str> {
        match &self.kind {
            BlockKind::Term { name } => Some(name),
            BlockKind::Concept { title } => Some(title),
            BlockKind::ChapterMeta { title, .. } => title.as_deref(),
            BlockKind::Qa { question } => Some(question),
            _ => None,
        }
    }

    /// The content that identifies this block for ids and deduplication.
    pub fn salient(&self) -> String {
        match &self.kind {
            BlockKind::ChapterMeta { number, .. } => number.to_string(),
            BlockKind::Summary => "summary".to_string(),
            BlockKind::Concept { title } => title.clone(),
            BlockKind::Term { name } => name.clone(),
            BlockKind::Qa { question } => question.clone(),
            BlockKind::Contrast { left, right } => format!("{} | {} | {}", left, right, self.body),
            BlockKind::Relation(relation) => format!(
                "{}|{}|{}",
                relation.from, relation.relation_type, relation.to
            ),
            BlockKind::ReasoningChain { steps } => steps
                .iter()
                .map(BlockId::as_str)
                .collect::<Vec<_>>()
                .join(","),
            _ => self.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_type_round_trips_through_str() {
        for block_type in BlockType::ALL {
            assert_eq!(block_type.as_str().parse::<BlockType>(), Ok(block_type));
        }
        assert!("paragraph".parse::<BlockType>().is_err());
    }

    #[test]
    fn priority_follows_declaration_order() {
        assert!(BlockType::ChapterMeta.priority() < BlockType::Concept.priority());
        assert!(BlockType::Qa.priority() < BlockType::Relation.priority());
    }

    #[test]
    fn relation_fields_are_ordered() {
        let kind = BlockKind::Relation(Relation {
            from: BlockId::new("term-a"),
            to: BlockId::new("term-b"),
            relation_type: "requires".into(),
            confidence: 1.0,
            evidence: "A --requires--> B".into(),
            context: "Setup".into(),
        });
        let keys: Vec<&str> = kind.fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            ["from", "to", "relation_type", "confidence", "evidence", "context"]
        );
        assert_eq!(kind.fields()[3].1, "1.00");
    }
}
