pub mod block;
pub mod diagnostics;
pub mod document;
pub mod hash;
pub mod parser;
pub mod symbols;

pub use block::{Block, BlockId, BlockKind, BlockType};
pub use diagnostics::{Diagnostic, Diagnostics, Severity, Stage};
pub use document::{ChapterCode, Document};
pub use parser::{ParseError, Parser};

/// Version of the SSM output schema.
pub const SCHEMA_VERSION: &str = "1.0";
