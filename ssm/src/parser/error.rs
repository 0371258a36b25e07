use thiserror::Error;

/// Input the parser cannot recover from. Everything else degrades to a
/// diagnostic and parsing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("input is empty")]
    EmptyInput,

    #[error("input looks binary: NUL byte at offset {offset}")]
    BinaryContent { offset: usize },
}
