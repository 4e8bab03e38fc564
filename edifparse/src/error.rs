//! Parse errors.

use compact_str::CompactString;

/// Everything that can go wrong while tokenizing and parsing
/// an EDIF stream.
///
/// All byte offsets are absolute offsets into the source file.
#[derive(Debug, thiserror::Error)]
pub enum EdifParseError {
    /// A bare or quoted token did not fit into the token buffer.
    #[error("token longer than {max} bytes starting near byte offset {offset}")]
    TokenTooLong { offset: u64, max: usize },
    /// The stream ended inside a quoted string or a form.
    #[error("unexpected end of file at byte offset {offset}")]
    UnexpectedEof { offset: u64 },
    /// A `"` appeared in the middle of a bare token.
    #[error("cannot have quote inside of token at byte offset {offset}")]
    QuoteInsideToken { offset: u64 },
    /// Grammar keyword mismatch.
    #[error("Expected token: {expected}, encountered: {found} before byte offset {offset}.")]
    UnexpectedToken {
        expected: CompactString,
        found: CompactString,
        offset: u64,
    },
    /// Something after the final `)` of the edif form.
    #[error("expected end of file but found {found} before byte offset {offset}")]
    UnexpectedTrailingToken { found: CompactString, offset: u64 },
    /// An integer field (width, member index, timestamp) did not parse.
    #[error("invalid number {token} before byte offset {offset}")]
    InvalidNumber { token: CompactString, offset: u64 },
    /// A reference that must resolve inside the current cell did not.
    #[error("unresolved {kind} reference {name} before byte offset {offset}")]
    UnresolvedReference {
        kind: &'static str,
        name: CompactString,
        offset: u64,
    },
    /// Parallel workers produced results out of byte order.
    #[error("parallel parse results out of order: offset {offset} follows {previous}")]
    WorkerOrder { previous: u64, offset: u64 },
    #[error("invalid parser configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EdifParseError {
    /// The byte offset where the error was detected, if known.
    pub fn offset(&self) -> Option<u64> {
        use EdifParseError::*;
        match self {
            TokenTooLong { offset, .. } |
            UnexpectedEof { offset } |
            QuoteInsideToken { offset } |
            UnexpectedToken { offset, .. } |
            UnexpectedTrailingToken { offset, .. } |
            InvalidNumber { offset, .. } |
            UnresolvedReference { offset, .. } => Some(*offset),
            WorkerOrder { offset, .. } => Some(*offset),
            InvalidConfig(_) | Io(_) => None,
        }
    }
}

pub type Result<T, E = EdifParseError> = std::result::Result<T, E>;
