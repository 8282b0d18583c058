use std::fmt;

use crate::timecode::Millis;

pub type Result<T> = std::result::Result<T, SubcueError>;

#[derive(Debug, thiserror::Error)]
pub enum SubcueError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("No subtitle document has been loaded")]
    NotReady,

    #[error("Invalid timecode: '{0}'")]
    InvalidTimecode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where in the source text a cue block starts.
///
/// For documents assembled from cues rather than parsed from text, `line` is
/// the 1-based ordinal of the offending cue and `offset` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub offset: usize,
}

impl Location {
    pub(crate) const START: Location = Location { line: 1, offset: 0 };

    pub(crate) fn at(source: &str, offset: usize) -> Self {
        Self::START.advance(source, offset)
    }

    /// Moves forward to `offset`, counting only the newlines in between.
    /// Restarts from the top of `source` when `offset` lies behind `self`.
    pub(crate) fn advance(self, source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let from = if self.offset <= offset { self } else { Self::START };
        let line = from.line
            + source.as_bytes()[from.offset..offset]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
        Self { line, offset }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "line {} (byte {})", self.line, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at {location}")]
pub struct ParseError {
    pub location: Location,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("malformed cue block: {0}")]
    MalformedBlock(String),

    #[error("invalid timecode {0}")]
    InvalidTimecode(String),

    #[error("cue ends at {end}ms but starts at {start}ms")]
    EmptyInterval { start: Millis, end: Millis },

    #[error("duplicate cue id '{0}'")]
    DuplicateId(String),

    #[error("cue block is {0} bytes long, over the configured limit")]
    CueTooLarge(usize),

    #[error("cue has no {0} time")]
    MissingTime(&'static str),

    #[error("{0}")]
    Document(String),
}
