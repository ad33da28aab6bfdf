use thiserror::Error as ThisError;

/// Failure reported by an [`Engine`](crate::engine::Engine) while it was running.
///
/// This is the "internal error" outcome of the engine: it is never used for
/// malformed caller input, which is rejected before an engine is reached.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{0}")]
pub struct EngineFailure(pub String);

impl EngineFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Reasons a candidate solution fails the Equihash validity predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum InvalidSolution {
    #[error("solution has {actual} indices, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("index {value} exceeds the leaf count")]
    IndexOutOfRange { value: u32 },
    #[error("solution repeats an index")]
    DuplicateIndices,
    #[error("subtrees out of order at level {level}")]
    OutOfOrder { level: u32 },
    #[error("no collision at level {level}")]
    Collision { level: u32 },
    #[error("root hash is not zero")]
    NonZeroRoot,
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("{what} must be exactly {expected} long, got {actual}")]
    InputLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("index {value} at position {position} does not fit in {bits} bits")]
    IndexOutOfRange {
        position: usize,
        value: u32,
        bits: u32,
    },
    #[error("allocation failed: {0}")]
    Allocation(String),
    #[error("engine failure: {0}")]
    Internal(#[from] EngineFailure),
    #[error("format error: {0}")]
    Format(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("session lock poisoned")]
    Poisoned,
    #[error("search channel closed")]
    ChannelClosed,
}

impl Error {
    pub(crate) fn input_length(what: &'static str, expected: usize, actual: usize) -> Self {
        Error::InputLength {
            what,
            expected,
            actual,
        }
    }
}
