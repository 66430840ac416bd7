use text_size::TextSize;

/// Fatal failure of a tree build.
///
/// These are defects of the parser or the lexer driving the builder, never
/// properties of the source text. No tree is produced when one occurs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("marker already done")]
    MarkerAlreadyDone,
    #[error("marker has never been added")]
    MarkerNotAdded,
    #[error("'before' marker has never been added")]
    BeforeNotAdded,
    #[error("'before' marker precedes this one")]
    BeforePrecedes,
    #[error("another not done marker added after this one{trace}")]
    UnclosedInnerMarker {
        /// Allocation backtraces of both markers when available.
        trace: String,
    },
    #[error("stale marker handle")]
    StaleMarker,
    #[error("right edge binder set on an open marker")]
    RightBinderOnOpenMarker,
    #[error("parser produced no markers")]
    NoMarkers,
    #[error("{count} tokens are not inside the root node: {tokens}")]
    TokensOutsideRoot { offset: TextSize, count: usize, tokens: String },
    #[error("tokens were not consumed by the parser: {tokens}")]
    UnconsumedTokens { offset: TextSize, tokens: String },
    #[error("unbalanced tree: {context}")]
    Unbalanced { context: String },
    #[error("token sequence broken\n{context}")]
    BrokenTokenSequence { offset: TextSize, context: String },
    #[error("tree length {actual:?} does not match text length {expected:?}")]
    LengthMismatch { expected: TextSize, actual: TextSize },
    #[error("wrong chameleon cached at offset {offset:?}")]
    WrongChameleon { offset: TextSize },
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Source offset the failure points at, for errors caused by a
    /// particular token.
    pub fn offset(&self) -> Option<TextSize> {
        match self {
            Self::TokensOutsideRoot { offset, .. }
            | Self::UnconsumedTokens { offset, .. }
            | Self::BrokenTokenSequence { offset, .. }
            | Self::WrongChameleon { offset } => Some(*offset),
            _ => None,
        }
    }
}
