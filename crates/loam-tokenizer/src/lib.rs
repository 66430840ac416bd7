//! Token stream abstraction consumed by the builder, plus the reference
//! `calc` lexer.

pub mod calc;
mod cursor;

pub use loam_syntax::SyntaxKind;
use text_size::TextRange;

/// One lexeme as reported by a lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawToken {
    pub kind: SyntaxKind,
    pub range: TextRange,
}

/// Source of lexemes for the builder.
///
/// Tokens are expected to be contiguous and in increasing offset order. The
/// builder rejects a lexer whose token starts go backwards.
pub trait Lexer {
    /// Returns the next token or `None` at the end of input.
    fn next_token(&mut self) -> Option<RawToken>;
}

impl<L: Lexer + ?Sized> Lexer for Box<L> {
    fn next_token(&mut self) -> Option<RawToken> {
        (**self).next_token()
    }
}

/// Collects every token of `lexer`.
pub fn tokenize(mut lexer: impl Lexer) -> Vec<RawToken> {
    std::iter::from_fn(|| lexer.next_token()).collect()
}
