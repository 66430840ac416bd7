//! Eagerly lexed token arrays.

use std::fmt::Write as _;

use loam_errors::BuildError;
use loam_syntax::{CachedTokens, SyntaxKind};
use loam_tokenizer::Lexer;
use text_size::{TextRange, TextSize};
use tokio_util::sync::CancellationToken;

use crate::Grammar;

/// Cancellation is polled once per this many lexemes.
const CANCEL_CHECK_INTERVAL: usize = 20;
/// Bytes of source quoted on each side of a broken token.
const QUOTE_CONTEXT: u32 = 256;

/// Token kinds and start offsets of a whole input.
///
/// `starts` has one more entry than `kinds`: the end of the text, so that the
/// end of lexeme `i` is always `starts[i + 1]`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Lexemes {
    pub(crate) starts: Vec<TextSize>,
    pub(crate) kinds: Vec<SyntaxKind>,
}

impl Lexemes {
    /// Runs `lexer` over the whole of `text`.
    pub(crate) fn lex(
        text: &str,
        mut lexer: impl Lexer,
        grammar: &dyn Grammar,
        cancel: &CancellationToken,
    ) -> Result<Self, BuildError> {
        let capacity = (text.len() / 5).max(10);
        let mut starts = Vec::with_capacity(capacity + 1);
        let mut kinds: Vec<SyntaxKind> = Vec::with_capacity(capacity);
        let mut offset = TextSize::new(0);

        while let Some(token) = lexer.next_token() {
            let index = kinds.len();
            if index % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            if index == kinds.capacity() {
                // Grow by half instead of doubling.
                kinds.reserve_exact(index / 2 + 1);
                starts.reserve_exact(index / 2 + 2);
            }
            if token.range.start() < offset {
                let context = broken_sequence(text, grammar, &starts, &kinds, token.kind, token.range);
                return Err(BuildError::BrokenTokenSequence { offset: token.range.start(), context });
            }
            offset = token.range.start();
            starts.push(offset);
            kinds.push(token.kind);
        }
        starts.push(TextSize::of(text));

        Ok(Self { starts, kinds })
    }

    /// Copies `range` of a parent's lexemes, shifting offsets so that the
    /// first copied lexeme starts at zero.
    pub(crate) fn slice(parent: &Self, first: usize, end: usize, text_len: TextSize) -> Self {
        let shift = parent.starts[first];
        let mut starts: Vec<TextSize> =
            parent.starts[first..end].iter().map(|&start| start - shift).collect();
        starts.push(text_len);
        Self { starts, kinds: parent.kinds[first..end].to_vec() }
    }

    pub(crate) fn from_cached(tokens: &CachedTokens) -> Self {
        Self { starts: tokens.starts.to_vec(), kinds: tokens.kinds.to_vec() }
    }

    /// Lexemes `first..end` relative to the start of `first`.
    pub(crate) fn cached(&self, first: usize, end: usize) -> CachedTokens {
        let shift = self.starts[first];
        CachedTokens {
            starts: self.starts[first..=end].iter().map(|&start| start - shift).collect(),
            kinds: self.kinds[first..end].into(),
        }
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.kinds.len()
    }

    #[inline]
    pub(crate) fn start(&self, index: usize) -> TextSize {
        self.starts[index.min(self.count())]
    }

    #[inline]
    pub(crate) fn range(&self, first: usize, end: usize) -> TextRange {
        TextRange::new(self.start(first), self.start(end))
    }
}

fn broken_sequence(
    text: &str,
    grammar: &dyn Grammar,
    starts: &[TextSize],
    kinds: &[SyntaxKind],
    kind: SyntaxKind,
    range: TextRange,
) -> String {
    let mut context = String::new();
    let this = text.get(std::ops::Range::<usize>::from(range)).unwrap_or("<out of bounds>");
    let _ = write!(context, "  this: {this:?} ({}) {range:?}", grammar.kind_name(kind));
    if let (Some(&prev_start), Some(&prev_kind)) = (starts.last(), kinds.last()) {
        let prev = TextRange::new(prev_start, prev_start.max(range.start()));
        let prev_text = text.get(std::ops::Range::<usize>::from(prev)).unwrap_or_default();
        let _ = write!(
            context,
            "\n  prev: {prev_text:?} ({}) {prev_start:?}",
            grammar.kind_name(prev_kind)
        );
    }
    let start = u32::from(range.start());
    let quote_start = floor_char_boundary(text, start.saturating_sub(QUOTE_CONTEXT) as usize);
    let quote_end =
        floor_char_boundary(text, (start.saturating_add(QUOTE_CONTEXT) as usize).min(text.len()));
    let _ = write!(context, "\n  quote: [{quote_start}:{quote_end}] {:?}", &text[quote_start..quote_end]);
    context
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
