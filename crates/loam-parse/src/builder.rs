//! The builder: lexeme cursor, token inspection and configuration.

use std::cell::Cell;

use loam_errors::BuildError;
use loam_syntax::{SyntaxKind, SyntaxTree, TokenSet};
use text_size::{TextRange, TextSize};
use tokio_util::sync::CancellationToken;

use crate::chameleon::Chameleons;
use crate::grammar::{Grammar, ReparseComparator, TokenRemapper};
use crate::lexemes::Lexemes;
use crate::production::{Items, Links};

pub const DEFAULT_DEPTH_LIMIT: usize = 1000;

/// Knobs of a single build.
#[derive(Clone, Debug)]
pub struct BuilderConfig {
    /// Enables the expensive marker checks and records where every marker
    /// was created.
    pub debug_markers: bool,
    /// Nesting depth above which the tree is flagged and incremental merge
    /// is skipped.
    pub depth_limit: usize,
    pub cancel: CancellationToken,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            debug_markers: false,
            depth_limit: DEFAULT_DEPTH_LIMIT,
            cancel: CancellationToken::new(),
        }
    }
}

/// A previous tree together with the text it was built from.
#[derive(Clone, Copy, Debug)]
pub struct Reparse<'t> {
    pub old: &'t SyntaxTree,
    pub last_committed_text: &'t str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Collecting,
    Balancing,
    Materialized,
}

type SkippedCallback<'t> = Box<dyn FnMut(SyntaxKind, TextRange) + 't>;

/// Turns a token stream and the marker calls of a parser into a tree.
///
/// A builder is single use. The parser drives it through [`Builder::mark`]
/// and the [`Marker`](crate::Marker) methods, then one of
/// [`Builder::light_tree`], [`Builder::build_tree`] or
/// [`Builder::tree_built`] materializes the result.
pub struct Builder<'t> {
    pub(crate) text: &'t str,
    pub(crate) grammar: &'t dyn Grammar,
    pub(crate) config: BuilderConfig,
    pub(crate) lexemes: Lexemes,
    /// Offset of `text` inside the outermost text.
    pub(crate) offset: TextSize,
    pub(crate) whitespace: TokenSet,
    pub(crate) comments: TokenSet,
    pub(crate) any_language_whitespace: TokenSet,

    pub(crate) current: usize,
    token_type_checked: bool,
    cached_kind: Option<SyntaxKind>,
    remapper: Option<Box<dyn TokenRemapper + 't>>,
    whitespace_skipped: Option<SkippedCallback<'t>>,

    pub(crate) items: Items,
    pub(crate) log: Vec<u32>,
    pub(crate) links: Links,
    pub(crate) hashes: Vec<Cell<Option<u32>>>,
    pub(crate) state: State,
    pub(crate) violation: Option<BuildError>,
    pub(crate) cancelled: bool,
    pub(crate) depth_limit_exceeded: bool,

    pub(crate) chameleons: Chameleons<'t>,
    pub(crate) reparse: Option<Reparse<'t>>,
    pub(crate) comparator: Option<Box<dyn ReparseComparator + 't>>,
}

impl<'t> Builder<'t> {
    pub fn new(text: &'t str, grammar: &'t dyn Grammar) -> Result<Self, BuildError> {
        Self::with_config(text, grammar, BuilderConfig::default())
    }

    /// Lexes `text` eagerly and prepares an empty production.
    pub fn with_config(
        text: &'t str,
        grammar: &'t dyn Grammar,
        config: BuilderConfig,
    ) -> Result<Self, BuildError> {
        let lexemes = Lexemes::lex(text, grammar.lexer(text, None), grammar, &config.cancel)?;
        tracing::debug!(len = text.len(), lexemes = lexemes.count(), "lexed input");
        Ok(Self::from_lexemes(text, grammar, config, lexemes, TextSize::new(0)))
    }

    pub(crate) fn from_lexemes(
        text: &'t str,
        grammar: &'t dyn Grammar,
        config: BuilderConfig,
        lexemes: Lexemes,
        offset: TextSize,
    ) -> Self {
        Self {
            text,
            grammar,
            whitespace: grammar.whitespace(),
            comments: grammar.comments(),
            any_language_whitespace: TokenSet::EMPTY,
            config,
            lexemes,
            offset,

            current: 0,
            token_type_checked: false,
            cached_kind: None,
            remapper: None,
            whitespace_skipped: None,

            items: Items::default(),
            log: Vec::with_capacity(256),
            links: Links::default(),
            hashes: Vec::new(),
            state: State::Collecting,
            violation: None,
            cancelled: false,
            depth_limit_exceeded: false,

            chameleons: Chameleons::default(),
            reparse: None,
            comparator: None,
        }
    }

    /// Enables incremental mode: [`Builder::tree_built`] will diff against
    /// `old` instead of building a new tree.
    pub fn with_reparse(mut self, old: &'t SyntaxTree, last_committed_text: &'t str) -> Self {
        self.reparse = Some(Reparse { old, last_committed_text });
        self
    }

    pub fn set_reparse_comparator(&mut self, comparator: impl ReparseComparator + 't) {
        self.comparator = Some(Box::new(comparator));
    }

    pub fn set_debug_mode(&mut self, debug: bool) {
        self.config.debug_markers = debug;
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn text(&self) -> &'t str {
        self.text
    }

    pub fn grammar(&self) -> &'t dyn Grammar {
        self.grammar
    }

    /// Replaces the comment set of the grammar for this builder.
    pub fn enforce_comment_tokens(&mut self, comments: TokenSet) {
        self.comments = comments;
    }

    /// Registers a whitespace kind of an embedded language. Old whitespace
    /// leaves match it when merging.
    pub fn register_whitespace_token(&mut self, kind: SyntaxKind) {
        self.any_language_whitespace = std::mem::take(&mut self.any_language_whitespace).with(kind);
    }

    pub fn set_token_remapper(&mut self, remapper: impl TokenRemapper + 't) {
        self.remapper = Some(Box::new(remapper));
        self.token_type_checked = false;
        self.cached_kind = None;
    }

    pub fn set_whitespace_skipped_callback(
        &mut self,
        callback: impl FnMut(SyntaxKind, TextRange) + 't,
    ) {
        self.whitespace_skipped = Some(Box::new(callback));
    }

    #[inline]
    pub fn is_whitespace_or_comment(&self, kind: SyntaxKind) -> bool {
        self.whitespace.contains(kind) || self.comments.contains(kind)
    }

    /// Kind of the current token after skipping whitespace and comments, or
    /// `None` at the end.
    pub fn token_kind(&mut self) -> Option<SyntaxKind> {
        if let Some(kind) = self.cached_kind {
            return Some(kind);
        }
        if self.eof() {
            return None;
        }
        if self.remapper.is_some() {
            self.skip_whitespace();
        }
        let kind = self.lexemes.kinds.get(self.current).copied();
        self.cached_kind = kind;
        kind
    }

    /// Text of the current token. Foreign tokens report their injected text.
    pub fn token_text(&mut self) -> Option<&'t str> {
        let kind = self.token_kind()?;
        if let Some(text) = self.grammar.foreign_text(kind) {
            return Some(text);
        }
        Some(&self.text[self.lexemes.range(self.current, self.current + 1)])
    }

    pub fn eof(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        if !self.token_type_checked {
            self.token_type_checked = true;
            self.skip_whitespace();
        }
        self.current >= self.lexemes.count()
    }

    pub fn advance_lexer(&mut self) {
        if self.config.cancel.is_cancelled() {
            self.cancelled = true;
        }
        if self.eof() {
            return;
        }
        self.token_type_checked = false;
        self.current += 1;
        self.cached_kind = None;
    }

    /// Kind `steps` significant tokens ahead of the current one.
    pub fn look_ahead(&mut self, steps: usize) -> Option<SyntaxKind> {
        if self.eof() {
            return None;
        }
        let count = self.lexemes.count();
        let mut cur = self.current;
        for _ in 0..steps {
            cur += 1;
            while cur < count && self.is_whitespace_or_comment(self.lexemes.kinds[cur]) {
                cur += 1;
            }
        }
        self.lexemes.kinds.get(cur).copied()
    }

    /// Kind of the lexeme `steps` away from the current one, whitespace
    /// included.
    pub fn raw_lookup(&self, steps: isize) -> Option<SyntaxKind> {
        let cur = self.current.checked_add_signed(steps)?;
        self.lexemes.kinds.get(cur).copied()
    }

    /// Start of the lexeme `steps` away from the current one. Past the end
    /// this is the text length.
    pub fn raw_token_type_start(&self, steps: isize) -> Option<TextSize> {
        let cur = self.current.checked_add_signed(steps)?;
        Some(self.lexemes.start(cur))
    }

    pub fn raw_token_index(&self) -> usize {
        self.current
    }

    pub fn current_offset(&mut self) -> TextSize {
        if self.eof() {
            return TextSize::of(self.text);
        }
        self.lexemes.start(self.current)
    }

    /// Retypes the current lexeme.
    pub fn remap_current_token(&mut self, kind: SyntaxKind) {
        if let Some(slot) = self.lexemes.kinds.get_mut(self.current) {
            *slot = kind;
        }
        self.cached_kind = None;
    }

    pub fn at(&mut self, kind: SyntaxKind) -> bool {
        self.token_kind() == Some(kind)
    }

    pub fn at_any(&mut self, kinds: &TokenSet) -> bool {
        self.token_kind().is_some_and(|kind| kinds.contains(kind))
    }

    pub fn eat(&mut self, kind: SyntaxKind) -> bool {
        if !self.at(kind) {
            return false;
        }
        self.advance_lexer();
        true
    }

    /// Consumes `kind` or records an error item with `message`.
    pub fn expect(&mut self, kind: SyntaxKind, message: &str) -> bool {
        if self.eat(kind) {
            return true;
        }
        self.error(message);
        false
    }

    pub(crate) fn skip_whitespace(&mut self) {
        while self.current < self.lexemes.count() {
            let kind = self.remap_current();
            if !self.is_whitespace_or_comment(kind) {
                break;
            }
            if let Some(callback) = &mut self.whitespace_skipped {
                callback(kind, self.lexemes.range(self.current, self.current + 1));
            }
            self.current += 1;
            self.cached_kind = None;
        }
    }

    fn remap_current(&mut self) -> SyntaxKind {
        if let Some(kind) = self.cached_kind {
            return kind;
        }
        let current = self.current;
        if let Some(remapper) = &self.remapper {
            let kind = self.lexemes.kinds[current];
            let range = self.lexemes.range(current, current + 1);
            self.lexemes.kinds[current] = remapper.remap(kind, range, self.text);
        }
        self.lexemes.kinds[current]
    }

    pub(crate) fn reset_to(&mut self, lexeme: usize) {
        self.current = lexeme;
        self.token_type_checked = true;
        self.cached_kind = None;
    }

    pub(crate) fn mark_type_checked(&mut self) {
        self.token_type_checked = true;
        self.cached_kind = None;
    }

    /// Records the first protocol violation. Later calls only log.
    pub(crate) fn violate(&mut self, error: BuildError) {
        tracing::error!(%error, "marker protocol violation");
        if self.violation.is_none() {
            self.violation = Some(error);
        }
    }

    pub(crate) fn is_collecting(&mut self) -> bool {
        if self.state == State::Collecting {
            return true;
        }
        tracing::error!(state = ?self.state, "marker call after the tree was requested");
        false
    }

    /// Whether lexemes `first..end` are all whitespace or comments.
    pub(crate) fn is_empty_range(&self, first: usize, end: usize) -> bool {
        let end = end.min(self.lexemes.count());
        self.lexemes.kinds[first.min(end)..end].iter().all(|&kind| self.is_whitespace_or_comment(kind))
    }
}

impl std::fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("offset", &self.offset)
            .field("lexemes", &self.lexemes.count())
            .field("current", &self.current)
            .field("log", &self.log.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use loam_tokenizer::calc::*;

    use super::*;
    use crate::calc::CalcGrammar;

    #[test]
    fn eof_skips_leading_whitespace_once() {
        let mut b = Builder::new("  // c\n 1", &CalcGrammar).unwrap();
        assert_eq!(b.raw_token_index(), 0);
        assert!(!b.eof());
        assert_eq!(b.raw_token_index(), 3);
        assert_eq!(b.token_kind(), Some(NUMBER));
        assert_eq!(b.token_text(), Some("1"));
        assert_eq!(b.current_offset(), TextSize::new(8));
        b.advance_lexer();
        assert!(b.eof());
        assert_eq!(b.token_kind(), None);
        assert_eq!(b.current_offset(), TextSize::new(9));
    }

    #[test]
    fn lookahead_and_raw_lookup() {
        let mut b = Builder::new("a + b", &CalcGrammar).unwrap();
        assert_eq!(b.look_ahead(0), Some(IDENT));
        assert_eq!(b.look_ahead(1), Some(PLUS));
        assert_eq!(b.look_ahead(2), Some(IDENT));
        assert_eq!(b.look_ahead(3), None);

        assert_eq!(b.raw_lookup(1), Some(WHITESPACE));
        assert_eq!(b.raw_lookup(-1), None);
        assert_eq!(b.raw_token_type_start(2), Some(TextSize::new(2)));
        assert_eq!(b.raw_token_type_start(10), Some(TextSize::new(5)));
        assert_eq!(b.raw_token_type_start(-1), None);
    }

    #[test]
    fn whitespace_skipped_callback_sees_each_trivia_token() {
        let skipped = RefCell::new(Vec::new());
        let mut b = Builder::new("1 // x\n+ 2", &CalcGrammar).unwrap();
        b.set_whitespace_skipped_callback(|kind, range| skipped.borrow_mut().push((kind, range)));
        while !b.eof() {
            b.advance_lexer();
        }
        drop(b);
        let skipped: Vec<_> =
            skipped.into_inner().into_iter().map(|(kind, range)| (kind_name(kind), range)).collect();
        assert_eq!(
            format!("{skipped:?}"),
            r#"[("WHITESPACE", 1..2), ("COMMENT", 2..6), ("WHITESPACE", 6..7), ("WHITESPACE", 8..9)]"#
        );
    }

    #[test]
    fn remapper_applies_to_current_token() {
        let mut b = Builder::new("let let", &CalcGrammar).unwrap();
        b.set_token_remapper(|kind, range: TextRange, _: &str| {
            if kind == LET_KW && range.start() > TextSize::new(0) { IDENT } else { kind }
        });
        assert!(b.eat(LET_KW));
        assert_eq!(b.token_kind(), Some(IDENT));
        b.remap_current_token(NUMBER);
        assert_eq!(b.token_kind(), Some(NUMBER));
    }

    #[test]
    fn expect_records_error_item() {
        let mut b = Builder::new("1", &CalcGrammar).unwrap();
        let m = b.mark();
        assert!(b.expect(NUMBER, "expected number"));
        assert!(!b.expect(SEMI, "expected `;`"));
        m.done(&mut b, EXPR);
        let tree = b.build_tree().unwrap();
        assert_eq!(tree.errors().len(), 1);
        assert_eq!(tree.errors()[0].message(), "expected `;`");
    }

    #[test]
    fn enforced_comment_set_makes_comments_significant() {
        let mut b = Builder::new("1 // x\n2", &CalcGrammar).unwrap();
        assert_eq!(b.look_ahead(1), Some(NUMBER));
        b.enforce_comment_tokens(TokenSet::EMPTY);
        assert!(!b.is_whitespace_or_comment(COMMENT));
        assert_eq!(b.look_ahead(1), Some(COMMENT));
        b.advance_lexer();
        assert_eq!(b.token_kind(), Some(COMMENT));
    }

    #[test]
    fn debug_mode_reports_unclosed_inner_marker() {
        let mut b = Builder::new("1", &CalcGrammar).unwrap();
        b.set_debug_mode(true);
        assert!(b.config().debug_markers);
        let root = b.mark();
        let outer = b.mark();
        let inner = b.mark();
        b.advance_lexer();
        outer.done(&mut b, EXPR);
        inner.done(&mut b, TERM);
        root.done(&mut b, FILE);
        let error = b.build_tree().unwrap_err();
        assert!(matches!(error, BuildError::UnclosedInnerMarker { .. }), "{error:?}");
    }

    #[test]
    fn cancellation_stops_the_cursor() {
        let config = BuilderConfig::default();
        let cancel = config.cancel.clone();
        let mut b = Builder::with_config("1 2 3", &CalcGrammar, config).unwrap();
        let m = b.mark();
        b.advance_lexer();
        cancel.cancel();
        b.advance_lexer();
        assert!(b.eof());
        m.done(&mut b, EXPR);
        assert_eq!(b.build_tree().unwrap_err(), BuildError::Cancelled);
    }
}
