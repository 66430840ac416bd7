//! What the builder needs to know about a language.

use loam_syntax::{NodeId, SyntaxKind, SyntaxTree, TokenSet};
use loam_tokenizer::Lexer;
use text_size::TextRange;

use crate::Builder;
use crate::light::LightNode;

/// How a kind with deferred contents is parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LazyKind {
    /// Parsed on demand in the heavy tree only.
    Lazy { reuse_tokens: bool },
    /// Also parsed on demand when navigating the light tree.
    LightLazy { reuse_tokens: bool },
    /// Opaque to the builder. Compared by text only.
    Custom,
}

impl LazyKind {
    pub fn reuses_tokens(self) -> bool {
        matches!(self, Self::Lazy { reuse_tokens: true } | Self::LightLazy { reuse_tokens: true })
    }
}

/// Language description consumed by the builder.
pub trait Grammar {
    fn whitespace(&self) -> TokenSet;

    fn comments(&self) -> TokenSet;

    fn kind_name(&self, kind: SyntaxKind) -> &'static str;

    /// Creates a lexer over `text`. `chameleon` is the kind of the lazy node
    /// whose contents are being lexed, if any.
    fn lexer<'a>(&self, text: &'a str, chameleon: Option<SyntaxKind>) -> Box<dyn Lexer + 'a>;

    /// Whether an empty node of this kind attaches to the following token
    /// rather than the preceding one.
    fn is_left_bound(&self, _kind: SyntaxKind) -> bool {
        true
    }

    /// Whether a zero-length token of this kind still becomes a leaf.
    fn keeps_empty_leaf(&self, _kind: SyntaxKind) -> bool {
        false
    }

    /// Text of a foreign leaf kind. Foreign leaves are zero-width tokens
    /// standing for text that is not part of the source.
    fn foreign_text(&self, _kind: SyntaxKind) -> Option<&'static str> {
        None
    }

    /// Strips transparent wrapper kinds before kinds are compared.
    fn unwrap_kind(&self, kind: SyntaxKind) -> SyntaxKind {
        kind
    }

    fn lazy_kind(&self, _kind: SyntaxKind) -> Option<LazyKind> {
        None
    }

    /// Parses the contents of a lazy node of `kind`. The builder spans exactly
    /// the node's text and the parser must produce a single root of `kind`.
    fn parse_lazy(&self, kind: SyntaxKind, builder: &mut Builder<'_>) {
        let root = builder.mark();
        while !builder.eof() {
            builder.advance_lexer();
        }
        root.done(builder, kind);
    }
}

/// Contextual retyping of tokens, applied lazily while the parser looks at
/// the current token.
pub trait TokenRemapper {
    fn remap(&self, kind: SyntaxKind, range: TextRange, text: &str) -> SyntaxKind;
}

impl<F> TokenRemapper for F
where
    F: Fn(SyntaxKind, TextRange, &str) -> SyntaxKind,
{
    fn remap(&self, kind: SyntaxKind, range: TextRange, text: &str) -> SyntaxKind {
        self(kind, range, text)
    }
}

/// Three-valued answer of a shallow node comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Yes,
    No,
    Unsure,
}

/// Language specific equality consulted before the built-in rules when
/// merging a reparse into an old tree.
pub trait ReparseComparator {
    fn compare(&self, old: &SyntaxTree, old_node: NodeId, new: LightNode<'_, '_>) -> Verdict;
}
