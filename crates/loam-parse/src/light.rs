//! Read-only tree view straight over the production log.

use std::fmt::Write as _;

use loam_errors::BuildError;
use loam_syntax::{SyntaxKind, text_hash};
use text_size::TextRange;

use crate::Builder;
use crate::grammar::LazyKind;
use crate::production::{ItemBody, NONE};

/// A materialized production, viewed without allocating nodes.
#[derive(Clone, Copy)]
pub struct LightTree<'b, 't> {
    builder: &'b Builder<'t>,
}

impl<'t> Builder<'t> {
    /// Balances whitespace, validates the production and exposes it as a
    /// light tree.
    pub fn light_tree(&mut self) -> Result<LightTree<'_, 't>, BuildError> {
        self.prepare()?;
        Ok(LightTree { builder: self })
    }

    pub(crate) fn light_root(&self) -> LightNode<'_, 't> {
        self.light_node(Repr::Marker(self.log[0]))
    }

    pub(crate) fn light_node(&self, repr: Repr) -> LightNode<'_, 't> {
        LightNode { builder: self, repr }
    }
}

impl<'b, 't> LightTree<'b, 't> {
    pub fn root(&self) -> LightNode<'b, 't> {
        self.builder.light_root()
    }

    pub fn depth_limit_exceeded(&self) -> bool {
        self.builder.depth_limit_exceeded
    }

    /// Renders the tree in the same format as [`loam_syntax::SyntaxTree::debug_dump`].
    /// Chameleons are shown unexpanded.
    pub fn dump(&self) -> Result<String, BuildError> {
        let mut out = String::new();
        let mut children = Vec::new();
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((node, depth)) = stack.pop() {
            let _ = write!(out, "{:indent$}", "", indent = depth * 2);
            node.dump_line(&mut out);
            if let Repr::Marker(_) = node.repr {
                node.children_into(&mut children)?;
                stack.extend(children.drain(..).rev().map(|child| (child, depth + 1)));
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Repr {
    /// Start item of a node that is not collapsed.
    Marker(u32),
    /// A standalone error item.
    Error(u32),
    /// Lexemes `first..end`. A collapsed node is a token spanning all of its
    /// lexemes.
    Token { kind: SyntaxKind, first: usize, end: usize, parent: u32, collapsed: bool },
}

/// A node of a light tree: a marker, an error item or a token.
#[derive(Clone, Copy)]
pub struct LightNode<'b, 't> {
    builder: &'b Builder<'t>,
    pub(crate) repr: Repr,
}

impl<'b, 't> LightNode<'b, 't> {
    pub(crate) fn builder(&self) -> &'b Builder<'t> {
        self.builder
    }

    pub fn kind(&self) -> SyntaxKind {
        match self.repr {
            Repr::Marker(index) => match self.builder.items.get(index).body {
                ItemBody::Start { kind, .. } => kind,
                _ => SyntaxKind::ERROR,
            },
            Repr::Error(_) => SyntaxKind::ERROR,
            Repr::Token { kind, .. } => kind,
        }
    }

    /// Lexeme range `first..end` covered by the node.
    fn lexemes(&self) -> (usize, usize) {
        let items = &self.builder.items;
        match self.repr {
            Repr::Marker(index) => {
                let start = items.get(index);
                let end = start.done().map_or(start.lexeme, |done| items.get(done).lexeme);
                (start.lexeme, end)
            }
            Repr::Error(index) => {
                let lexeme = items.get(index).lexeme;
                (lexeme, lexeme)
            }
            Repr::Token { first, end, .. } => (first, end),
        }
    }

    /// Range in the outermost text.
    pub fn range(&self) -> TextRange {
        let (first, end) = self.lexemes();
        self.builder.lexemes.range(first, end) + self.builder.offset
    }

    pub fn is_token(&self) -> bool {
        matches!(self.repr, Repr::Token { .. })
    }

    pub fn is_foreign(&self) -> bool {
        self.is_token() && self.builder.grammar.foreign_text(self.kind()).is_some()
    }

    pub fn is_error(&self) -> bool {
        self.error_message().is_some()
    }

    pub fn error_message(&self) -> Option<&'b str> {
        let items = &self.builder.items;
        match self.repr {
            Repr::Error(index) => match &items.get(index).body {
                ItemBody::Error { message } => Some(message),
                _ => None,
            },
            Repr::Marker(index) => {
                let done = items.get(index).done()?;
                match &items.get(done).body {
                    ItemBody::Done { error: Some(message), .. } => Some(message),
                    _ if self.kind().is_error() => Some(""),
                    _ => None,
                }
            }
            Repr::Token { .. } => None,
        }
    }

    /// A token whose kind parses its contents when visited.
    pub fn is_chameleon(&self) -> bool {
        self.is_token() && self.builder.is_light_lazy(self.kind())
    }

    pub fn lazy_kind(&self) -> Option<LazyKind> {
        if !self.is_token() {
            return None;
        }
        self.builder.grammar.lazy_kind(self.kind())
    }

    /// Source text of the node. Foreign tokens return their injected text.
    pub fn text(&self) -> &'t str {
        if self.is_token() {
            if let Some(foreign) = self.builder.grammar.foreign_text(self.kind()) {
                return foreign;
            }
        }
        let source: &'t str = self.builder.text;
        let (first, end) = self.lexemes();
        &source[self.builder.lexemes.range(first, end)]
    }

    /// Content hash, consistent with the hashes of heavy nodes.
    pub fn hash(&self) -> u32 {
        match self.repr {
            Repr::Error(_) => 0,
            Repr::Token { .. } if self.is_foreign() => 0,
            Repr::Token { .. } => text_hash(self.text()),
            Repr::Marker(index) => {
                let cell = &self.builder.hashes[index as usize];
                if let Some(hash) = cell.get() {
                    return hash;
                }
                let hash = text_hash(self.text());
                cell.set(Some(hash));
                hash
            }
        }
    }

    /// Enclosing marker. `None` for the root of a builder, including the
    /// root of a chameleon's contents.
    pub fn parent(&self) -> Option<Self> {
        let parent = match self.repr {
            Repr::Marker(index) | Repr::Error(index) => self.builder.links.parent[index as usize],
            Repr::Token { parent, .. } => parent,
        };
        (parent != NONE).then_some(Self { builder: self.builder, repr: Repr::Marker(parent) })
    }

    pub fn children(&self) -> Result<Vec<Self>, BuildError> {
        let mut children = Vec::new();
        self.children_into(&mut children)?;
        Ok(children)
    }

    /// Replaces the contents of `out` with the children of this node.
    ///
    /// Light chameleons report the root children of their parsed contents,
    /// parsing them on first use.
    pub fn children_into(&self, out: &mut Vec<Self>) -> Result<(), BuildError> {
        out.clear();
        let builder = self.builder;
        let marker = match self.repr {
            Repr::Marker(index) => index,
            Repr::Token { kind, first, end, .. } if builder.is_light_lazy(kind) => {
                let contents = builder.chameleon_contents(kind, first, end)?;
                return contents.light_root().children_into(out);
            }
            Repr::Token { .. } | Repr::Error(_) => return Ok(()),
        };

        let items = &builder.items;
        let mut lexeme = items.get(marker).lexeme;
        for child in builder.links.children(marker) {
            let item = items.get(child);
            self.push_tokens(lexeme, item.lexeme, marker, out);
            lexeme = lexeme.max(item.lexeme);
            match (&item.body, item.done()) {
                (ItemBody::Error { .. }, _) => out.push(Self { builder, repr: Repr::Error(child) }),
                (ItemBody::Start { kind, .. }, Some(done)) => {
                    let done = items.get(done);
                    if matches!(done.body, ItemBody::Done { collapse: true, .. }) {
                        self.push_token(*kind, item.lexeme, done.lexeme, marker, true, out);
                    } else {
                        out.push(Self { builder, repr: Repr::Marker(child) });
                    }
                    lexeme = done.lexeme;
                }
                _ => {}
            }
        }
        let (_, end) = self.lexemes();
        self.push_tokens(lexeme, end, marker, out);
        Ok(())
    }

    fn push_tokens(&self, first: usize, end: usize, parent: u32, out: &mut Vec<Self>) {
        let end = end.min(self.builder.lexemes.count());
        for lexeme in first..end {
            let kind = self.builder.lexemes.kinds[lexeme];
            self.push_token(kind, lexeme, lexeme + 1, parent, false, out);
        }
    }

    fn push_token(
        &self,
        kind: SyntaxKind,
        first: usize,
        end: usize,
        parent: u32,
        collapsed: bool,
        out: &mut Vec<Self>,
    ) {
        let lexemes = &self.builder.lexemes;
        let (start, end_offset) = (lexemes.start(first), lexemes.start(end));
        if start > end_offset {
            return;
        }
        if start == end_offset && !collapsed && !self.builder.is_leaf_kind(kind) {
            return;
        }
        let repr = Repr::Token { kind, first, end, parent, collapsed };
        out.push(Self { builder: self.builder, repr });
    }

    fn dump_line(&self, out: &mut String) {
        let name = self.builder.grammar.kind_name(self.kind());
        let range = self.range();
        let _ = match (self.repr, self.error_message()) {
            (_, Some(message)) => writeln!(out, "ERROR@{range:?} {message:?}"),
            (Repr::Marker(_), None) => writeln!(out, "{name}@{range:?}"),
            _ => {
                let tag = match self.lazy_kind() {
                    _ if self.is_foreign() => " foreign",
                    Some(LazyKind::Custom) => " custom",
                    Some(_) => " lazy",
                    None => "",
                };
                writeln!(out, "{name}@{range:?}{tag} {:?}", self.text())
            }
        };
    }
}

impl Builder<'_> {
    /// Kinds that stay leaves even when empty.
    pub(crate) fn is_leaf_kind(&self, kind: SyntaxKind) -> bool {
        self.grammar.keeps_empty_leaf(kind) || self.grammar.foreign_text(kind).is_some()
    }
}

impl PartialEq for LightNode<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.builder, other.builder) && self.repr == other.repr
    }
}

impl Eq for LightNode<'_, '_> {}

impl std::fmt::Debug for LightNode<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{:?}", self.builder.grammar.kind_name(self.kind()), self.range())
    }
}
