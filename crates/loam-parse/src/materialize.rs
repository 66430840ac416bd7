//! Heavy tree construction.

use loam_errors::BuildError;
use loam_syntax::{LeafFlavor, SyntaxKind, SyntaxTree, TreeBuilder};
use text_size::TextSize;

use crate::diff::{self, DiffLog};
use crate::grammar::LazyKind;
use crate::light::{LightNode, Repr};
use crate::production::{ItemBody, NONE};
use crate::Builder;

/// Result of [`Builder::tree_built`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// A fresh tree.
    Built(SyntaxTree),
    /// Edits that turn the old tree into the new one.
    Reparsed(DiffLog),
}

struct Frame {
    marker: u32,
    lexeme: usize,
    next_child: u32,
}

impl Builder<'_> {
    /// Builds a heavy tree from the production.
    pub fn build_tree(&mut self) -> Result<SyntaxTree, BuildError> {
        self.prepare()?;
        let mut tb = TreeBuilder::new();
        if let Err(error) = self.bind(self.log[0], &mut tb) {
            tb.abandon();
            return Err(error);
        }
        let mut tree = tb.finish();

        let expected = TextSize::of(self.text);
        if tree.text_len() != expected {
            let error = BuildError::LengthMismatch { expected, actual: tree.text_len() };
            tracing::error!(%error, "heavy tree does not cover the text");
            return Err(error);
        }
        tree.set_depth_limit_exceeded(self.depth_limit_exceeded);
        tracing::debug!(len = ?expected, "built syntax tree");
        Ok(tree)
    }

    /// Builds a heavy tree, or merges into the old tree when reparsing.
    ///
    /// Falls back to a full build when the old tree does not match the last
    /// committed text, the root kinds differ or either tree is too deep.
    pub fn tree_built(&mut self) -> Result<ParseOutcome, BuildError> {
        self.prepare()?;
        if let Some(reparse) = self.reparse {
            let old = reparse.old;
            let new_root = self.light_root();
            if old.depth_limit_exceeded() || self.depth_limit_exceeded {
                tracing::debug!("tree too deep for merging, rebuilding");
            } else if old.text_len() != TextSize::of(reparse.last_committed_text) {
                tracing::warn!(
                    old = ?old.text_len(),
                    committed = reparse.last_committed_text.len(),
                    "old tree does not match the committed text, rebuilding"
                );
            } else if self.grammar.unwrap_kind(old.kind(old.root()))
                != self.grammar.unwrap_kind(new_root.kind())
            {
                tracing::debug!("root kind changed, rebuilding");
            } else {
                let log = diff::merge(self, reparse, new_root)?;
                tracing::debug!(edits = log.len(), "merged reparse");
                return Ok(ParseOutcome::Reparsed(log));
            }
        }
        Ok(ParseOutcome::Built(self.build_tree()?))
    }

    fn start_composite(&self, marker: u32, tb: &mut TreeBuilder) {
        let node = self.light_node(Repr::Marker(marker));
        match node.error_message() {
            Some(message) => tb.start_error(message),
            None => tb.start_node(node.kind()),
        };
    }

    /// Adds the node of `marker` and everything below it.
    pub(crate) fn bind(&self, marker: u32, tb: &mut TreeBuilder) -> Result<(), BuildError> {
        let links = &self.links;
        self.start_composite(marker, tb);
        let mut stack = vec![Frame {
            marker,
            lexeme: self.items.get(marker).lexeme,
            next_child: links.first_child[marker as usize],
        }];

        while let Some(frame) = stack.last_mut() {
            let child = frame.next_child;
            if child == NONE {
                let end = self
                    .items
                    .get(frame.marker)
                    .done()
                    .map_or(frame.lexeme, |done| self.items.get(done).lexeme);
                self.insert_leaves(frame.lexeme, end, tb)?;
                tb.finish_node();
                stack.pop();
                continue;
            }
            frame.next_child = links.next[child as usize];

            let item = self.items.get(child);
            frame.lexeme = self.insert_leaves(frame.lexeme, item.lexeme, tb)?;
            match (&item.body, item.done()) {
                (ItemBody::Error { message }, _) => {
                    tb.start_error(message);
                    tb.finish_node();
                }
                (ItemBody::Start { kind, .. }, Some(done)) => {
                    let done = self.items.get(done);
                    frame.lexeme = done.lexeme;
                    if matches!(done.body, ItemBody::Done { collapse: true, .. }) {
                        self.create_leaf(*kind, item.lexeme, done.lexeme, true, tb);
                    } else {
                        self.start_composite(child, tb);
                        stack.push(Frame {
                            marker: child,
                            lexeme: item.lexeme,
                            next_child: links.first_child[child as usize],
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Adds leaves for lexemes `cur..last` and returns the new cursor.
    fn insert_leaves(&self, mut cur: usize, last: usize, tb: &mut TreeBuilder) -> Result<usize, BuildError> {
        let last = last.min(self.lexemes.count());
        while cur < last {
            if self.config.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let kind = self.lexemes.kinds[cur];
            if self.lexemes.start(cur) < self.lexemes.start(cur + 1) || self.is_leaf_kind(kind) {
                self.create_leaf(kind, cur, cur + 1, false, tb);
            }
            cur += 1;
        }
        Ok(cur)
    }

    /// Adds one leaf spanning lexemes `first..end`. `collapsed` leaves of lazy
    /// kinds keep their lexemes when the kind asks for it.
    fn create_leaf(&self, kind: SyntaxKind, first: usize, end: usize, collapsed: bool, tb: &mut TreeBuilder) {
        let text = &self.text[self.lexemes.range(first, end)];
        if self.whitespace.contains(kind) {
            tb.leaf(kind, text, LeafFlavor::Whitespace);
            return;
        }
        match self.grammar.lazy_kind(kind) {
            Some(LazyKind::Custom) => {
                tb.chameleon(kind, text, true, None);
            }
            Some(lazy) => {
                let tokens =
                    (collapsed && first < end && lazy.reuses_tokens()).then(|| self.lexemes.cached(first, end));
                tb.chameleon(kind, text, false, tokens);
            }
            None => match self.grammar.foreign_text(kind) {
                Some(foreign) => {
                    tb.leaf(kind, foreign, LeafFlavor::Foreign);
                }
                None => {
                    tb.leaf(kind, text, LeafFlavor::Plain);
                }
            },
        }
    }
}

impl LightNode<'_, '_> {
    /// Materializes this node and its subtree as a standalone heavy tree.
    pub fn to_tree(&self) -> Result<SyntaxTree, BuildError> {
        let builder = self.builder();
        let mut tb = TreeBuilder::new();
        match self.repr {
            Repr::Marker(marker) => {
                if let Err(error) = builder.bind(marker, &mut tb) {
                    tb.abandon();
                    return Err(error);
                }
            }
            Repr::Error(_) => {
                tb.start_error(self.error_message().unwrap_or_default());
                tb.finish_node();
            }
            Repr::Token { kind, first, end, collapsed, .. } => {
                builder.create_leaf(kind, first, end, collapsed, &mut tb);
            }
        }
        Ok(tb.finish())
    }
}
