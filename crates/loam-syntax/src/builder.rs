//! Incremental builder for the heavy syntax tree.

use la_arena::Arena;
use text_size::TextSize;

use crate::tree::{Body, NodeData};
use crate::{CachedTokens, CharTable, LeafFlavor, NodeId, SyntaxKind, SyntaxTree};

/// Builds a `SyntaxTree` from start/finish/leaf events.
///
/// Offsets and hashes are computed once in [`TreeBuilder::finish`].
pub struct TreeBuilder {
    nodes: Arena<NodeData>,
    char_table: CharTable,
    opened: Vec<NodeId>,
    root: Option<NodeId>,
}

impl Drop for TreeBuilder {
    fn drop(&mut self) {
        if !std::thread::panicking() && !self.opened.is_empty() {
            panic!("you should call `TreeBuilder::finish()`");
        }
    }
}

const DEFAULT_TREE_DEPTH: usize = 128;

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Arena::default(),
            char_table: CharTable::new(),
            opened: Vec::with_capacity(DEFAULT_TREE_DEPTH),
            root: None,
        }
    }

    fn alloc(&mut self, kind: SyntaxKind, body: Body) -> NodeId {
        let parent = self.opened.last().copied();
        let node = self.nodes.alloc(NodeData {
            kind,
            parent,
            offset: TextSize::new(0),
            len: TextSize::new(0),
            hash: 0,
            body,
        });
        match parent {
            Some(parent) => {
                if let Some(children) = self.nodes[parent].body.children_mut() {
                    children.push(node);
                }
            }
            None => {
                assert!(self.root.is_none(), "tree already has a root");
                self.root = Some(node);
            }
        }
        node
    }

    /// Starts a new composite node of the given kind.
    pub fn start_node(&mut self, kind: SyntaxKind) -> NodeId {
        let node = self.alloc(kind, Body::Composite { children: Vec::new() });
        self.opened.push(node);
        node
    }

    /// Starts an error node. Its kind is always [`SyntaxKind::ERROR`].
    pub fn start_error(&mut self, message: &str) -> NodeId {
        let node =
            self.alloc(SyntaxKind::ERROR, Body::Error { message: message.into(), children: Vec::new() });
        self.opened.push(node);
        node
    }

    /// Finishes the most recently started node.
    #[track_caller]
    pub fn finish_node(&mut self) {
        self.opened.pop().expect("no opened nodes?");
    }

    /// Adds a leaf. Foreign leaves keep `text` but occupy no source range.
    pub fn leaf(&mut self, kind: SyntaxKind, text: &str, flavor: LeafFlavor) -> NodeId {
        let text = self.char_table.intern(text);
        self.alloc(kind, Body::Leaf { text, flavor })
    }

    /// Adds an unexpanded chameleon.
    pub fn chameleon(
        &mut self,
        kind: SyntaxKind,
        text: &str,
        custom: bool,
        tokens: Option<CachedTokens>,
    ) -> NodeId {
        let text = self.char_table.intern(text);
        self.alloc(kind, Body::Chameleon { text, custom, tokens, children: None })
    }

    /// Discards a partially built tree.
    pub fn abandon(mut self) {
        self.opened.clear();
    }

    /// Finishes building and lays the tree out.
    #[track_caller]
    pub fn finish(mut self) -> SyntaxTree {
        assert!(self.opened.is_empty());
        let root = self.root.take().expect("empty tree");
        let mut tree = SyntaxTree {
            nodes: std::mem::take(&mut self.nodes),
            root,
            char_table: std::mem::take(&mut self.char_table),
            depth_limit_exceeded: false,
        };
        tree.relayout();
        tree
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use text_size::TextRange;

    use super::*;

    const FILE: SyntaxKind = SyntaxKind(1);
    const WORD: SyntaxKind = SyntaxKind(2);
    const SPACE: SyntaxKind = SyntaxKind(3);
    const BLOCK: SyntaxKind = SyntaxKind(4);

    fn name(kind: SyntaxKind) -> &'static str {
        match kind {
            SyntaxKind::ERROR => "ERROR",
            FILE => "FILE",
            WORD => "WORD",
            SPACE => "SPACE",
            BLOCK => "BLOCK",
            _ => "?",
        }
    }

    fn sample() -> SyntaxTree {
        let mut builder = TreeBuilder::new();
        builder.start_node(FILE);
        builder.leaf(WORD, "foo", LeafFlavor::Plain);
        builder.leaf(SPACE, " ", LeafFlavor::Whitespace);
        builder.start_error("unexpected word");
        builder.leaf(WORD, "bar", LeafFlavor::Plain);
        builder.finish_node();
        builder.leaf(WORD, "macro", LeafFlavor::Foreign);
        builder.chameleon(BLOCK, "{ x }", false, None);
        builder.finish_node();
        builder.finish()
    }

    #[test]
    fn layout_and_dump() {
        let tree = sample();
        assert_eq!(tree.text_len(), TextSize::new(12));
        assert_eq!(tree.text(), "foo bar{ x }");
        expect![[r#"
            FILE@0..12
              WORD@0..3 "foo"
              SPACE@3..4 " "
              ERROR@4..7 "unexpected word"
                WORD@4..7 "bar"
              WORD@7..7 foreign "macro"
              BLOCK@7..12 lazy "{ x }"
        "#]]
        .assert_eq(&tree.debug_dump(name));
    }

    #[test]
    fn parents_and_errors() {
        let tree = sample();
        let root = tree.root();
        let error = tree.children(root)[2];
        assert_eq!(tree.parent(error), Some(root));
        assert_eq!(tree.parent(tree.children(error)[0]), Some(error));

        let errors = tree.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "unexpected word");
        assert_eq!(errors[0].range(), TextRange::new(4.into(), 7.into()));
    }

    #[test]
    fn composite_hash_is_span_hash() {
        let tree = sample();
        let root = tree.root();
        assert_eq!(tree.hash(root), crate::text_hash("foo bar{ x }"));
        assert!(tree.is_collapsed_chameleon(tree.children(root)[4]));
    }

    #[test]
    fn leaf_text_is_interned() {
        let mut builder = TreeBuilder::new();
        builder.start_node(FILE);
        let a = builder.leaf(WORD, "x", LeafFlavor::Plain);
        let b = builder.leaf(WORD, "x", LeafFlavor::Plain);
        builder.finish_node();
        let tree = builder.finish();
        let (Some(a), Some(b)) = (tree.leaf_text(a), tree.leaf_text(b)) else { panic!() };
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    #[should_panic = "you should call `TreeBuilder::finish()`"]
    fn unfinished_builder_panics() {
        let mut builder = TreeBuilder::new();
        builder.start_node(FILE);
    }
}
