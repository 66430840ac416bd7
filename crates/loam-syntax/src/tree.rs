//! Heavy syntax tree: every node and leaf is an allocated arena entry.

use std::fmt::Write as _;
use std::sync::Arc;

use la_arena::{Arena, Idx};
use loam_errors::Diagnostic;
use text_size::{TextRange, TextSize};

use crate::hash::text_hash;
use crate::{CharTable, SyntaxKind};

pub type NodeId = Idx<NodeData>;

/// What kind of text a leaf carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LeafFlavor {
    Plain,
    /// A token from the grammar's whitespace set.
    Whitespace,
    /// A zero-width leaf injected by another subsystem. Its text is not part of
    /// the source.
    Foreign,
}

/// Lexemes kept by a collapsed chameleon so it can be expanded without
/// re-lexing. Offsets are relative to the chameleon start.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CachedTokens {
    /// One entry per lexeme plus a trailing end offset.
    pub starts: Box<[TextSize]>,
    pub kinds: Box<[SyntaxKind]>,
}

pub struct NodeData {
    pub(crate) kind: SyntaxKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) offset: TextSize,
    pub(crate) len: TextSize,
    pub(crate) hash: u32,
    pub(crate) body: Body,
}

pub(crate) enum Body {
    Composite {
        children: Vec<NodeId>,
    },
    Error {
        message: Box<str>,
        children: Vec<NodeId>,
    },
    Leaf {
        text: Arc<str>,
        flavor: LeafFlavor,
    },
    Chameleon {
        text: Arc<str>,
        custom: bool,
        tokens: Option<CachedTokens>,
        /// `None` until the contents were parsed.
        children: Option<Vec<NodeId>>,
    },
}

impl Body {
    pub(crate) fn children(&self) -> &[NodeId] {
        match self {
            Self::Composite { children } | Self::Error { children, .. } => children,
            Self::Chameleon { children: Some(children), .. } => children,
            Self::Leaf { .. } | Self::Chameleon { children: None, .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Self::Composite { children } | Self::Error { children, .. } => Some(children),
            Self::Chameleon { children: Some(children), .. } => Some(children),
            Self::Leaf { .. } | Self::Chameleon { children: None, .. } => None,
        }
    }
}

/// Owned, fully materialized syntax tree.
pub struct SyntaxTree {
    pub(crate) nodes: Arena<NodeData>,
    pub(crate) root: NodeId,
    pub(crate) char_table: CharTable,
    pub(crate) depth_limit_exceeded: bool,
}

impl SyntaxTree {
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[inline]
    pub fn kind(&self, node: NodeId) -> SyntaxKind {
        self.nodes[node].kind
    }

    #[inline]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    #[inline]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes[node].body.children()
    }

    /// Range of `node` in the source text.
    #[inline]
    pub fn range(&self, node: NodeId) -> TextRange {
        let data = &self.nodes[node];
        TextRange::at(data.offset, data.len)
    }

    #[inline]
    pub fn text_len(&self) -> TextSize {
        self.nodes[self.root].len
    }

    /// Content hash of the source span covered by `node`.
    #[inline]
    pub fn hash(&self, node: NodeId) -> u32 {
        self.nodes[node].hash
    }

    pub fn is_error(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].body, Body::Error { .. })
    }

    pub fn error_message(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].body {
            Body::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].body, Body::Leaf { .. })
    }

    pub fn leaf_flavor(&self, node: NodeId) -> Option<LeafFlavor> {
        match self.nodes[node].body {
            Body::Leaf { flavor, .. } => Some(flavor),
            _ => None,
        }
    }

    /// Text of a leaf or of a chameleon. Foreign leaves return their injected
    /// text.
    pub fn leaf_text(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node].body {
            Body::Leaf { text, .. } | Body::Chameleon { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn is_chameleon(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].body, Body::Chameleon { custom: false, .. })
    }

    pub fn is_custom(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].body, Body::Chameleon { custom: true, .. })
    }

    /// A lazy chameleon whose contents were never parsed.
    pub fn is_collapsed_chameleon(&self, node: NodeId) -> bool {
        matches!(self.nodes[node].body, Body::Chameleon { custom: false, children: None, .. })
    }

    pub fn cached_tokens(&self, node: NodeId) -> Option<&CachedTokens> {
        match &self.nodes[node].body {
            Body::Chameleon { tokens, .. } => tokens.as_ref(),
            _ => None,
        }
    }

    /// Set when the parser nested deeper than the configured limit.
    pub fn depth_limit_exceeded(&self) -> bool {
        self.depth_limit_exceeded
    }

    pub fn set_depth_limit_exceeded(&mut self, exceeded: bool) {
        self.depth_limit_exceeded = exceeded;
    }

    /// Reassembles the source text from the leaves.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.text_len().into());
        self.preorder(self.root, |tree, node, _| {
            match &tree.nodes[node].body {
                Body::Leaf { flavor: LeafFlavor::Foreign, .. } => {}
                Body::Leaf { text: leaf, .. } => text.push_str(leaf),
                Body::Chameleon { text: leaf, children: None, .. } => text.push_str(leaf),
                _ => {}
            }
            true
        });
        text
    }

    /// Collects every error node as a diagnostic.
    pub fn errors(&self) -> Vec<Diagnostic> {
        let mut errors = Vec::new();
        self.preorder(self.root, |tree, node, _| {
            if let Some(message) = tree.error_message(node) {
                errors.push(Diagnostic::syntax(message, tree.range(node)));
            }
            true
        });
        errors
    }

    /// Visits `start` and its descendants in preorder. The callback gets the
    /// depth relative to `start` and returns whether to descend.
    pub fn preorder(&self, start: NodeId, mut f: impl FnMut(&Self, NodeId, usize) -> bool) {
        let mut stack = vec![(start, 0)];
        while let Some((node, depth)) = stack.pop() {
            if f(self, node, depth) {
                stack.extend(self.children(node).iter().rev().map(|&child| (child, depth + 1)));
            }
        }
    }

    /// Renders the tree in the same format as the light tree dump.
    pub fn debug_dump(&self, names: impl Fn(SyntaxKind) -> &'static str) -> String {
        let mut out = String::new();
        self.preorder(self.root, |tree, node, depth| {
            let data = &tree.nodes[node];
            let range = tree.range(node);
            let _ = write!(out, "{:indent$}", "", indent = depth * 2);
            match &data.body {
                Body::Error { message, .. } => {
                    let _ = writeln!(out, "ERROR@{range:?} {message:?}");
                }
                Body::Leaf { text, flavor: LeafFlavor::Foreign } => {
                    let _ = writeln!(out, "{}@{range:?} foreign {text:?}", names(data.kind));
                }
                Body::Leaf { text, .. } => {
                    let _ = writeln!(out, "{}@{range:?} {text:?}", names(data.kind));
                }
                Body::Chameleon { text, custom, children: None, .. } => {
                    let tag = if *custom { "custom" } else { "lazy" };
                    let _ = writeln!(out, "{}@{range:?} {tag} {text:?}", names(data.kind));
                }
                Body::Composite { .. } | Body::Chameleon { .. } => {
                    let _ = writeln!(out, "{}@{range:?}", names(data.kind));
                }
            }
            true
        });
        out
    }

    /// Recomputes parents, offsets, lengths and hashes from the root down.
    pub(crate) fn relayout(&mut self) {
        let root = self.root;
        self.nodes[root].parent = None;

        let mut stack = vec![root];
        let mut preorder = Vec::new();
        while let Some(node) = stack.pop() {
            preorder.push(node);
            let children = self.nodes[node].body.children().to_vec();
            for &child in &children {
                self.nodes[child].parent = Some(node);
            }
            stack.extend(children.into_iter().rev());
        }

        // Lengths and hashes bottom-up.
        for &node in preorder.iter().rev() {
            let (len, hash) = match &self.nodes[node].body {
                Body::Leaf { flavor: LeafFlavor::Foreign, .. } => (TextSize::new(0), 0),
                Body::Leaf { text, .. } | Body::Chameleon { text, children: None, .. } => {
                    (TextSize::of(&**text), text_hash(text))
                }
                body => body.children().iter().fold((TextSize::new(0), 0u32), |(len, hash), &c| {
                    (len + self.nodes[c].len, hash.wrapping_add(self.nodes[c].hash))
                }),
            };
            self.nodes[node].len = len;
            self.nodes[node].hash = hash;
        }

        // Offsets top-down now that lengths are known.
        self.nodes[root].offset = TextSize::new(0);
        for &node in &preorder {
            let mut offset = self.nodes[node].offset;
            let children = self.nodes[node].body.children().to_vec();
            for child in children {
                self.nodes[child].offset = offset;
                offset += self.nodes[child].len;
            }
        }
    }
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("nodes", &self.nodes.len())
            .field("text_len", &self.text_len())
            .finish_non_exhaustive()
    }
}
