//! In-place patching of a heavy tree with standalone fragments.

use text_size::TextSize;

use crate::tree::{Body, NodeData};
use crate::{NodeId, SyntaxTree};

/// One step of an edit script against an existing tree.
///
/// Node ids refer to the tree the script is applied to. Fragments are
/// standalone trees whose root is the node to insert.
#[derive(Debug)]
pub enum TreeEdit {
    Insert { parent: NodeId, index: usize, node: SyntaxTree },
    Delete { parent: NodeId, node: NodeId },
    Replace { old: NodeId, new: SyntaxTree },
}

impl SyntaxTree {
    /// Applies `edits` in order and lays the tree out once at the end.
    ///
    /// Indices of `Insert` are positions in the parent's children at the time
    /// the step runs.
    pub fn apply_edits(&mut self, edits: impl IntoIterator<Item = TreeEdit>) {
        for edit in edits {
            match edit {
                TreeEdit::Insert { parent, index, node } => {
                    let root = node.root();
                    let copy = self.graft(&node, root);
                    if let Some(children) = self.nodes[parent].body.children_mut() {
                        children.insert(index.min(children.len()), copy);
                    }
                }
                TreeEdit::Delete { parent, node } => {
                    if let Some(children) = self.nodes[parent].body.children_mut() {
                        children.retain(|&child| child != node);
                    }
                }
                TreeEdit::Replace { old, new } => {
                    let root = new.root();
                    let copy = self.graft(&new, root);
                    match self.nodes[old].parent {
                        Some(parent) => {
                            if let Some(children) = self.nodes[parent].body.children_mut() {
                                for child in children.iter_mut().filter(|child| **child == old) {
                                    *child = copy;
                                }
                            }
                        }
                        None => self.root = copy,
                    }
                }
            }
        }
        self.relayout();
    }

    /// Fills an unexpanded chameleon with the children of `contents`' root.
    ///
    /// Returns `false` when `node` is not a collapsed chameleon or the
    /// contents do not span the same text.
    pub fn expand_chameleon(&mut self, node: NodeId, contents: &SyntaxTree) -> bool {
        if !self.is_collapsed_chameleon(node) || contents.text_len() != self.range(node).len() {
            return false;
        }
        let grafted: Vec<NodeId> = contents
            .children(contents.root())
            .iter()
            .map(|&child| self.graft(contents, child))
            .collect();
        if let Body::Chameleon { children, tokens, .. } = &mut self.nodes[node].body {
            *children = Some(grafted);
            *tokens = None;
        }
        self.depth_limit_exceeded |= contents.depth_limit_exceeded;
        self.relayout();
        true
    }

    /// Copies a subtree of `other` into this arena without attaching it.
    fn graft(&mut self, other: &Self, node: NodeId) -> NodeId {
        let source = &other.nodes[node];
        let (body, children) = match &source.body {
            Body::Composite { children } => (Body::Composite { children: Vec::new() }, children.as_slice()),
            Body::Error { message, children } => {
                (Body::Error { message: message.clone(), children: Vec::new() }, children.as_slice())
            }
            Body::Leaf { text, flavor } => {
                (Body::Leaf { text: self.char_table.intern(text), flavor: *flavor }, &[][..])
            }
            Body::Chameleon { text, custom, tokens, children } => (
                Body::Chameleon {
                    text: self.char_table.intern(text),
                    custom: *custom,
                    tokens: tokens.clone(),
                    children: children.as_ref().map(|_| Vec::new()),
                },
                children.as_deref().unwrap_or_default(),
            ),
        };
        let copy = self.nodes.alloc(NodeData {
            kind: source.kind,
            parent: None,
            offset: TextSize::new(0),
            len: source.len,
            hash: source.hash,
            body,
        });
        let grafted: Vec<NodeId> = children.iter().map(|&child| self.graft(other, child)).collect();
        if let Some(children) = self.nodes[copy].body.children_mut() {
            *children = grafted;
        }
        copy
    }
}
