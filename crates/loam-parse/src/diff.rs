//! Merging a reparse into an existing heavy tree.
//!
//! The new light tree is compared with the old heavy tree level by level.
//! Matching prefixes and suffixes of child lists are skipped, the middle is
//! reconciled with insertions, deletions, replacements and recursion into
//! children that look equal but may differ inside.

use loam_errors::BuildError;
use loam_syntax::{LeafFlavor, NodeId, SyntaxTree, TokenSet, TreeEdit};
use tokio_util::sync::CancellationToken;

use crate::builder::Reparse;
use crate::grammar::{LazyKind, ReparseComparator, Verdict};
use crate::light::LightNode;
use crate::{Builder, Grammar};

/// Child count difference above which a node is replaced outright.
const CHANGED_SUBTREE_THRESHOLD: usize = 20;

/// Edits produced by a reparse, in application order.
#[derive(Debug, Default)]
pub struct DiffLog {
    edits: Vec<TreeEdit>,
}

impl DiffLog {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn edits(&self) -> &[TreeEdit] {
        &self.edits
    }

    /// Patches the tree the log was computed against.
    pub fn apply(self, tree: &mut SyntaxTree) {
        tree.apply_edits(self.edits);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Similarity {
    Equal,
    DrillDown,
    TypeOnly,
    NotEqual,
}

struct Comparator<'a> {
    grammar: &'a dyn Grammar,
    old: &'a SyntaxTree,
    old_text: &'a str,
    new_text: &'a str,
    any_language_whitespace: &'a TokenSet,
    custom: Option<&'a dyn ReparseComparator>,
    cancel: &'a CancellationToken,
}

impl Comparator<'_> {
    fn old_text(&self, node: NodeId) -> &str {
        &self.old_text[self.old.range(node)]
    }

    fn deep_equal(&self, old: NodeId, new: LightNode<'_, '_>) -> Result<Verdict, BuildError> {
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let old_error = self.old.error_message(old);
        let new_error = new.error_message();
        match (old_error, new_error) {
            (Some(_), None) | (None, Some(_)) => return Ok(Verdict::No),
            (Some(old_message), Some(new_message)) => {
                return Ok(if old_message == new_message { Verdict::Unsure } else { Verdict::No });
            }
            (None, None) => {}
        }

        if let Some(custom) = self.custom {
            let verdict = custom.compare(self.old, old, new);
            if verdict != Verdict::Unsure {
                return Ok(verdict);
            }
        }
        if !new.is_token() {
            return Ok(Verdict::Unsure);
        }

        let foreign = self.grammar.foreign_text(new.kind());
        match self.old.leaf_flavor(old) {
            Some(LeafFlavor::Foreign) => {
                return Ok(yes_if(foreign.is_some() && foreign == self.old.leaf_text(old)));
            }
            Some(_) => {
                return Ok(yes_if(foreign.is_none() && self.old.leaf_text(old) == Some(new.text())));
            }
            None => {}
        }

        let lazy = self.grammar.lazy_kind(new.kind());
        if let Some(LazyKind::LightLazy { .. }) = lazy {
            if self.old_text(old) == new.text() {
                return Ok(Verdict::Yes);
            }
            if self.old.is_collapsed_chameleon(old) {
                return Ok(Verdict::No);
            }
            return Ok(Verdict::Unsure);
        }
        let both_lazy = self.old.is_chameleon(old) && matches!(lazy, Some(LazyKind::Lazy { .. }));
        let both_custom = self.old.is_custom(old) && lazy == Some(LazyKind::Custom);
        if both_lazy || both_custom {
            return Ok(yes_if(self.old_text(old) == new.text()));
        }
        Ok(Verdict::Unsure)
    }

    fn types_equal(&self, old: NodeId, new: LightNode<'_, '_>) -> bool {
        let old_kind = self.old.kind(old);
        match self.old.leaf_flavor(old) {
            Some(LeafFlavor::Whitespace) => {
                self.any_language_whitespace.contains(new.kind())
                    || (new.is_token() && new.builder().whitespace.contains(new.kind()))
            }
            Some(LeafFlavor::Foreign) => old_kind == new.kind(),
            _ => self.grammar.unwrap_kind(old_kind) == self.grammar.unwrap_kind(new.kind()),
        }
    }

    fn hashes_equal(&self, old: NodeId, new: LightNode<'_, '_>) -> bool {
        if self.old.is_leaf(old) && new.is_token() {
            let old_foreign = self.old.leaf_flavor(old) == Some(LeafFlavor::Foreign);
            return old_foreign == new.is_foreign() && self.old.leaf_text(old) == Some(new.text());
        }
        if let (Some(old_message), Some(new_message)) = (self.old.error_message(old), new.error_message())
        {
            if old_message != new_message {
                return false;
            }
        }
        self.old.hash(old) == new.hash()
    }

    /// Same length and same text in the old and the new source.
    fn text_match(&self, old: NodeId, new: LightNode<'_, '_>) -> bool {
        let old_range = self.old.range(old);
        let new_range = new.range();
        old_range.len() == new_range.len() && self.old_text[old_range] == self.new_text[new_range]
    }

    fn looks_equal(&self, old: NodeId, new: LightNode<'_, '_>) -> Result<Similarity, BuildError> {
        if !self.types_equal(old, new) {
            return Ok(Similarity::NotEqual);
        }
        Ok(match self.deep_equal(old, new)? {
            Verdict::Yes => Similarity::Equal,
            Verdict::Unsure => Similarity::DrillDown,
            Verdict::No => Similarity::TypeOnly,
        })
    }
}

fn yes_if(condition: bool) -> Verdict {
    if condition { Verdict::Yes } else { Verdict::No }
}

struct DiffTree<'a, 'b, 't> {
    comparator: Comparator<'a>,
    /// New children per depth, reused across siblings.
    levels: Vec<Vec<LightNode<'b, 't>>>,
    edits: Vec<TreeEdit>,
}

impl<'b, 't> DiffTree<'_, 'b, 't> {
    /// Compares two nodes. Edits are recorded only when `record` is set.
    fn build(
        &mut self,
        old: NodeId,
        new: LightNode<'b, 't>,
        level: usize,
        record: bool,
    ) -> Result<Similarity, BuildError> {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        let mut new_children = std::mem::take(&mut self.levels[level]);
        let result = new
            .children_into(&mut new_children)
            .and_then(|()| self.build_children(old, new, &new_children, level, record));
        new_children.clear();
        self.levels[level] = new_children;
        result
    }

    fn build_children(
        &mut self,
        old: NodeId,
        new: LightNode<'b, 't>,
        new_children: &[LightNode<'b, 't>],
        level: usize,
        record: bool,
    ) -> Result<Similarity, BuildError> {
        let old_tree = self.comparator.old;
        let old_children = old_tree.children(old);
        let (old_len, new_len) = (old_children.len(), new_children.len());

        if old_len.abs_diff(new_len) > CHANGED_SUBTREE_THRESHOLD {
            if record {
                self.replace(old, new)?;
            }
            return Ok(Similarity::NotEqual);
        }
        if old_len == 0 && new_len == 0 {
            if !self.comparator.hashes_equal(old, new) || !self.comparator.types_equal(old, new) {
                if record {
                    self.replace(old, new)?;
                }
                return Ok(Similarity::NotEqual);
            }
            return Ok(Similarity::Equal);
        }

        let min_len = old_len.min(new_len);
        let suffix = self.match_run(old_children, new_children, level, min_len, false)?;
        let max_prefix = min_len - suffix - usize::from(old_len == new_len && suffix < min_len);
        let prefix = self.match_run(old_children, new_children, level, max_prefix, true)?;

        if old_len == new_len && suffix + prefix == old_len {
            return Ok(Similarity::Equal);
        }
        if !record {
            return Ok(Similarity::NotEqual);
        }

        // Indices one past the unmatched old and new children, walking back.
        let mut old_end = old_len - suffix;
        let mut new_end = new_len - suffix;
        while old_end > prefix || new_end > prefix {
            let old1 = (old_end > prefix).then(|| old_children[old_end - 1]);
            let new1 = (new_end > prefix).then(|| new_children[new_end - 1]);
            match (old1, new1) {
                (None, Some(new1)) => {
                    self.insert(old, new1, old_end)?;
                    new_end -= 1;
                }
                (Some(old1), None) => {
                    self.delete(old, old1);
                    old_end -= 1;
                }
                (Some(old1), Some(new1)) => {
                    match self.comparator.looks_equal(old1, new1)? {
                        Similarity::Equal => {}
                        Similarity::DrillDown => {
                            self.build(old1, new1, level + 1, true)?;
                        }
                        _ => {
                            let old2 = (old_end > prefix + 1).then(|| old_children[old_end - 2]);
                            let new2 = (new_end > prefix + 1).then(|| new_children[new_end - 2]);
                            if self.similar(old2, Some(new1))? {
                                self.delete(old, old1);
                                old_end -= 1;
                                continue;
                            }
                            if self.similar(Some(old1), new2)? {
                                self.insert(old, new1, old_end)?;
                                new_end -= 1;
                                continue;
                            }
                            self.replace(old1, new1)?;
                        }
                    }
                    old_end -= 1;
                    new_end -= 1;
                }
                (None, None) => unreachable!(),
            }
        }
        Ok(Similarity::NotEqual)
    }

    fn similar(&self, old: Option<NodeId>, new: Option<LightNode<'b, 't>>) -> Result<bool, BuildError> {
        let (Some(old), Some(new)) = (old, new) else { return Ok(false) };
        let similarity = self.comparator.looks_equal(old, new)?;
        Ok(matches!(similarity, Similarity::Equal | Similarity::DrillDown))
    }

    /// Length of the run of equal children from the front or the back.
    fn match_run(
        &mut self,
        old_children: &[NodeId],
        new_children: &[LightNode<'b, 't>],
        level: usize,
        max_len: usize,
        forward: bool,
    ) -> Result<usize, BuildError> {
        let mut len = 0;
        while len < max_len {
            let (old, new) = if forward {
                (old_children[len], new_children[len])
            } else {
                (old_children[old_children.len() - 1 - len], new_children[new_children.len() - 1 - len])
            };
            match self.comparator.looks_equal(old, new)? {
                Similarity::Equal => {}
                Similarity::DrillDown => {
                    if !self.comparator.text_match(old, new)
                        || self.build(old, new, level + 1, false)? != Similarity::Equal
                    {
                        break;
                    }
                }
                _ => break,
            }
            len += 1;
        }
        Ok(len)
    }

    fn insert(&mut self, parent: NodeId, new: LightNode<'_, '_>, index: usize) -> Result<(), BuildError> {
        let node = new.to_tree()?;
        self.edits.push(TreeEdit::Insert { parent, index, node });
        Ok(())
    }

    fn delete(&mut self, parent: NodeId, node: NodeId) {
        self.edits.push(TreeEdit::Delete { parent, node });
    }

    fn replace(&mut self, old: NodeId, new: LightNode<'_, '_>) -> Result<(), BuildError> {
        let new = new.to_tree()?;
        self.edits.push(TreeEdit::Replace { old, new });
        Ok(())
    }
}

/// Diffs the light tree of `builder` against the old tree of `reparse`.
pub(crate) fn merge<'b, 't>(
    builder: &'b Builder<'t>,
    reparse: Reparse<'_>,
    new_root: LightNode<'b, 't>,
) -> Result<DiffLog, BuildError> {
    let comparator = Comparator {
        grammar: builder.grammar,
        old: reparse.old,
        old_text: reparse.last_committed_text,
        new_text: builder.text,
        any_language_whitespace: &builder.any_language_whitespace,
        custom: builder.comparator.as_deref(),
        cancel: &builder.config.cancel,
    };
    let mut diff = DiffTree { comparator, levels: Vec::new(), edits: Vec::new() };
    diff.build(reparse.old.root(), new_root, 0, true)?;
    Ok(DiffLog { edits: diff.edits })
}
