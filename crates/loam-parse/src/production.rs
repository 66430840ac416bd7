//! The production log: start, done and error items in parser call order.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::fmt::Write as _;

use loam_errors::BuildError;
use loam_syntax::SyntaxKind;
use smallvec::SmallVec;

use crate::binder::Binder;
use crate::builder::State;
use crate::marker::{CompletedMarker, Marker};
use crate::Builder;

/// Link sentinel.
pub(crate) const NONE: u32 = u32::MAX;
/// Bytes of text shown before an unbalanced marker.
const UNBALANCED_CONTEXT: usize = 1000;
/// Unconsumed tokens listed in an error.
const TOKENS_SHOWN: usize = 10;

pub(crate) struct Item {
    pub(crate) lexeme: usize,
    pub(crate) binder: Binder,
    pub(crate) body: ItemBody,
}

pub(crate) enum ItemBody {
    Start {
        /// `ERROR` until the marker is done.
        kind: SyntaxKind,
        done: Option<u32>,
        trace: Option<Box<Backtrace>>,
    },
    Done {
        start: u32,
        collapse: bool,
        error: Option<Box<str>>,
    },
    Error {
        message: Box<str>,
    },
}

impl Item {
    pub(crate) fn is_open_start(&self) -> bool {
        matches!(self.body, ItemBody::Start { done: None, .. })
    }

    pub(crate) fn done(&self) -> Option<u32> {
        match self.body {
            ItemBody::Start { done, .. } => done,
            _ => None,
        }
    }
}

/// Handle to an item slot. The generation changes when the slot is freed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ItemId {
    pub(crate) index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    item: Option<Item>,
}

/// Item storage with slot reuse. Rolled back and dropped items return their
/// slot to the free list.
#[derive(Default)]
pub(crate) struct Items {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Items {
    pub(crate) fn alloc(&mut self, item: Item) -> ItemId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            return ItemId { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, item: Some(item) });
        ItemId { index, generation: 0 }
    }

    pub(crate) fn free(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if slot.item.take().is_some() {
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
    }

    /// Slot index of a live handle.
    pub(crate) fn resolve(&self, id: ItemId) -> Option<u32> {
        let slot = self.slots.get(id.index as usize)?;
        (slot.generation == id.generation && slot.item.is_some()).then_some(id.index)
    }

    pub(crate) fn id(&self, index: u32) -> ItemId {
        ItemId { index, generation: self.slots[index as usize].generation }
    }

    #[track_caller]
    pub(crate) fn get(&self, index: u32) -> &Item {
        self.slots[index as usize].item.as_ref().expect("freed item in the log")
    }

    #[track_caller]
    pub(crate) fn get_mut(&mut self, index: u32) -> &mut Item {
        self.slots[index as usize].item.as_mut().expect("freed item in the log")
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Tree links between items, filled once the production is complete.
#[derive(Default)]
pub(crate) struct Links {
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) last_child: Vec<u32>,
    pub(crate) next: Vec<u32>,
}

impl Links {
    fn reset(&mut self, len: usize) {
        for links in [&mut self.parent, &mut self.first_child, &mut self.last_child, &mut self.next] {
            links.clear();
            links.resize(len, NONE);
        }
    }

    fn add_child(&mut self, parent: u32, child: u32) {
        self.parent[child as usize] = parent;
        match self.last_child[parent as usize] {
            NONE => self.first_child[parent as usize] = child,
            last => self.next[last as usize] = child,
        }
        self.last_child[parent as usize] = child;
    }

    pub(crate) fn children(&self, parent: u32) -> impl Iterator<Item = u32> + '_ {
        let first = self.first_child[parent as usize];
        std::iter::successors((first != NONE).then_some(first), |&child| {
            let next = self.next[child as usize];
            (next != NONE).then_some(next)
        })
    }
}

/// How a marker gets closed.
pub(crate) enum Closing<'a> {
    Done { kind: SyntaxKind, collapse: bool },
    Error { message: &'a str },
}

impl Builder<'_> {
    /// Opens a new marker at the current token. Leading whitespace is skipped
    /// unless this is the first marker.
    pub fn mark(&mut self) -> Marker {
        if !self.log.is_empty() {
            self.skip_whitespace();
        }
        let id = self.start_item(self.current);
        if self.is_collecting() {
            self.log.push(id.index);
        }
        Marker::new(id)
    }

    /// Records an error item at the current token. An error directly after
    /// another one at the same token is dropped.
    pub fn error(&mut self, message: &str) {
        if !self.is_collecting() {
            return;
        }
        if let Some(&last) = self.log.last() {
            let last = self.items.get(last);
            if matches!(last.body, ItemBody::Error { .. }) && last.lexeme == self.current {
                return;
            }
        }
        let id = self.items.alloc(Item {
            lexeme: self.current,
            binder: Binder::DefaultRight,
            body: ItemBody::Error { message: message.into() },
        });
        self.log.push(id.index);
    }

    /// Whether an error was recorded after `marker` was opened.
    pub fn has_errors_after(&self, marker: &Marker) -> bool {
        let Some(index) = self.items.resolve(marker.id()) else { return false };
        let Some(position) = self.log.iter().rposition(|&item| item == index) else {
            return false;
        };
        self.log[position + 1..].iter().any(|&item| match &self.items.get(item).body {
            ItemBody::Error { .. } => true,
            ItemBody::Done { error, .. } => error.is_some(),
            ItemBody::Start { .. } => false,
        })
    }

    /// The marker closed last, if any.
    pub fn latest_done_marker(&self) -> Option<CompletedMarker> {
        self.log.iter().rev().find_map(|&item| match self.items.get(item).body {
            ItemBody::Done { start, .. } => Some(CompletedMarker::new(self.items.id(start))),
            _ => None,
        })
    }

    fn start_item(&mut self, lexeme: usize) -> ItemId {
        let trace = self.config.debug_markers.then(|| Box::new(Backtrace::force_capture()));
        self.items.alloc(Item {
            lexeme,
            binder: Binder::DefaultLeft,
            body: ItemBody::Start { kind: SyntaxKind::ERROR, done: None, trace },
        })
    }

    fn live(&mut self, id: ItemId) -> Option<u32> {
        let index = self.items.resolve(id);
        if index.is_none() {
            self.violate(BuildError::StaleMarker);
        }
        index
    }

    fn log_position(&self, index: u32) -> Option<usize> {
        self.log.iter().rposition(|&item| item == index)
    }

    /// Closes the marker `id`, either at the current token or right before
    /// `before`.
    pub(crate) fn close(&mut self, id: ItemId, closing: Closing<'_>, before: Option<ItemId>) {
        if !self.is_collecting() {
            return;
        }
        let Some(start) = self.check_closable(id, before) else { return };

        let (lexeme, position) = match before {
            Some(before) => {
                let Some(before) = self.live(before) else { return };
                let Some(position) = self.log_position(before) else {
                    self.violate(BuildError::BeforeNotAdded);
                    return;
                };
                (self.items.get(before).lexeme, Some(position))
            }
            None => (self.current, None),
        };

        let start_lexeme = self.items.get(start).lexeme;
        let (kind, ties_left, body) = match closing {
            Closing::Done { kind, collapse } => (
                kind,
                self.grammar.is_left_bound(kind),
                ItemBody::Done { start, collapse, error: None },
            ),
            Closing::Error { message } => (
                SyntaxKind::ERROR,
                true,
                ItemBody::Done { start, collapse: false, error: Some(message.into()) },
            ),
        };
        let tie_to_left = ties_left && self.is_empty_range(start_lexeme, lexeme);

        let done = self.items.alloc(Item { lexeme, binder: Binder::DefaultRight, body });
        let start_item = self.items.get_mut(start);
        if tie_to_left {
            start_item.binder = Binder::DefaultRight;
        }
        if let ItemBody::Start { kind: start_kind, done: start_done, .. } = &mut start_item.body {
            *start_kind = kind;
            *start_done = Some(done.index);
        }
        match position {
            Some(position) => self.log.insert(position, done.index),
            None => self.log.push(done.index),
        }
    }

    /// Inserts an error item right before `before`.
    pub(crate) fn error_item_before(&mut self, message: &str, before: ItemId) {
        if !self.is_collecting() {
            return;
        }
        let Some(before) = self.live(before) else { return };
        let Some(position) = self.log_position(before) else {
            self.violate(BuildError::BeforeNotAdded);
            return;
        };
        let lexeme = self.items.get(before).lexeme;
        let id = self.items.alloc(Item {
            lexeme,
            binder: Binder::DefaultRight,
            body: ItemBody::Error { message: message.into() },
        });
        self.log.insert(position, id.index);
    }

    /// Validates that `id` may be closed before `before` (or at the end).
    fn check_closable(&mut self, id: ItemId, before: Option<ItemId>) -> Option<u32> {
        let index = self.live(id)?;
        if !self.items.get(index).is_open_start() {
            self.violate(BuildError::MarkerAlreadyDone);
            return None;
        }
        if !self.config.debug_markers {
            return Some(index);
        }

        let Some(position) = self.log_position(index) else {
            self.violate(BuildError::MarkerNotAdded);
            return None;
        };
        let mut end = self.log.len();
        if let Some(before) = before {
            let before = self.live(before)?;
            match self.log_position(before) {
                None => {
                    self.violate(BuildError::BeforeNotAdded);
                    return None;
                }
                Some(before) if before < position => {
                    self.violate(BuildError::BeforePrecedes);
                    return None;
                }
                Some(before) => end = before,
            }
        }
        for &inner in self.log[position + 1..end].iter().rev() {
            if self.items.get(inner).is_open_start() {
                let trace = self.allocation_traces(index, inner);
                self.violate(BuildError::UnclosedInnerMarker { trace });
                return None;
            }
        }
        Some(index)
    }

    fn allocation_traces(&self, outer: u32, inner: u32) -> String {
        let mut out = String::new();
        for (label, index) in [("this", outer), ("inner", inner)] {
            if let ItemBody::Start { trace: Some(trace), .. } = &self.items.get(index).body {
                let _ = write!(out, "\n{label} marker created at:\n{trace}");
            }
        }
        out
    }

    /// Removes the marker and its done item, keeping everything in between.
    pub(crate) fn drop_marker(&mut self, id: ItemId) {
        if !self.is_collecting() {
            return;
        }
        let Some(index) = self.live(id) else { return };
        if let Some(done) = self.items.get(index).done() {
            if let Some(position) = self.log_position(done) {
                self.log.remove(position);
            }
            self.items.free(done);
        }
        match self.log_position(index) {
            Some(position) => {
                self.log.remove(position);
            }
            None => self.violate(BuildError::MarkerNotAdded),
        }
        self.items.free(index);
    }

    /// Rewinds the lexer to the marker and forgets every item from the marker
    /// on.
    pub(crate) fn rollback(&mut self, id: ItemId) {
        if !self.is_collecting() {
            return;
        }
        let Some(index) = self.live(id) else { return };
        self.reset_to(self.items.get(index).lexeme);
        let Some(position) = self.log_position(index) else {
            self.violate(BuildError::MarkerNotAdded);
            return;
        };
        let removed: Vec<u32> = self.log.drain(position..).collect();
        for index in removed {
            self.items.free(index);
        }
    }

    /// Opens a new marker right before `id`, at the same token.
    pub(crate) fn precede_marker(&mut self, id: ItemId) -> Marker {
        let Some(index) = self.live(id) else {
            return Marker::new(self.start_item(self.current));
        };
        let lexeme = self.items.get(index).lexeme;
        let new = self.start_item(lexeme);
        if !self.is_collecting() {
            return Marker::new(new);
        }
        match self.log_position(index) {
            Some(position) => self.log.insert(position, new.index),
            None => self.violate(BuildError::MarkerNotAdded),
        }
        Marker::new(new)
    }

    pub(crate) fn set_edge_binders(&mut self, id: ItemId, left: Option<Binder>, right: Option<Binder>) {
        let Some(index) = self.live(id) else { return };
        if let Some(left) = left {
            self.items.get_mut(index).binder = left;
        }
        if let Some(right) = right {
            match self.items.get(index).done() {
                Some(done) => self.items.get_mut(done).binder = right,
                None => self.violate(BuildError::RightBinderOnOpenMarker),
            }
        }
    }

    pub(crate) fn set_marker_kind(&mut self, id: ItemId, kind: SyntaxKind) {
        let Some(index) = self.live(id) else { return };
        if let ItemBody::Start { kind: start_kind, .. } = &mut self.items.get_mut(index).body {
            *start_kind = kind;
        }
    }

    pub(crate) fn marker_kind(&self, id: ItemId) -> Option<SyntaxKind> {
        let index = self.items.resolve(id)?;
        match self.items.get(index).body {
            ItemBody::Start { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Balances whitespace and links the production into a tree. Runs once;
    /// later calls report the stored outcome.
    pub(crate) fn prepare(&mut self) -> Result<(), BuildError> {
        if let Some(violation) = &self.violation {
            return Err(violation.clone());
        }
        if self.state == State::Materialized {
            return Ok(());
        }
        if self.cancelled || self.config.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        self.state = State::Balancing;
        match self.link() {
            Ok(()) => {
                self.state = State::Materialized;
                Ok(())
            }
            Err(BuildError::Cancelled) => Err(BuildError::Cancelled),
            Err(error) => {
                self.violate(error.clone());
                Err(error)
            }
        }
    }

    fn link(&mut self) -> Result<(), BuildError> {
        let Some(&root) = self.log.first() else { return Err(BuildError::NoMarkers) };
        self.mark_type_checked();
        tracing::trace!(items = self.log.len(), "balancing whitespace");
        self.balance_whitespace()?;

        if !matches!(self.items.get(root).body, ItemBody::Start { .. }) {
            return Err(self.unbalanced(root, "the first item is not a marker"));
        }
        self.links.reset(self.items.len());

        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(root);
        let mut current = root;
        let mut depth = 0usize;
        let mut max_depth = 0usize;
        let mut last_error_lexeme = None;

        for &index in &self.log[1..] {
            let item = self.items.get(index);
            match item.body {
                ItemBody::Start { .. } => {
                    self.links.add_child(current, index);
                    stack.push(current);
                    current = index;
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                ItemBody::Done { start, .. } => {
                    if start != current {
                        return Err(self.unbalanced(start, "done marker does not close the innermost marker"));
                    }
                    let Some(parent) = stack.pop() else {
                        return Err(self.unbalanced(start, "unexpected end of the production"));
                    };
                    current = parent;
                    depth = depth.saturating_sub(1);
                }
                ItemBody::Error { .. } => {
                    if last_error_lexeme == Some(item.lexeme) {
                        continue;
                    }
                    last_error_lexeme = Some(item.lexeme);
                    self.links.add_child(current, index);
                }
            }
        }

        if self.current < self.lexemes.count() {
            let offset = self.offset + self.lexemes.start(self.current);
            let tokens = self.describe_tokens(self.current);
            return Err(BuildError::UnconsumedTokens { offset, tokens });
        }
        let Some(root_done) = self.items.get(root).done() else {
            return Err(self.unbalanced(root, "root marker is not done"));
        };
        let root_end = self.items.get(root_done).lexeme;
        if root_end < self.lexemes.count() {
            let offset = self.offset + self.lexemes.start(root_end);
            let tokens = self.describe_tokens(root_end);
            let count = self.lexemes.count() - root_end;
            return Err(BuildError::TokensOutsideRoot { offset, count, tokens });
        }
        if current != root {
            return Err(self.unbalanced(current, "marker is not done"));
        }

        if max_depth > self.config.depth_limit {
            tracing::warn!(max_depth, limit = self.config.depth_limit, "tree is too deep");
            self.depth_limit_exceeded = true;
        }
        self.hashes = vec![Cell::new(None); self.items.len()];
        self.collect_chameleons(root)
    }

    fn describe_tokens(&self, first: usize) -> String {
        let mut tokens: Vec<String> = (first..self.lexemes.count())
            .take(TOKENS_SHOWN)
            .map(|lexeme| {
                let text = &self.text[self.lexemes.range(lexeme, lexeme + 1)];
                format!("{}({text:?})", self.grammar.kind_name(self.lexemes.kinds[lexeme]))
            })
            .collect();
        if self.lexemes.count() - first > TOKENS_SHOWN {
            tokens.push("...".to_owned());
        }
        tokens.join(" ")
    }

    /// Error with up to a thousand bytes of text preceding the marker.
    pub(crate) fn unbalanced(&self, index: u32, reason: &str) -> BuildError {
        let end = usize::from(self.lexemes.start(self.items.get(index).lexeme + 1));
        let mut start = end.saturating_sub(UNBALANCED_CONTEXT);
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        BuildError::Unbalanced { context: format!("{reason}; text before: {:?}", &self.text[start..end]) }
    }
}
