use drop_bomb::DropBomb;
use loam_syntax::SyntaxKind;

use crate::binder::Binder;
use crate::production::{Closing, ItemId};
use crate::Builder;

/// An open node in the production.
///
/// Every marker must be closed, dropped or rolled back before it goes out of
/// scope.
pub struct Marker {
    id: ItemId,
    bomb: DropBomb,
}

impl Marker {
    pub(crate) fn new(id: ItemId) -> Self {
        Self { id, bomb: DropBomb::new("Marker must be either completed, dropped or rolled back") }
    }

    pub(crate) fn id(&self) -> ItemId {
        self.id
    }

    fn close(mut self, b: &mut Builder<'_>, closing: Closing<'_>, before: Option<ItemId>) -> CompletedMarker {
        self.bomb.defuse();
        b.close(self.id, closing, before);
        CompletedMarker::new(self.id)
    }

    /// Closes the node at the current token.
    pub fn done(self, b: &mut Builder<'_>, kind: SyntaxKind) -> CompletedMarker {
        self.close(b, Closing::Done { kind, collapse: false }, None)
    }

    /// Closes the node and turns its whole range into a single leaf.
    pub fn collapse(self, b: &mut Builder<'_>, kind: SyntaxKind) -> CompletedMarker {
        self.close(b, Closing::Done { kind, collapse: true }, None)
    }

    /// Closes the node as an error node.
    pub fn error(self, b: &mut Builder<'_>, message: &str) -> CompletedMarker {
        self.close(b, Closing::Error { message }, None)
    }

    /// Closes the node right before `before` was opened.
    pub fn done_before(self, b: &mut Builder<'_>, kind: SyntaxKind, before: &Marker) -> CompletedMarker {
        self.close(b, Closing::Done { kind, collapse: false }, Some(before.id))
    }

    /// Like [`Marker::done_before`], with an error item in front of `before`.
    pub fn done_before_with_error(
        self,
        b: &mut Builder<'_>,
        kind: SyntaxKind,
        before: &Marker,
        message: &str,
    ) -> CompletedMarker {
        b.error_item_before(message, before.id);
        self.done_before(b, kind, before)
    }

    pub fn error_before(self, b: &mut Builder<'_>, message: &str, before: &Marker) -> CompletedMarker {
        self.close(b, Closing::Error { message }, Some(before.id))
    }

    /// Removes the marker. Items recorded after it stay in place.
    pub fn drop(mut self, b: &mut Builder<'_>) {
        self.bomb.defuse();
        b.drop_marker(self.id);
    }

    /// Rewinds the builder to where the marker was opened.
    pub fn rollback_to(mut self, b: &mut Builder<'_>) {
        self.bomb.defuse();
        b.rollback(self.id);
    }

    /// Opens a marker that will enclose this one.
    pub fn precede(&self, b: &mut Builder<'_>) -> Marker {
        b.precede_marker(self.id)
    }

    /// Replaces the edge binders. Setting `right` before the marker is done
    /// is a protocol violation.
    pub fn set_custom_edge_binders(&self, b: &mut Builder<'_>, left: Option<Binder>, right: Option<Binder>) {
        b.set_edge_binders(self.id, left, right);
    }
}

impl std::fmt::Debug for Marker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Marker").field(&self.id.index).finish()
    }
}

/// A closed node in the production.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletedMarker {
    id: ItemId,
}

impl CompletedMarker {
    pub(crate) fn new(id: ItemId) -> Self {
        Self { id }
    }

    pub fn kind(self, b: &Builder<'_>) -> Option<SyntaxKind> {
        b.marker_kind(self.id)
    }

    /// Opens a marker that will enclose this node.
    pub fn precede(self, b: &mut Builder<'_>) -> Marker {
        b.precede_marker(self.id)
    }

    pub fn drop(self, b: &mut Builder<'_>) {
        b.drop_marker(self.id);
    }

    pub fn rollback_to(self, b: &mut Builder<'_>) {
        b.rollback(self.id);
    }

    pub fn set_custom_edge_binders(self, b: &mut Builder<'_>, left: Option<Binder>, right: Option<Binder>) {
        b.set_edge_binders(self.id, left, right);
    }

    /// Changes the kind of the node.
    pub fn remap_kind(self, b: &mut Builder<'_>, kind: SyntaxKind) {
        b.set_marker_kind(self.id, kind);
    }
}
