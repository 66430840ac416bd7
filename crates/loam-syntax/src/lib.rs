//! Syntax kinds, kind sets and the heavy syntax tree.
//!
//! The heavy tree is an arena of nodes with parent links, materialized once
//! from a finished production log and patched afterwards by edit scripts.

mod builder;
mod char_table;
mod edit;
mod hash;
mod syntax_kind;
mod token_set;
mod tree;

/// Builder that assembles a `SyntaxTree` from start/finish/leaf events.
pub use builder::TreeBuilder;
/// Interner shared by the leaves of a tree.
pub use char_table::CharTable;
/// Edit script steps applied to an existing tree.
pub use edit::TreeEdit;
pub use hash::text_hash;
/// Token and node kinds.
pub use syntax_kind::SyntaxKind;
/// Compact set for grouping `SyntaxKind` values.
pub use token_set::TokenSet;
/// Heavy tree storage and navigation.
pub use tree::{CachedTokens, LeafFlavor, NodeData, NodeId, SyntaxTree};
