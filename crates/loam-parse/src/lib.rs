//! Marker driven syntax tree construction.
//!
//! A hand written parser walks the token stream of a [`Builder`] and brackets
//! ranges of tokens with [`Marker`]s. The resulting production is balanced
//! against whitespace and comments, then exposed as a [`LightTree`], built
//! into a heavy [`SyntaxTree`] or merged into the tree of a previous parse.

mod binder;
mod builder;
pub mod calc;
mod chameleon;
mod diff;
mod grammar;
mod lexemes;
mod light;
mod marker;
mod materialize;
mod production;
#[cfg(test)]
mod tests;

pub use binder::{Binder, EdgeTokens, WhitespaceBinder};
pub use builder::{Builder, BuilderConfig, DEFAULT_DEPTH_LIMIT, Reparse};
pub use chameleon::expand_chameleon;
pub use diff::DiffLog;
pub use grammar::{Grammar, LazyKind, ReparseComparator, TokenRemapper, Verdict};
pub use light::{LightNode, LightTree};
pub use loam_errors::BuildError;
pub use loam_syntax::{NodeId, SyntaxKind, SyntaxTree, TokenSet};
pub use marker::{CompletedMarker, Marker};
pub use materialize::ParseOutcome;
pub use tokio_util::sync::CancellationToken;
