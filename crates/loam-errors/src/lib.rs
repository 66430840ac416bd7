//! Error types shared by the builder crates.
//!
//! [`BuildError`] is a fatal failure: the parser broke the marker protocol,
//! the lexer broke its contract, or the build was cancelled.
//! [`Diagnostic`] renders a recoverable syntax error of a tree, or a fatal
//! error that points at a token, as an annotated snippet.

mod build_error;
mod diagnostic;

pub use annotate_snippets::Renderer;
pub use build_error::BuildError;
pub use diagnostic::{Diagnostic, Severity};
pub use text_size::TextRange;
