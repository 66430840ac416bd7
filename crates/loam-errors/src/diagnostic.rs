use std::fmt::Display;

use annotate_snippets::{Level, Renderer, Snippet};
use text_size::TextRange;

use crate::BuildError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    /// An error node of the tree. The build still produced a tree.
    Syntax,
    /// A [`BuildError`] raised at a known token. No tree was produced.
    Fatal,
}

/// A message pointing into the source text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    severity: Severity,
    message: String,
    range: TextRange,
}

impl Diagnostic {
    pub fn syntax(message: impl Into<String>, range: TextRange) -> Self {
        Self { severity: Severity::Syntax, message: message.into(), range }
    }

    /// Locates a fatal error in the source. `None` when the error is not
    /// tied to a token, as with marker misuse or cancellation.
    pub fn fatal(error: &BuildError) -> Option<Self> {
        let offset = error.offset()?;
        Some(Self {
            severity: Severity::Fatal,
            message: error.to_string(),
            range: TextRange::empty(offset),
        })
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let (label, footer) = match self.severity {
            Severity::Syntax if self.range.is_empty() => ("missing here", None),
            Severity::Syntax => ("unexpected", None),
            Severity::Fatal => {
                ("build stopped here", Some("the parser or the lexer misused the builder"))
            }
        };
        let mut message = Level::Error.title(&self.message).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(Level::Error.span(self.range.into()).label(label))
                .fold(true),
        );
        if let Some(footer) = footer {
            message = message.footer(Level::Note.title(footer));
        }
        renderer.render(message)
    }
}
