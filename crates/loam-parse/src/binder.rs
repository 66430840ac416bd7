//! Edge binders decide which side of a node boundary owns adjacent
//! whitespace and comments.

use std::rc::Rc;

use loam_errors::BuildError;
use loam_syntax::{SyntaxKind, TokenSet};
use text_size::TextSize;

use crate::Builder;

const CANCEL_CHECK_INTERVAL: usize = 64;

/// A run of whitespace and comment lexemes next to a node edge.
pub struct EdgeTokens<'a> {
    kinds: &'a [SyntaxKind],
    /// `kinds.len() + 1` entries.
    starts: &'a [TextSize],
    text: &'a str,
}

impl<'a> EdgeTokens<'a> {
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn kinds(&self) -> &'a [SyntaxKind] {
        self.kinds
    }

    pub fn kind(&self, index: usize) -> SyntaxKind {
        self.kinds[index]
    }

    pub fn text(&self, index: usize) -> &'a str {
        let start = usize::from(self.starts[index]);
        let end = usize::from(self.starts[index + 1]);
        &self.text[start..end]
    }
}

/// Custom edge placement.
pub trait WhitespaceBinder {
    /// Position of the edge inside `tokens`, in `0..=tokens.len()`.
    /// `at_stream_edge` is set when the run touches the start or the end of
    /// the input.
    fn edge_position(&self, tokens: &EdgeTokens<'_>, at_stream_edge: bool) -> usize;

    /// A recursive binder also moves the edges of enclosing nodes that
    /// start at the same position.
    fn is_recursive(&self) -> bool {
        false
    }
}

/// Edge binding policy of one marker edge.
#[derive(Clone, Default)]
pub enum Binder {
    /// Edge after the run. The default for a start edge.
    #[default]
    DefaultLeft,
    /// Edge before the run. The default for an end edge and error items.
    DefaultRight,
    /// Edge before the run. On a start edge the node takes the trivia.
    GreedyLeft,
    /// Edge after the run. On an end edge the node takes the trivia.
    GreedyRight,
    /// Edge before the first comment of the given kinds.
    LeadingComments(TokenSet),
    /// Edge after the last comment of the given kinds.
    TrailingComments(TokenSet),
    Custom(Rc<dyn WhitespaceBinder>),
}

impl Binder {
    pub fn custom(binder: impl WhitespaceBinder + 'static) -> Self {
        Self::Custom(Rc::new(binder))
    }

    pub fn is_recursive(&self) -> bool {
        match self {
            Self::Custom(binder) => binder.is_recursive(),
            _ => false,
        }
    }

    pub fn edge_position(&self, tokens: &EdgeTokens<'_>, at_stream_edge: bool) -> usize {
        let position = match self {
            Self::DefaultLeft | Self::GreedyRight => tokens.len(),
            Self::DefaultRight | Self::GreedyLeft => 0,
            Self::LeadingComments(comments) => tokens
                .kinds
                .iter()
                .position(|&kind| comments.contains(kind))
                .unwrap_or(tokens.len()),
            Self::TrailingComments(comments) => tokens
                .kinds
                .iter()
                .rposition(|&kind| comments.contains(kind))
                .map_or(0, |index| index + 1),
            Self::Custom(binder) => binder.edge_position(tokens, at_stream_edge),
        };
        position.min(tokens.len())
    }
}

impl std::fmt::Debug for Binder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultLeft => f.write_str("DefaultLeft"),
            Self::DefaultRight => f.write_str("DefaultRight"),
            Self::GreedyLeft => f.write_str("GreedyLeft"),
            Self::GreedyRight => f.write_str("GreedyRight"),
            Self::LeadingComments(set) => f.debug_tuple("LeadingComments").field(set).finish(),
            Self::TrailingComments(set) => f.debug_tuple("TrailingComments").field(set).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl Builder<'_> {
    /// Moves every recorded edge to its final lexeme according to its binder.
    pub(crate) fn balance_whitespace(&mut self) -> Result<(), BuildError> {
        let count = self.lexemes.count();
        let mut last_lexeme = 0;

        for i in 1..self.log.len().saturating_sub(1) {
            if i % CANCEL_CHECK_INTERVAL == 0 && self.config.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            let index = self.log[i];
            let item = self.items.get(index);
            if item.is_open_start() {
                return Err(self.unbalanced(index, "missing done marker"));
            }

            let recursive = item.binder.is_recursive();
            let previous = if recursive { 0 } else { self.items.get(self.log[i - 1]).lexeme };
            let lexeme = item.lexeme;

            let mut ws_start = lexeme.max(last_lexeme);
            while ws_start > previous && self.is_whitespace_or_comment(self.lexemes.kinds[ws_start - 1])
            {
                ws_start -= 1;
            }
            let mut ws_end = lexeme;
            while ws_end < count && self.is_whitespace_or_comment(self.lexemes.kinds[ws_end]) {
                ws_end += 1;
            }

            let new_lexeme = if ws_start < ws_end {
                let tokens = EdgeTokens {
                    kinds: &self.lexemes.kinds[ws_start..ws_end],
                    starts: &self.lexemes.starts[ws_start..=ws_end],
                    text: self.text,
                };
                let at_stream_edge = ws_start == 0 || ws_end == count;
                ws_start + item.binder.edge_position(&tokens, at_stream_edge)
            } else {
                lexeme.max(ws_start)
            };
            self.items.get_mut(index).lexeme = new_lexeme;

            if recursive && ws_start < ws_end {
                for k in (2..i).rev() {
                    let enclosing = self.items.get_mut(self.log[k]);
                    if enclosing.lexeme < new_lexeme {
                        break;
                    }
                    enclosing.lexeme = new_lexeme;
                }
            }
            last_lexeme = new_lexeme;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;
    use loam_tokenizer::calc::*;

    use super::*;
    use crate::calc::CalcGrammar;

    fn tokens<'a>(kinds: &'a [SyntaxKind], starts: &'a [TextSize], text: &'a str) -> EdgeTokens<'a> {
        EdgeTokens { kinds, starts, text }
    }

    #[test]
    fn builtin_positions() {
        let text = " // a\n// b\n";
        let kinds = [WHITESPACE, COMMENT, WHITESPACE, COMMENT, WHITESPACE];
        let starts = [0, 1, 5, 6, 10, 11].map(TextSize::from);
        let run = tokens(&kinds, &starts, text);
        assert_eq!(run.text(1), "// a");

        assert_eq!(Binder::DefaultLeft.edge_position(&run, false), 5);
        assert_eq!(Binder::DefaultRight.edge_position(&run, false), 0);
        assert_eq!(Binder::GreedyLeft.edge_position(&run, false), 0);
        assert_eq!(Binder::GreedyRight.edge_position(&run, false), 5);
        assert_eq!(Binder::LeadingComments(COMMENT_SET).edge_position(&run, false), 1);
        assert_eq!(Binder::TrailingComments(COMMENT_SET).edge_position(&run, false), 4);

        let kinds = [WHITESPACE];
        let run = tokens(&kinds, &starts[..2], text);
        assert_eq!(Binder::LeadingComments(COMMENT_SET).edge_position(&run, false), 1);
        assert_eq!(Binder::TrailingComments(COMMENT_SET).edge_position(&run, false), 0);
    }

    struct OutOfRange;

    impl WhitespaceBinder for OutOfRange {
        fn edge_position(&self, tokens: &EdgeTokens<'_>, _: bool) -> usize {
            tokens.len() + 10
        }
    }

    #[test]
    fn custom_position_is_clamped() {
        let kinds = [WHITESPACE];
        let starts = [0, 1].map(TextSize::from);
        let run = tokens(&kinds, &starts, " ");
        assert_eq!(Binder::custom(OutOfRange).edge_position(&run, true), 1);
    }

    fn dump_stmt(text: &str, left: Option<Binder>, right: Option<Binder>) -> String {
        let mut b = Builder::new(text, &CalcGrammar).unwrap();
        let file = b.mark();
        b.advance_lexer();
        let stmt = b.mark();
        b.advance_lexer();
        let done = stmt.done(&mut b, EXPR_STMT);
        done.set_custom_edge_binders(&mut b, left, right);
        while !b.eof() {
            b.advance_lexer();
        }
        file.done(&mut b, FILE);
        b.light_tree().unwrap().dump().unwrap()
    }

    const STMT: &str = "1 //a\n; //b\n;";

    #[test]
    fn default_edges_exclude_trivia() {
        expect![[r#"
            FILE@0..13
              NUMBER@0..1 "1"
              WHITESPACE@1..2 " "
              COMMENT@2..5 "//a"
              WHITESPACE@5..6 "\n"
              EXPR_STMT@6..7
                SEMI@6..7 ";"
              WHITESPACE@7..8 " "
              COMMENT@8..11 "//b"
              WHITESPACE@11..12 "\n"
              SEMI@12..13 ";"
        "#]]
        .assert_eq(&dump_stmt(STMT, None, None));
    }

    #[test]
    fn comment_binders_pull_in_comments() {
        expect![[r#"
            FILE@0..13
              NUMBER@0..1 "1"
              WHITESPACE@1..2 " "
              EXPR_STMT@2..11
                COMMENT@2..5 "//a"
                WHITESPACE@5..6 "\n"
                SEMI@6..7 ";"
                WHITESPACE@7..8 " "
                COMMENT@8..11 "//b"
              WHITESPACE@11..12 "\n"
              SEMI@12..13 ";"
        "#]]
        .assert_eq(&dump_stmt(
            STMT,
            Some(Binder::LeadingComments(COMMENT_SET)),
            Some(Binder::TrailingComments(COMMENT_SET)),
        ));
    }

    #[test]
    fn greedy_binders_take_whole_runs() {
        expect![[r#"
            FILE@0..13
              NUMBER@0..1 "1"
              EXPR_STMT@1..12
                WHITESPACE@1..2 " "
                COMMENT@2..5 "//a"
                WHITESPACE@5..6 "\n"
                SEMI@6..7 ";"
                WHITESPACE@7..8 " "
                COMMENT@8..11 "//b"
                WHITESPACE@11..12 "\n"
              SEMI@12..13 ";"
        "#]]
        .assert_eq(&dump_stmt(STMT, Some(Binder::GreedyLeft), Some(Binder::GreedyRight)));
    }
}
