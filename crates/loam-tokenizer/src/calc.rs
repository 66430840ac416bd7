//! Lexer for `calc`, a small expression language used to drive the builder.
//!
//! Braced blocks are reported as a single [`BLOCK`] token so that the parser
//! can defer them. A lexer created for the contents of a block splits its
//! outer braces and folds only the nested ones.

use loam_syntax::{SyntaxKind, TokenSet};
use text_size::{TextRange, TextSize};

use crate::cursor::{Cursor, EOF_CHAR};
use crate::{Lexer, RawToken};

macro_rules! kinds {
    ($($name:ident = $raw:literal,)*) => {
        $(pub const $name: SyntaxKind = SyntaxKind($raw);)*

        pub fn kind_name(kind: SyntaxKind) -> &'static str {
            match kind {
                SyntaxKind::ERROR => "ERROR",
                $($name => stringify!($name),)*
                _ => "UNKNOWN_KIND",
            }
        }
    };
}

kinds! {
    WHITESPACE = 1,
    COMMENT = 2,
    NUMBER = 3,
    IDENT = 4,
    PLUS = 5,
    MINUS = 6,
    STAR = 7,
    SLASH = 8,
    L_PAREN = 9,
    R_PAREN = 10,
    L_BRACE = 11,
    R_BRACE = 12,
    L_BRACK = 13,
    R_BRACK = 14,
    COMMA = 15,
    SEMI = 16,
    EQ = 17,
    LET_KW = 18,
    UNKNOWN = 19,

    FILE = 32,
    LET_STMT = 33,
    EXPR_STMT = 34,
    EXPR = 35,
    TERM = 36,
    PAREN = 37,
    NEG = 38,
    BLOCK = 39,
    LIST = 40,
}

pub const WHITESPACE_SET: TokenSet = TokenSet::new([WHITESPACE]);
pub const COMMENT_SET: TokenSet = TokenSet::new([COMMENT]);

pub struct CalcLexer<'t> {
    text: &'t str,
    cursor: Cursor<'t>,
    /// Set while the outer `{` of a block being expanded is still ahead.
    split_outer_block: bool,
}

impl<'t> CalcLexer<'t> {
    pub fn new(text: &'t str) -> Self {
        Self { text, cursor: Cursor::new(text), split_outer_block: false }
    }

    /// Lexer for the text of a [`BLOCK`] token.
    pub fn for_block(text: &'t str) -> Self {
        Self { split_outer_block: true, ..Self::new(text) }
    }

    fn offset(&self) -> TextSize {
        TextSize::new(self.text.len() as u32) - self.cursor.len()
    }

    fn range(&self) -> TextRange {
        let len = self.cursor.pos_within_token();
        TextRange::at(self.offset() - len, len)
    }

    fn token_text(&self) -> &'t str {
        &self.text[self.range()]
    }

    fn kind(&mut self) -> SyntaxKind {
        match self.cursor.advance() {
            c if c.is_whitespace() => {
                self.cursor.advance_while(char::is_whitespace);
                WHITESPACE
            }
            '/' if self.cursor.matches('/') => {
                self.cursor.advance_while(|c| c != '\n');
                COMMENT
            }
            '+' => PLUS,
            '-' => MINUS,
            '*' => STAR,
            '/' => SLASH,
            '(' => L_PAREN,
            ')' => R_PAREN,
            '[' => L_BRACK,
            ']' => R_BRACK,
            ',' => COMMA,
            ';' => SEMI,
            '=' => EQ,
            '{' if self.split_outer_block => {
                self.split_outer_block = false;
                L_BRACE
            }
            '{' => {
                self.block();
                BLOCK
            }
            '}' => R_BRACE,
            '0'..='9' => {
                self.cursor.advance_while(|c| c.is_ascii_digit() || c == '_');
                if self.cursor.matches('.') && self.cursor.second().is_ascii_digit() {
                    self.cursor.advance();
                    self.cursor.advance_while(|c| c.is_ascii_digit() || c == '_');
                }
                NUMBER
            }
            'A'..='Z' | 'a'..='z' | '_' => {
                self.cursor.advance_while(|c| c.is_ascii_alphanumeric() || c == '_');
                match self.token_text() {
                    "let" => LET_KW,
                    _ => IDENT,
                }
            }
            _ => UNKNOWN,
        }
    }

    /// Skips to the brace closing the one just consumed, or to the end.
    fn block(&mut self) {
        let mut depth = 1u32;
        while depth > 0 {
            match self.cursor.advance() {
                EOF_CHAR if self.cursor.is_eof() => break,
                '{' => depth += 1,
                '}' => depth -= 1,
                '/' if self.cursor.matches('/') => self.cursor.advance_while(|c| c != '\n'),
                _ => {}
            }
        }
    }
}

impl Lexer for CalcLexer<'_> {
    fn next_token(&mut self) -> Option<RawToken> {
        if self.cursor.is_eof() {
            return None;
        }
        let kind = self.kind();
        let range = self.range();
        self.cursor.reset_pos_within_token();
        Some(RawToken { kind, range })
    }
}
