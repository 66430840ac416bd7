//! Grammar of `calc`, the reference language of this crate.
//!
//! ```text
//! file     = stmt*
//! stmt     = 'let' IDENT '=' expr ';' | expr ';'
//! expr     = term (('+' | '-') term)*
//! term     = factor (('*' | '/') factor)*
//! factor   = NUMBER | IDENT | BLOCK | list | '(' expr ')' | '-' factor
//! list     = '[' (expr (',' expr)*)? ']'
//! ```
//!
//! Blocks are lexed as one token and parsed on demand. Lists are collapsed
//! into a single leaf and parsed on demand from the cached lexemes.

use loam_syntax::{SyntaxKind, TokenSet};
use loam_tokenizer::Lexer;
use loam_tokenizer::calc::*;

use crate::grammar::{Grammar, LazyKind};
use crate::Builder;

const ADDITIVE: TokenSet = TokenSet::new([PLUS, MINUS]);
const MULTIPLICATIVE: TokenSet = TokenSet::new([STAR, SLASH]);
const CLOSING: TokenSet = TokenSet::new([R_PAREN, R_BRACE, R_BRACK, SEMI]);

#[derive(Clone, Copy, Debug, Default)]
pub struct CalcGrammar;

impl Grammar for CalcGrammar {
    fn whitespace(&self) -> TokenSet {
        WHITESPACE_SET
    }

    fn comments(&self) -> TokenSet {
        COMMENT_SET
    }

    fn kind_name(&self, kind: SyntaxKind) -> &'static str {
        kind_name(kind)
    }

    fn lexer<'a>(&self, text: &'a str, chameleon: Option<SyntaxKind>) -> Box<dyn Lexer + 'a> {
        match chameleon {
            Some(BLOCK) => Box::new(CalcLexer::for_block(text)),
            _ => Box::new(CalcLexer::new(text)),
        }
    }

    fn lazy_kind(&self, kind: SyntaxKind) -> Option<LazyKind> {
        match kind {
            BLOCK => Some(LazyKind::LightLazy { reuse_tokens: false }),
            LIST => Some(LazyKind::LightLazy { reuse_tokens: true }),
            _ => None,
        }
    }

    fn parse_lazy(&self, kind: SyntaxKind, b: &mut Builder<'_>) {
        match kind {
            BLOCK => block_contents(b),
            LIST => list_contents(b),
            _ => {
                let root = b.mark();
                rest_as_error(b);
                root.done(b, kind);
            }
        }
    }
}

/// Parses a whole `calc` file.
pub fn parse(b: &mut Builder<'_>) {
    let m = b.mark();
    while !b.eof() {
        stmt_with_recovery(b);
    }
    m.done(b, FILE);
}

fn block_contents(b: &mut Builder<'_>) {
    let m = b.mark();
    b.expect(L_BRACE, "expected `{`");
    while !b.eof() && !b.at(R_BRACE) {
        stmt_with_recovery(b);
    }
    b.expect(R_BRACE, "expected `}`");
    rest_as_error(b);
    m.done(b, BLOCK);
}

fn list_contents(b: &mut Builder<'_>) {
    let m = b.mark();
    b.expect(L_BRACK, "expected `[`");
    while !b.eof() && !b.at(R_BRACK) {
        let before = b.current_offset();
        expr(b);
        if b.current_offset() == before {
            skip_one(b);
        } else if !b.at(R_BRACK) {
            b.expect(COMMA, "expected `,`");
        }
    }
    b.expect(R_BRACK, "expected `]`");
    rest_as_error(b);
    m.done(b, LIST);
}

fn rest_as_error(b: &mut Builder<'_>) {
    if b.eof() {
        return;
    }
    let m = b.mark();
    while !b.eof() {
        b.advance_lexer();
    }
    m.error(b, "unexpected tokens");
}

fn skip_one(b: &mut Builder<'_>) {
    let m = b.mark();
    b.advance_lexer();
    m.error(b, "unexpected token");
}

fn stmt_with_recovery(b: &mut Builder<'_>) {
    let before = b.current_offset();
    stmt(b);
    if !b.eof() && b.current_offset() == before {
        skip_one(b);
    }
}

fn stmt(b: &mut Builder<'_>) {
    let m = b.mark();
    if b.eat(LET_KW) {
        b.expect(IDENT, "expected identifier");
        b.expect(EQ, "expected `=`");
        expr(b);
        b.expect(SEMI, "expected `;`");
        m.done(b, LET_STMT);
    } else {
        expr(b);
        b.expect(SEMI, "expected `;`");
        m.done(b, EXPR_STMT);
    }
}

fn expr(b: &mut Builder<'_>) {
    binary(b, &ADDITIVE, EXPR, term);
}

fn term(b: &mut Builder<'_>) {
    binary(b, &MULTIPLICATIVE, TERM, factor);
}

/// Left-associative chain of `operand`s kept flat under one node.
fn binary(b: &mut Builder<'_>, operators: &TokenSet, kind: SyntaxKind, operand: fn(&mut Builder<'_>)) {
    let m = b.mark();
    operand(b);
    if !b.at_any(operators) {
        m.drop(b);
        return;
    }
    while b.at_any(operators) {
        b.advance_lexer();
        operand(b);
    }
    m.done(b, kind);
}

fn factor(b: &mut Builder<'_>) {
    match b.token_kind() {
        None => b.error("expected expression"),
        Some(NUMBER | IDENT | BLOCK) => b.advance_lexer(),
        Some(L_PAREN) => {
            let m = b.mark();
            b.advance_lexer();
            expr(b);
            b.expect(R_PAREN, "expected `)`");
            m.done(b, PAREN);
        }
        Some(MINUS) => {
            let m = b.mark();
            b.advance_lexer();
            factor(b);
            m.done(b, NEG);
        }
        Some(L_BRACK) => list(b),
        Some(kind) if CLOSING.contains(kind) => b.error("expected expression"),
        Some(_) => skip_one(b),
    }
}

/// Collapses a bracketed list, nested brackets included, into one leaf.
fn list(b: &mut Builder<'_>) {
    let m = b.mark();
    let mut depth = 0usize;
    while let Some(kind) = b.token_kind() {
        b.advance_lexer();
        match kind {
            L_BRACK => depth += 1,
            R_BRACK => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    m.collapse(b, LIST);
}
