use std::fs;
use std::path::{Path, PathBuf};

use expect_test::{expect, expect_file};
use loam_syntax::TreeEdit;
use loam_tokenizer::calc::*;
use loam_tokenizer::{Lexer, RawToken};
use text_size::TextRange;

use crate::calc::{self, CalcGrammar};
use crate::{
    BuildError, Builder, BuilderConfig, DiffLog, Grammar, LazyKind, LightNode, NodeId, ParseOutcome,
    ReparseComparator, SyntaxKind, SyntaxTree, TokenSet, Verdict, expand_chameleon,
};

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct TestCase {
    input: PathBuf,
    expected: PathBuf,
    text: String,
}

impl TestCase {
    fn list() -> Vec<Self> {
        let test_data_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("test_data");

        let mut cases = fs::read_dir(&test_data_dir)
            .unwrap_or_else(|err| {
                panic!("Cannot read directory {}: {err}", test_data_dir.display())
            })
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                if path.extension()? == "calc" {
                    let expected = path.with_extension("ir");
                    let text = fs::read_to_string(&path).ok()?;
                    Some(Self { input: path, expected, text })
                } else {
                    None
                }
            })
            .collect::<Vec<_>>();

        cases.sort();
        cases
    }
}

fn build(text: &str) -> SyntaxTree {
    let mut b = Builder::new(text, &CalcGrammar).unwrap();
    calc::parse(&mut b);
    b.build_tree().unwrap()
}

fn dump(tree: &SyntaxTree) -> String {
    tree.debug_dump(kind_name)
}

fn find(tree: &SyntaxTree, kind: SyntaxKind) -> NodeId {
    let mut found = None;
    tree.preorder(tree.root(), |tree, node, _| {
        if found.is_none() && tree.kind(node) == kind {
            found = Some(node);
        }
        found.is_none()
    });
    found.unwrap_or_else(|| panic!("no {} node", kind_name(kind)))
}

fn light_find<'b, 't>(node: LightNode<'b, 't>, kind: SyntaxKind) -> Option<LightNode<'b, 't>> {
    if node.kind() == kind {
        return Some(node);
    }
    if node.is_token() {
        return None;
    }
    node.children().unwrap().into_iter().find_map(|child| light_find(child, kind))
}

fn reparse(old: &SyntaxTree, old_text: &str, new_text: &str) -> ParseOutcome {
    let mut b = Builder::new(new_text, &CalcGrammar).unwrap().with_reparse(old, old_text);
    calc::parse(&mut b);
    b.tree_built().unwrap()
}

fn expect_reparsed(outcome: ParseOutcome) -> DiffLog {
    match outcome {
        ParseOutcome::Reparsed(log) => log,
        ParseOutcome::Built(_) => panic!("expected an incremental merge"),
    }
}

#[test]
fn parse() {
    for case in TestCase::list() {
        let mut b = Builder::new(&case.text, &CalcGrammar).unwrap();
        calc::parse(&mut b);
        let light = b.light_tree().unwrap().dump().unwrap();
        let tree = b.build_tree().unwrap();
        assert_eq!(dump(&tree), light, "{}", case.input.display());
        assert_eq!(tree.text(), case.text);

        let diagnostics = tree
            .errors()
            .iter()
            .map(|d| format!("  {}", d.message()))
            .collect::<Vec<_>>()
            .join("\n");
        let actual = format!("{light}\nErrors:\n{diagnostics}");
        expect_file![&case.expected].assert_eq(&actual);
    }
}

#[test]
fn light_and_heavy_trees_agree_around_errors() {
    for text in ["1+", ") 1;", "let = ;", "{ a; }", "1 +\n// c\n[1,;"] {
        let mut b = Builder::new(text, &CalcGrammar).unwrap();
        calc::parse(&mut b);
        let light = b.light_tree().unwrap().dump().unwrap();
        assert_eq!(dump(&b.build_tree().unwrap()), light, "{text:?}");
    }
}

#[test]
fn collapsed_single_lexeme_keeps_cached_tokens() {
    let mut b = Builder::new("[", &CalcGrammar).unwrap();
    calc::parse(&mut b);
    {
        let light = b.light_tree().unwrap();
        let list = light_find(light.root(), LIST).unwrap();
        let fragment = list.to_tree().unwrap();
        assert!(fragment.cached_tokens(fragment.root()).is_some());
    }
    let tree = b.build_tree().unwrap();
    assert!(tree.cached_tokens(find(&tree, LIST)).is_some());
}

#[test]
fn whitespace_is_partitioned_between_nodes() {
    let text = "  // lead\nlet a = (1 + 2) ; // trail\n\n";
    let tree = build(text);
    assert_eq!(tree.text(), text);
    assert_eq!(tree.range(tree.root()), TextRange::up_to(text.len().try_into().unwrap()));

    let stmt = find(&tree, LET_STMT);
    assert_eq!(&text[tree.range(stmt)], "let a = (1 + 2) ;");
    let paren = find(&tree, PAREN);
    assert_eq!(&text[tree.range(paren)], "(1 + 2)");
}

#[test]
fn light_chameleons_parse_once_on_navigation() {
    let text = "let a = { 1; } + [2];";
    let mut b = Builder::new(text, &CalcGrammar).unwrap();
    calc::parse(&mut b);
    {
        let tree = b.light_tree().unwrap();
        let block = light_find(tree.root(), BLOCK).unwrap();
        assert!(block.is_chameleon());
        assert_eq!(block.builder().parsed_chameleons(), 0);

        let children = block.children().unwrap();
        assert_eq!(
            format!("{children:?}"),
            "[L_BRACE@8..9, WHITESPACE@9..10, EXPR_STMT@10..12, WHITESPACE@12..13, R_BRACE@13..14]"
        );
        assert_eq!(block.children().unwrap(), children);
        assert_eq!(block.builder().parsed_chameleons(), 1);
        assert_eq!(children[2].text(), "1;");
        assert_eq!(children[2].parent().map(|parent| parent.kind()), Some(BLOCK));

        let list = light_find(tree.root(), LIST).unwrap();
        let children = list.children().unwrap();
        assert_eq!(format!("{children:?}"), "[L_BRACK@17..18, NUMBER@18..19, R_BRACK@19..20]");
        assert_eq!(list.builder().parsed_chameleons(), 2);
    }

    b.release_chameleons();
    assert_eq!(b.parsed_chameleons(), 0);
    let tree = b.light_tree().unwrap();
    let block = light_find(tree.root(), BLOCK).unwrap();
    assert_eq!(block.children().unwrap().len(), 5);
    assert_eq!(block.builder().parsed_chameleons(), 1);
}

#[test]
fn mismatched_chameleon_is_reported() {
    let mut b = Builder::new("{}", &CalcGrammar).unwrap();
    let root = b.mark();
    let empty = b.mark();
    empty.collapse(&mut b, LIST);
    b.advance_lexer();
    assert!(b.eof());
    root.done(&mut b, FILE);

    let tree = b.light_tree().unwrap();
    let children = tree.root().children().unwrap();
    assert_eq!(format!("{children:?}"), "[LIST@0..0, BLOCK@0..2]");
    assert_eq!(children[1].children(), Err(BuildError::WrongChameleon { offset: 0.into() }));
}

#[test]
fn expand_chameleons_in_heavy_tree() {
    let text = "let a = { 1; } + [2];";
    let mut tree = build(text);
    let config = BuilderConfig::default();

    let list = find(&tree, LIST);
    assert!(tree.cached_tokens(list).is_some());
    assert_eq!(expand_chameleon(&mut tree, list, &CalcGrammar, &config), Ok(true));
    assert!(tree.cached_tokens(list).is_none());
    assert_eq!(expand_chameleon(&mut tree, list, &CalcGrammar, &config), Ok(false));

    let block = find(&tree, BLOCK);
    assert!(tree.cached_tokens(block).is_none());
    assert_eq!(expand_chameleon(&mut tree, block, &CalcGrammar, &config), Ok(true));
    assert_eq!(tree.text(), text);

    expect![[r#"
        FILE@0..21
          LET_STMT@0..21
            LET_KW@0..3 "let"
            WHITESPACE@3..4 " "
            IDENT@4..5 "a"
            WHITESPACE@5..6 " "
            EQ@6..7 "="
            WHITESPACE@7..8 " "
            EXPR@8..20
              BLOCK@8..14
                L_BRACE@8..9 "{"
                WHITESPACE@9..10 " "
                EXPR_STMT@10..12
                  NUMBER@10..11 "1"
                  SEMI@11..12 ";"
                WHITESPACE@12..13 " "
                R_BRACE@13..14 "}"
              WHITESPACE@14..15 " "
              PLUS@15..16 "+"
              WHITESPACE@16..17 " "
              LIST@17..20
                L_BRACK@17..18 "["
                NUMBER@18..19 "2"
                R_BRACK@19..20 "]"
            SEMI@20..21 ";"
    "#]]
    .assert_eq(&dump(&tree));
}

#[test]
fn reparse_replaces_changed_leaf() {
    let old_text = "let a = 1;\n{ a; };\n";
    let new_text = "let a = 12;\n{ a; };\n";
    let mut old = build(old_text);

    let log = expect_reparsed(reparse(&old, old_text, new_text));
    assert_eq!(log.len(), 1);
    assert!(matches!(log.edits(), [TreeEdit::Replace { .. }]));
    log.apply(&mut old);

    assert_eq!(dump(&old), dump(&build(new_text)));
    assert_eq!(old.text(), new_text);
}

#[test]
fn reparse_inserts_new_statement() {
    let old_text = "1;\n";
    let new_text = "1;\n2;\n";
    let mut old = build(old_text);

    let log = expect_reparsed(reparse(&old, old_text, new_text));
    assert_eq!(log.len(), 2);
    log.apply(&mut old);
    assert_eq!(dump(&old), dump(&build(new_text)));
}

#[test]
fn reparse_deletes_statement() {
    let old_text = "1;\n2;\n3;\n";
    let new_text = "1;\n3;\n";
    let mut old = build(old_text);

    let log = expect_reparsed(reparse(&old, old_text, new_text));
    log.apply(&mut old);
    assert_eq!(dump(&old), dump(&build(new_text)));
}

#[test]
fn reparse_of_same_text_is_empty() {
    let text = "let a = [1, 2];\n{ a; };\n";
    let old = build(text);
    assert!(expect_reparsed(reparse(&old, text, text)).is_empty());
}

#[test]
fn reparse_drills_into_expanded_blocks() {
    let old_text = "{ a; };";
    let new_text = "{ ab; };";
    let config = BuilderConfig::default();
    let mut old = build(old_text);
    let block = find(&old, BLOCK);
    assert_eq!(expand_chameleon(&mut old, block, &CalcGrammar, &config), Ok(true));

    let log = expect_reparsed(reparse(&old, old_text, new_text));
    assert_eq!(log.len(), 1);
    log.apply(&mut old);

    let mut fresh = build(new_text);
    let block = find(&fresh, BLOCK);
    assert_eq!(expand_chameleon(&mut fresh, block, &CalcGrammar, &config), Ok(true));
    assert_eq!(dump(&old), dump(&fresh));
}

#[test]
fn applied_reparse_matches_fresh_build() {
    let texts = [
        "",
        "1;",
        "1; 2;",
        "let a = 1;",
        "let a = 1 + 2 * 3;",
        "let a = 1;\nlet b = a;\n",
        "// c\nlet a = (1);",
        "{ 1; };",
        "{ 1; 2; }; [1, 2];",
        "let a = [1, [2]] + { a; };",
        "1 +",
        ") 1;",
        "let = ;",
        "-(-a) / b;\n",
    ];
    for old_text in texts {
        for new_text in texts {
            let mut tree = build(old_text);
            match reparse(&tree, old_text, new_text) {
                ParseOutcome::Built(fresh) => tree = fresh,
                ParseOutcome::Reparsed(log) => log.apply(&mut tree),
            }
            assert_eq!(dump(&tree), dump(&build(new_text)), "{old_text:?} -> {new_text:?}");
            assert_eq!(tree.text(), new_text);
        }
    }
}

fn whitespace_as_comment(kind: SyntaxKind, _: TextRange, _: &str) -> SyntaxKind {
    if kind == WHITESPACE { COMMENT } else { kind }
}

#[test]
fn registered_whitespace_matches_old_whitespace() {
    let text = "1;  2;";
    let old = build(text);

    let mut b = Builder::new(text, &CalcGrammar).unwrap().with_reparse(&old, text);
    b.set_token_remapper(whitespace_as_comment);
    calc::parse(&mut b);
    assert!(!expect_reparsed(b.tree_built().unwrap()).is_empty());

    let mut b = Builder::new(text, &CalcGrammar).unwrap().with_reparse(&old, text);
    b.set_token_remapper(whitespace_as_comment);
    b.register_whitespace_token(COMMENT);
    calc::parse(&mut b);
    assert!(expect_reparsed(b.tree_built().unwrap()).is_empty());
}

#[test]
fn reparse_falls_back_to_full_build() {
    let text = "1;";
    let old = build(text);

    let mut b = Builder::new(text, &CalcGrammar).unwrap().with_reparse(&old, text);
    let root = b.mark();
    while !b.eof() {
        b.advance_lexer();
    }
    root.done(&mut b, EXPR);
    let ParseOutcome::Built(tree) = b.tree_built().unwrap() else {
        panic!("root kind changed, expected a fresh tree");
    };
    assert_eq!(tree.kind(tree.root()), EXPR);

    // The old tree was built from a different text.
    assert!(matches!(reparse(&old, "12;", text), ParseOutcome::Built(_)));
}

#[test]
fn deep_trees_are_flagged_and_rebuilt() {
    let text = "((1));";
    let old = build(text);
    assert!(!old.depth_limit_exceeded());

    let config = BuilderConfig { depth_limit: 2, ..BuilderConfig::default() };
    let mut b = Builder::with_config(text, &CalcGrammar, config).unwrap().with_reparse(&old, text);
    calc::parse(&mut b);
    assert!(b.light_tree().unwrap().depth_limit_exceeded());
    let ParseOutcome::Built(tree) = b.tree_built().unwrap() else {
        panic!("deep tree must not be merged");
    };
    assert!(tree.depth_limit_exceeded());
    assert_eq!(dump(&tree), dump(&old));
}

struct NumbersDiffer;

impl ReparseComparator for NumbersDiffer {
    fn compare(&self, _old: &SyntaxTree, _old_node: NodeId, new: LightNode<'_, '_>) -> Verdict {
        if new.kind() == NUMBER { Verdict::No } else { Verdict::Unsure }
    }
}

#[test]
fn custom_comparator_takes_precedence() {
    let text = "1;";
    let old = build(text);

    let mut b = Builder::new(text, &CalcGrammar).unwrap().with_reparse(&old, text);
    b.set_reparse_comparator(NumbersDiffer);
    calc::parse(&mut b);
    let log = expect_reparsed(b.tree_built().unwrap());
    assert!(matches!(log.edits(), [TreeEdit::Replace { .. }]));
}

#[test]
fn cancellation_aborts_lexing_and_building() {
    let config = BuilderConfig::default();
    config.cancel.cancel();
    let error = Builder::with_config("1;", &CalcGrammar, config).unwrap_err();
    assert_eq!(error, BuildError::Cancelled);

    let config = BuilderConfig::default();
    let mut b = Builder::with_config("1;", &CalcGrammar, config.clone()).unwrap();
    calc::parse(&mut b);
    config.cancel.cancel();
    assert!(b.build_tree().unwrap_err().is_cancelled());
}

#[test]
fn empty_production_is_rejected() {
    let mut b = Builder::new("1", &CalcGrammar).unwrap();
    assert_eq!(b.build_tree().unwrap_err(), BuildError::NoMarkers);
}

#[test]
fn unconsumed_tokens_are_rejected() {
    let mut b = Builder::new("1 2", &CalcGrammar).unwrap();
    let root = b.mark();
    b.advance_lexer();
    root.done(&mut b, FILE);
    expect![[r#"
        UnconsumedTokens {
            offset: 1,
            tokens: "WHITESPACE(\" \") NUMBER(\"2\")",
        }
    "#]]
    .assert_debug_eq(&b.build_tree().unwrap_err());
}

#[test]
fn tokens_after_root_are_rejected() {
    let mut b = Builder::new("1 2", &CalcGrammar).unwrap();
    let root = b.mark();
    b.advance_lexer();
    root.done(&mut b, FILE);
    while !b.eof() {
        b.advance_lexer();
    }
    expect![[r#"
        TokensOutsideRoot {
            offset: 1,
            count: 2,
            tokens: "WHITESPACE(\" \") NUMBER(\"2\")",
        }
    "#]]
    .assert_debug_eq(&b.build_tree().unwrap_err());
}

const FOREIGN: SyntaxKind = SyntaxKind(64);

/// `calc` with a foreign token before every `;`, heavy-only blocks and
/// opaque lists.
struct Injected;

struct WithForeign<'a> {
    inner: CalcLexer<'a>,
    pending: Option<RawToken>,
}

impl Lexer for WithForeign<'_> {
    fn next_token(&mut self) -> Option<RawToken> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }
        let token = self.inner.next_token()?;
        if token.kind != SEMI {
            return Some(token);
        }
        self.pending = Some(token);
        Some(RawToken { kind: FOREIGN, range: TextRange::empty(token.range.start()) })
    }
}

impl Grammar for Injected {
    fn whitespace(&self) -> TokenSet {
        WHITESPACE_SET
    }

    fn comments(&self) -> TokenSet {
        COMMENT_SET
    }

    fn kind_name(&self, kind: SyntaxKind) -> &'static str {
        if kind == FOREIGN { "FOREIGN" } else { kind_name(kind) }
    }

    fn lexer<'a>(&self, text: &'a str, _chameleon: Option<SyntaxKind>) -> Box<dyn Lexer + 'a> {
        Box::new(WithForeign { inner: CalcLexer::new(text), pending: None })
    }

    fn foreign_text(&self, kind: SyntaxKind) -> Option<&'static str> {
        (kind == FOREIGN).then_some("<ins>")
    }

    fn lazy_kind(&self, kind: SyntaxKind) -> Option<LazyKind> {
        match kind {
            BLOCK => Some(LazyKind::Lazy { reuse_tokens: false }),
            LIST => Some(LazyKind::Custom),
            _ => None,
        }
    }
}

fn flat(b: &mut Builder<'_>) {
    let root = b.mark();
    while let Some(kind) = b.token_kind() {
        if kind == L_BRACK {
            let list = b.mark();
            while !b.eof() && !b.eat(R_BRACK) {
                b.advance_lexer();
            }
            list.collapse(b, LIST);
        } else {
            b.advance_lexer();
        }
    }
    root.done(b, FILE);
}

#[test]
fn foreign_and_opaque_leaves() {
    let text = "[1] {2;};";
    let mut b = Builder::new(text, &Injected).unwrap();
    flat(&mut b);

    let light = {
        let tree = b.light_tree().unwrap();
        let block = light_find(tree.root(), BLOCK).unwrap();
        assert!(!block.is_chameleon());
        assert!(block.children().unwrap().is_empty());
        let foreign = light_find(tree.root(), FOREIGN).unwrap();
        assert!(foreign.is_foreign());
        assert_eq!(foreign.text(), "<ins>");
        tree.dump().unwrap()
    };
    expect![[r#"
        FILE@0..9
          LIST@0..3 custom "[1]"
          WHITESPACE@3..4 " "
          BLOCK@4..8 lazy "{2;}"
          FOREIGN@8..8 foreign "<ins>"
          SEMI@8..9 ";"
    "#]]
    .assert_eq(&light);

    let tree = b.build_tree().unwrap();
    assert_eq!(tree.debug_dump(|kind| Injected.kind_name(kind)), light);
    assert_eq!(tree.text(), text);
    assert!(tree.is_custom(find(&tree, LIST)));
    assert!(tree.is_collapsed_chameleon(find(&tree, BLOCK)));
}
