//! Chameleons: nodes whose contents are parsed only when first visited.

use loam_errors::BuildError;
use loam_syntax::{NodeId, SyntaxKind, SyntaxTree};
use once_cell::unsync::OnceCell;
use rustc_hash::FxHashMap;
use text_size::TextSize;

use crate::grammar::LazyKind;
use crate::lexemes::Lexemes;
use crate::production::ItemBody;
use crate::{Builder, BuilderConfig, Grammar};

struct Slot<'t> {
    first: usize,
    end: usize,
    contents: OnceCell<Box<Builder<'t>>>,
}

/// Parsed light chameleons of one builder, keyed by absolute start offset.
#[derive(Default)]
pub(crate) struct Chameleons<'t> {
    slots: Vec<Slot<'t>>,
    by_offset: FxHashMap<TextSize, usize>,
}

impl<'t> Builder<'t> {
    pub(crate) fn is_light_lazy(&self, kind: SyntaxKind) -> bool {
        matches!(self.grammar.lazy_kind(kind), Some(LazyKind::LightLazy { .. }))
    }

    /// Registers every light chameleon reachable in the light tree. The first
    /// one seen at an offset owns the slot.
    pub(crate) fn collect_chameleons(&mut self, root: u32) -> Result<(), BuildError> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(marker) = stack.pop() {
            let mut lexeme = self.items.get(marker).lexeme;
            for child in self.links.children(marker) {
                let item = self.items.get(child);
                self.light_lazy_lexemes(lexeme, item.lexeme, &mut found);
                lexeme = lexeme.max(item.lexeme);
                let Some(done) = item.done() else { continue };
                let done = self.items.get(done);
                match (&item.body, &done.body) {
                    (ItemBody::Start { kind, .. }, ItemBody::Done { collapse: true, .. }) => {
                        if self.is_light_lazy(*kind) {
                            found.push((item.lexeme, done.lexeme));
                        }
                    }
                    _ => stack.push(child),
                }
                lexeme = done.lexeme;
            }
            if let Some(done) = self.items.get(marker).done() {
                self.light_lazy_lexemes(lexeme, self.items.get(done).lexeme, &mut found);
            }
        }

        if self.config.cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        self.chameleons = Chameleons::default();
        for (first, end) in found {
            let offset = self.offset + self.lexemes.start(first);
            let slots = &mut self.chameleons.slots;
            self.chameleons.by_offset.entry(offset).or_insert_with(|| {
                slots.push(Slot { first, end, contents: OnceCell::new() });
                slots.len() - 1
            });
        }
        Ok(())
    }

    fn light_lazy_lexemes(&self, first: usize, end: usize, found: &mut Vec<(usize, usize)>) {
        let end = end.min(self.lexemes.count());
        for lexeme in first..end {
            if self.is_light_lazy(self.lexemes.kinds[lexeme]) {
                found.push((lexeme, lexeme + 1));
            }
        }
    }

    /// Builder holding the parsed contents of the chameleon over lexemes
    /// `first..end`. Parsed on first request and memoized.
    pub(crate) fn chameleon_contents(
        &self,
        kind: SyntaxKind,
        first: usize,
        end: usize,
    ) -> Result<&Builder<'t>, BuildError> {
        let offset = self.offset + self.lexemes.start(first);
        let slot = self.chameleons.by_offset.get(&offset).map(|&index| &self.chameleons.slots[index]);
        let Some(slot) = slot.filter(|slot| slot.first == first && slot.end == end) else {
            tracing::error!(?offset, first, end, "chameleon cache does not match the node");
            return Err(BuildError::WrongChameleon { offset });
        };
        let contents = slot.contents.get_or_try_init(|| self.parse_chameleon(kind, first, end))?;
        Ok(contents)
    }

    fn parse_chameleon(
        &self,
        kind: SyntaxKind,
        first: usize,
        end: usize,
    ) -> Result<Box<Builder<'t>>, BuildError> {
        let source: &'t str = self.text;
        let range = self.lexemes.range(first, end);
        let text = &source[range];
        let lexemes = if end - first == 1 {
            Lexemes::lex(text, self.grammar.lexer(text, Some(kind)), self.grammar, &self.config.cancel)?
        } else {
            Lexemes::slice(&self.lexemes, first, end, range.len())
        };
        tracing::trace!(kind = self.grammar.kind_name(kind), ?range, "parsing chameleon");

        let mut nested =
            Builder::from_lexemes(text, self.grammar, self.config.clone(), lexemes, self.offset + range.start());
        nested.any_language_whitespace = self.any_language_whitespace.clone();
        self.grammar.parse_lazy(kind, &mut nested);
        nested.prepare()?;
        Ok(Box::new(nested))
    }

    /// Drops every parsed chameleon.
    pub fn release_chameleons(&mut self) {
        for slot in &mut self.chameleons.slots {
            slot.contents.take();
        }
    }

    #[cfg(test)]
    pub(crate) fn parsed_chameleons(&self) -> usize {
        self.chameleons.slots.iter().filter(|slot| slot.contents.get().is_some()).count()
    }
}

/// Parses the contents of a collapsed chameleon of `tree` in place.
///
/// Returns `Ok(false)` when `node` is not an unexpanded lazy chameleon.
/// Cached lexemes are used when the node kept them.
pub fn expand_chameleon(
    tree: &mut SyntaxTree,
    node: NodeId,
    grammar: &dyn Grammar,
    config: &BuilderConfig,
) -> Result<bool, BuildError> {
    if !tree.is_collapsed_chameleon(node) {
        return Ok(false);
    }
    let kind = tree.kind(node);
    let text = tree.leaf_text(node).unwrap_or_default().to_owned();
    let lexemes = match tree.cached_tokens(node) {
        Some(tokens) => Lexemes::from_cached(tokens),
        None => Lexemes::lex(&text, grammar.lexer(&text, Some(kind)), grammar, &config.cancel)?,
    };

    let mut builder = Builder::from_lexemes(&text, grammar, config.clone(), lexemes, TextSize::new(0));
    grammar.parse_lazy(kind, &mut builder);
    let contents = builder.build_tree()?;
    tracing::debug!(kind = grammar.kind_name(kind), range = ?tree.range(node), "expanded chameleon");
    Ok(tree.expand_chameleon(node, &contents))
}
