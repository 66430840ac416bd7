use std::sync::Arc;

use rustc_hash::FxHashSet;

/// Interner for leaf text.
///
/// Identical token texts share one allocation across a tree and the fragments
/// grafted into it.
#[derive(Default)]
pub struct CharTable {
    strings: FxHashSet<Arc<str>>,
}

impl CharTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Arc<str> {
        if let Some(interned) = self.strings.get(text) {
            return Arc::clone(interned);
        }
        let interned: Arc<str> = Arc::from(text);
        self.strings.insert(Arc::clone(&interned));
        interned
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl std::fmt::Debug for CharTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharTable").field("len", &self.len()).finish()
    }
}
