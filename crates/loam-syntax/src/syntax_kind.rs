/// Kind of a token or node.
///
/// Kinds are plain numbers owned by a grammar. Only [`SyntaxKind::ERROR`] is
/// reserved: the builder uses it for error nodes and free-standing error items.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct SyntaxKind(pub u16);

impl SyntaxKind {
    pub const ERROR: Self = Self(0);

    #[inline]
    pub const fn is_error(self) -> bool {
        self.0 == Self::ERROR.0
    }
}

impl From<u16> for SyntaxKind {
    #[inline]
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}
