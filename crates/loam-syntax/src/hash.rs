//! Additive content hash shared by the light and heavy trees.
//!
//! The hash of a span is the wrapping sum of its characters, so the hash of a
//! node equals the sum of the hashes of the pieces it is made of. Both trees
//! rely on that to compare subtrees without walking them.

#[inline]
pub fn text_hash(text: &str) -> u32 {
    text.chars().fold(0u32, |hash, ch| hash.wrapping_add(ch as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_additive() {
        let whole = text_hash("let x = 1;");
        let parts = text_hash("let ").wrapping_add(text_hash("x = 1;"));
        assert_eq!(whole, parts);
        assert_eq!(text_hash(""), 0);
    }
}
