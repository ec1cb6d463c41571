//! Derived cache keys

use sha2::{Digest, Sha256};

/// Separator placed between key parts before hashing
const PART_SEPARATOR: &str = "|";

/// Derive a cache key from its parts.
///
/// The parts are joined with `|` and hashed with SHA-256, so the key has a
/// fixed width and is safe to use whatever the parts contain. The digest only
/// guards cache correctness; it is not a security boundary.
///
/// ```
/// use officelm::cache::generate_key;
///
/// let a = generate_key(["summarize", "doc-1", "concise"]);
/// let b = generate_key(["summarize", "doc-1", "concise"]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
pub fn generate_key<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i > 0 {
            hasher.update(PART_SEPARATOR.as_bytes());
        }
        hasher.update(part.as_ref().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(generate_key(["a", "b"]), generate_key(vec!["a", "b"]));
    }

    #[test]
    fn test_same_as_hashing_joined_string() {
        let joined = generate_key(["query text here|doc-7"]);
        assert_eq!(generate_key(["query text here", "doc-7"]), joined);
    }

    #[test]
    fn test_order_and_content_matter() {
        assert_ne!(generate_key(["a", "b"]), generate_key(["b", "a"]));
        assert_ne!(generate_key(["ab"]), generate_key(["a", "b"]));
    }

    #[test]
    fn test_hex_sha256() {
        // sha256("") is well known
        assert_eq!(
            generate_key(Vec::<String>::new()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
