//! Content and identity hashing (xxh3, stable across runs and platforms)

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// Hex digest of file contents, used to decide whether a file needs re-extraction.
pub fn content_hash(content: &[u8]) -> String {
    format!("{:016x}", xxh3_64(content))
}

/// Hash a sequence of string parts with a separator so `["ab", "c"]` and `["a", "bc"]` differ.
pub fn stable_hash(parts: &[&str]) -> u64 {
    let mut hasher = Xxh3::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash(b"def f():\n    pass\n");
        let b = content_hash(b"def f():\n    pass\n");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, content_hash(b"def g():\n    pass\n"));
    }

    #[test]
    fn test_stable_hash_separates_parts() {
        assert_ne!(stable_hash(&["ab", "c"]), stable_hash(&["a", "bc"]));
    }
}
