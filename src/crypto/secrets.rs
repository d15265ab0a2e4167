use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The size of a refresh token id in bytes.
const REFRESH_TOKEN_ID_SIZE: usize = 32;

/// Generates a new random refresh token id.
///
/// # Returns
///
/// A URL-safe base64-encoded opaque identifier.
pub fn generate_refresh_token_id() -> String {
    let mut id = [0u8; REFRESH_TOKEN_ID_SIZE];
    OsRng.fill_bytes(&mut id);

    general_purpose::URL_SAFE_NO_PAD.encode(id)
}

/// Hashes a raw refresh token for storage. Only the hash is ever persisted.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time comparison of two stored/presented hashes.
pub fn hashes_match(stored: &str, presented: &str) -> bool {
    stored.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_token_ids_are_unique_and_url_safe() {
        let a = generate_refresh_token_id();
        let b = generate_refresh_token_id();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn hash_is_stable_hex_sha256() {
        let hash = hash_refresh_token("token-value");
        assert_eq!(hash, hash_refresh_token("token-value"));
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, hash_refresh_token("token-value2"));
    }

    #[test]
    fn hashes_match_compares_exactly() {
        let hash = hash_refresh_token("abc");
        assert!(hashes_match(&hash, &hash_refresh_token("abc")));
        assert!(!hashes_match(&hash, &hash_refresh_token("abd")));
        assert!(!hashes_match(&hash, &hash[..10]));
    }
}
