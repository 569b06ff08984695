// Utility functions

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a new invite token. Returns the raw token handed to the invitee;
/// only its hash is stored.
pub fn generate_invite_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash an invite token for storage
pub fn hash_invite_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Invite tokens expire 24 hours after issue.
pub fn invite_expiry() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::hours(24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_tokens_are_unique_and_hex() {
        let a = generate_invite_token();
        let b = generate_invite_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_hash_is_stable() {
        let token = "abc123";
        assert_eq!(hash_invite_token(token), hash_invite_token(token));
        assert_ne!(hash_invite_token(token), token);
    }

    #[test]
    fn expiry_is_in_the_future() {
        assert!(invite_expiry() > chrono::Utc::now());
    }
}
