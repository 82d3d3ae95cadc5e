//! Password reset tokens
//!
//! The plain token is sent to the user; only its digest is stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;

/// A freshly generated reset token
#[derive(Debug, Clone)]
pub struct ResetToken {
    /// Value handed to the user
    pub plain: String,
    /// Stored digest of `plain`
    pub digest: String,
    /// When the token stops being accepted
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    /// Generate a random token valid for `ttl`
    pub fn generate(ttl: Duration) -> Self {
        let bytes: [u8; 32] = rand::rng().random();
        let plain = URL_SAFE_NO_PAD.encode(bytes);
        Self {
            digest: digest(&plain),
            plain,
            expires_at: Utc::now() + ttl,
        }
    }
}

/// Hex digest under which a reset token is stored
pub fn digest(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_random_and_digested() {
        let a = ResetToken::generate(Duration::minutes(10));
        let b = ResetToken::generate(Duration::minutes(10));
        assert_ne!(a.plain, b.plain);
        assert_eq!(a.digest, digest(&a.plain));
        assert_ne!(a.digest, a.plain);
        assert_eq!(a.digest.len(), 64);
        assert!(a.expires_at > Utc::now());
    }
}
