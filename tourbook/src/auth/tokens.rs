//! Signed, time-limited session tokens (HS256 JWT)

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::error::{Error, Result};

/// Claims carried by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Issues and verifies session tokens
#[derive(Clone)]
pub struct JwtIssuer {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    expires_in: Duration,
}

impl JwtIssuer {
    /// Build from the configured secret and lifetime
    pub fn new(config: &JwtConfig) -> Result<Self> {
        if config.secret.len() < 32 {
            return Err(Error::Config(Box::new(figment::Error::from(
                "jwt.secret must be at least 32 bytes".to_string(),
            ))));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(config.secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(config.secret.as_bytes())),
            validation,
            expires_in: config.expires_in(),
        })
    }

    /// Sign a token for `user_id`
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: user_id.to_string(),
            iat: now,
            exp: now + self.expires_in.as_secs() as i64,
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Verify signature and expiry
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Token lifetime
    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}
