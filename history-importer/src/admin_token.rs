use crate::traits::AdminTokenProvider;
use crate::types::{ImporterError, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

pub const ADMIN_AUDIENCE: &str = "/v3/admin/";
pub const TOKEN_LIFETIME_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: i64,
    exp: i64,
    aud: String,
}

/// Ghost Admin API key (`<id>:<hex secret>`), signing a fresh short-lived
/// HS256 token for every request.
pub struct GhostAdminKey {
    id: String,
    secret: Vec<u8>,
}

impl GhostAdminKey {
    pub fn parse(key: &str) -> Result<Self> {
        let (id, secret) = key
            .trim()
            .split_once(':')
            .ok_or_else(|| ImporterError::AdminKey("expected <id>:<secret>".to_string()))?;
        if id.is_empty() {
            return Err(ImporterError::AdminKey("empty key id".to_string()));
        }
        let secret = hex::decode(secret)
            .map_err(|e| ImporterError::AdminKey(format!("secret is not hex: {}", e)))?;
        if secret.is_empty() {
            return Err(ImporterError::AdminKey("empty secret".to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            secret,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token_at(&self, iat: i64) -> Result<String> {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.id.clone());
        let claims = Claims {
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
            aud: ADMIN_AUDIENCE.to_string(),
        };
        Ok(encode(&header, &claims, &EncodingKey::from_secret(&self.secret))?)
    }
}

impl AdminTokenProvider for GhostAdminKey {
    fn token(&self) -> Result<String> {
        self.token_at(Utc::now().timestamp())
    }
}
