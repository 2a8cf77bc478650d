/**
 * Session Tokens
 *
 * JWT tokens identifying a chat user. Tokens are issued by the account
 * system; the chat core only verifies them with the shared secret.
 */

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::shared::chat::UserId;

/// Default lifetime of tokens minted by [`create_token`]
pub const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (decimal)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at time (Unix timestamp)
    pub iat: u64,
}

/// Create a JWT token for a user
pub fn create_token(secret: &str, user_id: UserId) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + TOKEN_TTL_SECS).max(0) as u64,
        iat: now.max(0) as u64,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Verify and decode a JWT token
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &key, &Validation::default())?;
    Ok(token_data.claims)
}

/// Extract user ID from token
pub fn get_user_id_from_token(secret: &str, token: &str) -> Result<UserId, String> {
    let claims = verify_token(secret, token)
        .map_err(|e| format!("Token verification failed: {}", e))?;
    claims
        .sub
        .parse::<UserId>()
        .map_err(|e| format!("Invalid user ID in token: {}", e))
}
