//! Bearer-token subject extraction.
//!
//! Authentication and authorization happen upstream; the core only needs
//! the token subject so every chunk records who wrote it. A missing or
//! undecodable token maps to the anonymous user rather than an error.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Recording user when no usable identity is presented.
pub const ANONYMOUS_USER: &str = "anonymous";

/// JWT claims payload (HS256)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject — the recording user
    pub sub: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default)]
    pub exp: i64,
}

/// Decode the subject of a bearer token.
///
/// With a configured secret the signature and expiry are checked; an
/// invalid token falls back to the anonymous user with a warning, since
/// enforcement is the transport layer's job.
pub fn subject_from_bearer(authorization: Option<&str>, secret: Option<&str>) -> String {
    let token = match authorization.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return ANONYMOUS_USER.to_string(),
    };
    let secret = match secret {
        Some(secret) => secret,
        None => return ANONYMOUS_USER.to_string(),
    };

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => data.claims.sub,
        Err(e) => {
            warn!(error = %e, "failed to decode bearer token, recording as anonymous");
            ANONYMOUS_USER.to_string()
        }
    }
}
