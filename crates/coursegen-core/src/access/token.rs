//! Signed caller tokens.
//!
//! Tokens are HMAC-SHA256 over the caller's auth uid.
//! Format: `cg_ct_<uid>.<hmac_hex>`

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token prefix used to identify caller tokens.
const TOKEN_PREFIX: &str = "cg_ct_";

/// Environment variable holding the hex-encoded signing secret.
pub const TOKEN_SECRET_ENV: &str = "COURSEGEN_TOKEN_SECRET";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    #[error("token HMAC verification failed")]
    HmacMismatch,

    #[error("missing token secret")]
    MissingSecret,
}

/// Secret used to sign and verify caller tokens.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl TokenConfig {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Read the secret from [`TOKEN_SECRET_ENV`] (hex, as written by
    /// `coursegen init`).
    pub fn from_env() -> Result<Self, TokenError> {
        let secret_hex = std::env::var(TOKEN_SECRET_ENV).map_err(|_| TokenError::MissingSecret)?;
        Self::from_hex(&secret_hex)
    }

    pub fn from_hex(secret_hex: &str) -> Result<Self, TokenError> {
        let secret = hex::decode(secret_hex.trim())
            .map_err(|e| TokenError::InvalidFormat(format!("token secret is not valid hex: {e}")))?;
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self::new(secret))
    }
}

/// Issue a token for the caller identified by `uid`.
pub fn generate_token(config: &TokenConfig, uid: &str) -> String {
    let mac = compute_hmac(&config.secret, uid.as_bytes());
    format!("{TOKEN_PREFIX}{uid}.{}", hex::encode(mac))
}

/// Verify a token and return the uid it was issued for.
///
/// The uid may itself contain dots; the signature is everything after the
/// last one.
pub fn validate_token(config: &TokenConfig, token: &str) -> Result<String, TokenError> {
    let rest = token.strip_prefix(TOKEN_PREFIX).ok_or_else(|| {
        TokenError::InvalidFormat(format!("token must start with '{TOKEN_PREFIX}'"))
    })?;

    let (uid, hmac_hex) = rest.rsplit_once('.').ok_or_else(|| {
        TokenError::InvalidFormat("expected '.' between uid and signature".to_string())
    })?;
    if uid.is_empty() {
        return Err(TokenError::InvalidFormat("empty uid".to_string()));
    }

    let provided_mac = hex::decode(hmac_hex)
        .map_err(|e| TokenError::InvalidFormat(format!("invalid hex in hmac: {e}")))?;

    verify_hmac_constant_time(&config.secret, uid.as_bytes(), &provided_mac)?;
    Ok(uid.to_string())
}

fn compute_hmac(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

fn verify_hmac_constant_time(
    key: &[u8],
    message: &[u8],
    expected_mac: &[u8],
) -> Result<(), TokenError> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    mac.verify_slice(expected_mac)
        .map_err(|_| TokenError::HmacMismatch)
}
