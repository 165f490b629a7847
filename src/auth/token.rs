//! HS256 bearer tokens.
//!
//! A token is a compact JWT (`header.claims.signature`, base64url without
//! padding) whose claims carry the subject and an absolute expiry. Signing and
//! verification are pure: no clock reads happen below [`TokenSigner::issue`]
//! and [`TokenSigner::resolve`], which pass the current time down.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALG: &str = "HS256";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: ALG.to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token format")]
    Format,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("missing subject")]
    MissingSubject,
    #[error("invalid signing key")]
    Key,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|_| TokenError::Json)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Json)
}

/// Issues and resolves tokens with one shared HMAC key.
#[derive(Clone)]
pub struct TokenSigner {
    key: SecretString,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes()).map_err(|_| TokenError::Key)
    }

    /// Issue a token for `subject` that expires `ttl_minutes` from now.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue(&self, subject: &str, ttl_minutes: i64) -> Result<String, TokenError> {
        self.issue_at(subject, ttl_minutes, Utc::now().timestamp())
    }

    /// Issue a token as if the current time were `now_unix_seconds`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_at(
        &self,
        subject: &str,
        ttl_minutes: i64,
        now_unix_seconds: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: now_unix_seconds.saturating_add(ttl_minutes.saturating_mul(60)),
            iat: now_unix_seconds,
        };
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(&claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature_b64 = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Return the subject of a valid, unexpired token.
    ///
    /// # Errors
    /// Fails if the token is malformed, the signature does not match or the
    /// token has expired.
    pub fn resolve(&self, token: &str) -> Result<String, TokenError> {
        self.resolve_at(token, Utc::now().timestamp())
            .map(|claims| claims.sub)
    }

    /// Verify a token against `now_unix_seconds` and return its claims.
    ///
    /// A token is valid strictly before its `exp`.
    ///
    /// # Errors
    /// Fails if the token is malformed, the signature does not match, the
    /// subject is empty or the token has expired.
    pub fn resolve_at(&self, token: &str, now_unix_seconds: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::Format)?;
        let claims_b64 = parts.next().ok_or(TokenError::Format)?;
        let sig_b64 = parts.next().ok_or(TokenError::Format)?;
        if parts.next().is_some() {
            return Err(TokenError::Format);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != ALG {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header_b64}.{claims_b64}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.sub.is_empty() {
            return Err(TokenError::MissingSubject);
        }
        if claims.exp <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn signer(key: &str) -> TokenSigner {
        TokenSigner::new(SecretString::from(key.to_string()))
    }

    #[test]
    fn issue_and_resolve() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let token = tokens.issue_at("test@example.com", 60, NOW)?;
        let claims = tokens.resolve_at(&token, NOW)?;
        assert_eq!(claims.sub, "test@example.com");
        assert_eq!(claims.iat, NOW);
        assert_eq!(claims.exp, NOW + 3600);
        Ok(())
    }

    #[test]
    fn resolves_until_ttl_elapses() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let token = tokens.issue_at("a@example.com", 5, NOW)?;
        assert!(tokens.resolve_at(&token, NOW + 5 * 60 - 1).is_ok());
        assert_eq!(
            tokens.resolve_at(&token, NOW + 5 * 60),
            Err(TokenError::Expired)
        );
        assert_eq!(
            tokens.resolve_at(&token, NOW + 6 * 60),
            Err(TokenError::Expired)
        );
        Ok(())
    }

    #[test]
    fn live_clock_resolve() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let token = tokens.issue("me@example.com", 1)?;
        assert_eq!(tokens.resolve(&token)?, "me@example.com");

        let expired = tokens.issue("me@example.com", -1)?;
        assert_eq!(tokens.resolve(&expired), Err(TokenError::Expired));
        Ok(())
    }

    #[test]
    fn other_key_is_rejected() -> Result<(), TokenError> {
        let token = signer("first-key-first-key").issue_at("a@example.com", 60, NOW)?;
        assert_eq!(
            signer("second-key-second-key").resolve_at(&token, NOW),
            Err(TokenError::InvalidSignature)
        );
        Ok(())
    }

    #[test]
    fn tampered_claims_are_rejected() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let token = tokens.issue_at("a@example.com", 60, NOW)?;
        let forged_claims = b64e_json(&Claims {
            sub: "admin@example.com".to_string(),
            exp: NOW + 3600,
            iat: NOW,
        })?;
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_claims;
        let forged = parts.join(".");
        assert_eq!(
            tokens.resolve_at(&forged, NOW),
            Err(TokenError::InvalidSignature)
        );
        Ok(())
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        assert_eq!(tokens.resolve_at("", NOW), Err(TokenError::Format));
        assert_eq!(tokens.resolve_at("a.b", NOW), Err(TokenError::Format));
        assert_eq!(tokens.resolve_at("a.b.c.d", NOW), Err(TokenError::Format));
        assert_eq!(tokens.resolve_at("!!.b.c", NOW), Err(TokenError::Base64));
    }

    #[test]
    fn none_algorithm_is_rejected() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let header = b64e_json(&TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })?;
        let claims = b64e_json(&Claims {
            sub: "a@example.com".to_string(),
            exp: NOW + 60,
            iat: NOW,
        })?;
        assert_eq!(
            tokens.resolve_at(&format!("{header}.{claims}."), NOW),
            Err(TokenError::UnsupportedAlg("none".to_string()))
        );
        Ok(())
    }

    #[test]
    fn empty_subject_is_rejected() -> Result<(), TokenError> {
        let tokens = signer("0123456789abcdef0123456789abcdef");
        let token = tokens.issue_at("", 60, NOW)?;
        assert_eq!(
            tokens.resolve_at(&token, NOW),
            Err(TokenError::MissingSubject)
        );
        Ok(())
    }
}
