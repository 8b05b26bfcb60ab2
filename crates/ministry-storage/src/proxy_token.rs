//! Signed, expiring URLs for the same-origin storage proxy route.
//!
//! Payload: expiry_ts (u64 BE) || storage key bytes.
//! Token = base64url(expiry_ts || HMAC-SHA256(secret, payload)).
//! The key travels in the URL path, so only the expiry and tag are in the token.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::traits::{StorageError, StorageResult};

const EXPIRY_LEN: usize = 8;
const MAC_LEN: usize = 32; // SHA256
const TOKEN_LEN: usize = EXPIRY_LEN + MAC_LEN;

/// Query parameter carrying the token.
pub const TOKEN_PARAM: &str = "token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyTokenError {
    #[error("Invalid storage access token")]
    Invalid,
    #[error("Storage access token has expired")]
    Expired,
}

/// Signs and verifies proxy URLs for private objects.
#[derive(Clone)]
pub struct ProxyUrlSigner {
    base_path: String,
    secret: Vec<u8>,
}

impl std::fmt::Debug for ProxyUrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyUrlSigner")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl ProxyUrlSigner {
    pub fn new(base_path: &str, secret: &[u8]) -> StorageResult<Self> {
        if secret.is_empty() {
            return Err(StorageError::ConfigError(
                "Storage proxy secret must not be empty".to_string(),
            ));
        }
        if !base_path.starts_with('/') {
            return Err(StorageError::ConfigError(
                "Storage proxy base path must start with '/'".to_string(),
            ));
        }

        Ok(Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            secret: secret.to_vec(),
        })
    }

    /// URL for `key` valid for `expires_in` from now.
    pub fn sign(&self, key: &str, expires_in: Duration) -> String {
        self.sign_until(key, now_secs().saturating_add(expires_in.as_secs()))
    }

    /// URL for `key` valid until the given unix timestamp.
    pub fn sign_until(&self, key: &str, expiry_ts: u64) -> String {
        let tag = self.tag(key, expiry_ts);

        let mut token_bytes = [0u8; TOKEN_LEN];
        token_bytes[0..EXPIRY_LEN].copy_from_slice(&expiry_ts.to_be_bytes());
        token_bytes[EXPIRY_LEN..].copy_from_slice(&tag);

        let path: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();

        format!(
            "{}/{}?{}={}",
            self.base_path,
            path.join("/"),
            TOKEN_PARAM,
            base64_url_encode(&token_bytes)
        )
    }

    /// Check a token presented for `key` (the decoded path). Returns the expiry timestamp.
    pub fn verify(&self, key: &str, token: &str) -> Result<u64, ProxyTokenError> {
        self.verify_at(key, token, now_secs())
    }

    pub fn verify_at(&self, key: &str, token: &str, now: u64) -> Result<u64, ProxyTokenError> {
        let decoded = base64_url_decode(token).map_err(|_| ProxyTokenError::Invalid)?;
        if decoded.len() != TOKEN_LEN {
            return Err(ProxyTokenError::Invalid);
        }

        let (expiry, tag) = decoded.split_at(EXPIRY_LEN);
        let mut expiry_bytes = [0u8; EXPIRY_LEN];
        expiry_bytes.copy_from_slice(expiry);
        let expiry_ts = u64::from_be_bytes(expiry_bytes);

        self.mac(key, expiry_ts)
            .verify_slice(tag)
            .map_err(|_| ProxyTokenError::Invalid)?;

        if now > expiry_ts {
            return Err(ProxyTokenError::Expired);
        }

        Ok(expiry_ts)
    }

    fn mac(&self, key: &str, expiry_ts: u64) -> Hmac<Sha256> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(&expiry_ts.to_be_bytes());
        mac.update(key.as_bytes());
        mac
    }

    fn tag(&self, key: &str, expiry_ts: u64) -> [u8; MAC_LEN] {
        let mut tag = [0u8; MAC_LEN];
        tag.copy_from_slice(&self.mac(key, expiry_ts).finalize().into_bytes());
        tag
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

fn base64_url_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn token_of(url: &str) -> &str {
        url.split_once("?token=").unwrap().1
    }

    #[test]
    fn test_signed_url_verifies_for_same_key() {
        let signer = ProxyUrlSigner::new("/storage/", SECRET).unwrap();
        let url = signer.sign_until("recording/church-42/abc.mp3", 2_000);

        assert!(url.starts_with("/storage/recording/church-42/abc.mp3?token="));
        assert_eq!(
            signer.verify_at("recording/church-42/abc.mp3", token_of(&url), 1_000),
            Ok(2_000)
        );
    }

    #[test]
    fn test_token_is_bound_to_key() {
        let signer = ProxyUrlSigner::new("/storage", SECRET).unwrap();
        let url = signer.sign_until("recording/default/a.mp3", 2_000);
        assert_eq!(
            signer.verify_at("recording/default/b.mp3", token_of(&url), 1_000),
            Err(ProxyTokenError::Invalid)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = ProxyUrlSigner::new("/storage", SECRET).unwrap();
        let url = signer.sign_until("sequence/default/a.pdf", 2_000);
        assert_eq!(
            signer.verify_at("sequence/default/a.pdf", token_of(&url), 2_001),
            Err(ProxyTokenError::Expired)
        );
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = ProxyUrlSigner::new("/storage", SECRET).unwrap();
        let other = ProxyUrlSigner::new("/storage", b"another-secret-another-secret-xx").unwrap();
        let url = signer.sign_until("sequence/default/a.pdf", 2_000);
        assert_eq!(
            other.verify_at("sequence/default/a.pdf", token_of(&url), 1_000),
            Err(ProxyTokenError::Invalid)
        );
        assert_eq!(
            signer.verify_at("sequence/default/a.pdf", "not-base64!", 1_000),
            Err(ProxyTokenError::Invalid)
        );
    }

    #[test]
    fn test_tenant_segment_is_percent_encoded() {
        let signer = ProxyUrlSigner::new("/storage", SECRET).unwrap();
        let url = signer.sign_until("recording/st mary's/a.mp3", 2_000);
        assert!(url.starts_with("/storage/recording/st%20mary%27s/a.mp3?token="));
        assert!(signer
            .verify_at("recording/st mary's/a.mp3", token_of(&url), 1_000)
            .is_ok());
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(ProxyUrlSigner::new("/storage", b"").is_err());
        assert!(ProxyUrlSigner::new("https://cdn.example.org", SECRET).is_err());
    }
}
