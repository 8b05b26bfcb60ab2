//! Turns a stored key into the URL a client should use.
//!
//! Public categories always get the backend's stable URL. Private categories
//! get either a same-origin proxy URL carrying an HMAC-signed expiry, or a
//! backend-native presigned URL, depending on [`PrivateAccessMode`].

use std::sync::Arc;
use std::time::Duration;

use ministry_core::{CategoryPolicies, PrivateAccessMode, StorageCategory, Visibility};

use crate::proxy_token::ProxyUrlSigner;
use crate::traits::{PutReceipt, StorageAdapter, StorageError, StorageResult};

pub const MIN_URL_EXPIRY: Duration = Duration::from_secs(1);
pub const MAX_URL_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
enum PrivateAccess {
    Proxy(ProxyUrlSigner),
    Signed,
}

#[derive(Debug, Clone)]
pub struct AccessPolicy {
    policies: Arc<CategoryPolicies>,
    private: PrivateAccess,
    default_expiry: Duration,
}

impl AccessPolicy {
    pub fn proxy(policies: Arc<CategoryPolicies>, signer: ProxyUrlSigner, default_expiry: Duration) -> Self {
        Self {
            policies,
            private: PrivateAccess::Proxy(signer),
            default_expiry: clamp_expiry(default_expiry),
        }
    }

    pub fn signed(policies: Arc<CategoryPolicies>, default_expiry: Duration) -> Self {
        Self {
            policies,
            private: PrivateAccess::Signed,
            default_expiry: clamp_expiry(default_expiry),
        }
    }

    pub fn mode(&self) -> PrivateAccessMode {
        match self.private {
            PrivateAccess::Proxy(_) => PrivateAccessMode::Proxy,
            PrivateAccess::Signed => PrivateAccessMode::Signed,
        }
    }

    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    pub fn proxy_signer(&self) -> Option<&ProxyUrlSigner> {
        match &self.private {
            PrivateAccess::Proxy(signer) => Some(signer),
            PrivateAccess::Signed => None,
        }
    }

    /// Refuse combinations that could never hand out a private URL.
    pub fn check_backend<A: StorageAdapter + ?Sized>(&self, adapter: &A) -> StorageResult<()> {
        if matches!(self.private, PrivateAccess::Signed) && !adapter.supports_signed_urls() {
            return Err(StorageError::ConfigError(format!(
                "the {} backend cannot issue signed URLs; use PRIVATE_ACCESS_MODE=proxy",
                adapter.backend_type()
            )));
        }
        Ok(())
    }

    pub async fn url_for<A: StorageAdapter + ?Sized>(
        &self,
        category: StorageCategory,
        key: &str,
        adapter: &A,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        match self.policies.visibility(category) {
            Visibility::Public => {
                adapter
                    .resolve_access_url(key, Visibility::Public, None)
                    .await
            }
            Visibility::Private => self.private_url(key, adapter, expires_in).await,
        }
    }

    /// URL returned from an upload, built from the adapter's receipt for public
    /// categories so the fresh object is never looked up again.
    pub async fn upload_url_for<A: StorageAdapter + ?Sized>(
        &self,
        category: StorageCategory,
        key: &str,
        receipt: &PutReceipt,
        adapter: &A,
    ) -> StorageResult<String> {
        match self.policies.visibility(category) {
            Visibility::Public => adapter.uploaded_object_url(key, receipt).await,
            Visibility::Private => self.private_url(key, adapter, None).await,
        }
    }

    async fn private_url<A: StorageAdapter + ?Sized>(
        &self,
        key: &str,
        adapter: &A,
        expires_in: Option<Duration>,
    ) -> StorageResult<String> {
        let expiry = expires_in.map(clamp_expiry).unwrap_or(self.default_expiry);
        match &self.private {
            PrivateAccess::Proxy(signer) => Ok(signer.sign(key, expiry)),
            PrivateAccess::Signed => {
                adapter
                    .resolve_access_url(key, Visibility::Private, Some(expiry))
                    .await
            }
        }
    }
}

pub fn clamp_expiry(expiry: Duration) -> Duration {
    expiry.clamp(MIN_URL_EXPIRY, MAX_URL_EXPIRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_clamped() {
        assert_eq!(clamp_expiry(Duration::ZERO), MIN_URL_EXPIRY);
        assert_eq!(clamp_expiry(Duration::from_secs(30 * 24 * 3600)), MAX_URL_EXPIRY);
        assert_eq!(clamp_expiry(Duration::from_secs(600)), Duration::from_secs(600));
    }

    #[test]
    fn test_mode_reflects_construction() {
        let policies = Arc::new(CategoryPolicies::defaults());
        let signer = ProxyUrlSigner::new("/storage", b"0123456789abcdef0123456789abcdef").unwrap();

        let proxy = AccessPolicy::proxy(policies.clone(), signer, Duration::from_secs(3600));
        assert_eq!(proxy.mode(), PrivateAccessMode::Proxy);
        assert!(proxy.proxy_signer().is_some());

        let signed = AccessPolicy::signed(policies, Duration::from_secs(3600));
        assert_eq!(signed.mode(), PrivateAccessMode::Signed);
        assert!(signed.proxy_signer().is_none());
    }
}
