//! Shared key generation for storage backends.
//!
//! Key format: `{category}/{tenant|default}/{uuid}.{ext}`. The file segment is
//! a fresh random UUID; the caller's original file name only contributes a
//! sanitized extension, so it can never inject path segments.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Mutex;

use ministry_core::StorageCategory;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Path segment used when an upload has no tenant.
pub const DEFAULT_TENANT_SEGMENT: &str = "default";

const MAX_EXTENSION_LEN: usize = 16;
const MAX_TENANT_LEN: usize = 128;

/// A fully derived, validated object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    category: StorageCategory,
    tenant: Option<String>,
    file_name: String,
}

impl ObjectKey {
    pub fn category(&self) -> StorageCategory {
        self.category
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn tenant_segment(&self) -> &str {
        self.tenant.as_deref().unwrap_or(DEFAULT_TENANT_SEGMENT)
    }

    /// Generated `{uuid}.{ext}` segment.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Parse a key previously produced by [`KeyNamingPolicy::derive_key`].
    pub fn parse(key: &str) -> StorageResult<Self> {
        validate_key(key)?;

        let mut segments = key.split('/');
        let (Some(category), Some(tenant), Some(file_name), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(StorageError::InvalidKey(format!(
                "'{}' is not of the form category/tenant/file",
                key
            )));
        };

        let category = category
            .parse::<StorageCategory>()
            .map_err(|_| StorageError::InvalidKey(format!("'{}' has an unknown category", key)))?;

        let tenant = if tenant == DEFAULT_TENANT_SEGMENT {
            None
        } else {
            Some(tenant.to_string())
        };

        Ok(ObjectKey {
            category,
            tenant,
            file_name: file_name.to_string(),
        })
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}/{}/{}",
            self.category.as_str(),
            self.tenant_segment(),
            self.file_name
        )
    }
}

enum RandomSource {
    Os,
    Seeded(Mutex<StdRng>),
}

/// Derives collision-resistant keys.
///
/// Production uses OS randomness; tests may inject a seeded generator to make
/// key sequences reproducible.
pub struct KeyNamingPolicy {
    source: RandomSource,
}

impl KeyNamingPolicy {
    pub fn new() -> Self {
        Self {
            source: RandomSource::Os,
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            source: RandomSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn derive_key(
        &self,
        category: StorageCategory,
        original_name: &str,
        tenant: Option<&str>,
    ) -> StorageResult<ObjectKey> {
        if let Some(tenant) = tenant {
            validate_tenant(tenant)?;
        }

        let id = self.next_id().simple().to_string();
        let file_name = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", id, ext),
            None => id,
        };

        Ok(ObjectKey {
            category,
            tenant: tenant.map(str::to_string),
            file_name,
        })
    }

    fn next_id(&self) -> Uuid {
        match &self.source {
            RandomSource::Os => Uuid::new_v4(),
            RandomSource::Seeded(rng) => {
                let mut bytes = [0u8; 16];
                rng.lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .fill_bytes(&mut bytes);
                uuid::Builder::from_random_bytes(bytes).into_uuid()
            }
        }
    }
}

impl Default for KeyNamingPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased alphanumeric extension of the final path component, if any.
///
/// Both `/` and `\` count as separators so Windows-style names behave the same.
pub fn extension_of(original_name: &str) -> Option<String> {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() {
        // ".bashrc" style names have no extension
        return None;
    }

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        None
    } else {
        Some(ext)
    }
}

/// Tenants are opaque but must be usable as a single path segment.
pub fn validate_tenant(tenant: &str) -> StorageResult<()> {
    let invalid = |reason: &str| {
        Err(StorageError::InvalidTenant(format!(
            "tenant identifier {}",
            reason
        )))
    };

    if tenant.trim().is_empty() {
        return invalid("is empty");
    }
    if tenant.len() > MAX_TENANT_LEN {
        return invalid("is too long");
    }
    if tenant.contains(['/', '\\']) {
        return invalid("contains a path separator");
    }
    if tenant.contains("..") || tenant == "." {
        return invalid("contains a relative path component");
    }
    if tenant.chars().any(|c| c.is_control()) {
        return invalid("contains control characters");
    }
    // Reserved for uploads without a tenant.
    if tenant == DEFAULT_TENANT_SEGMENT {
        return invalid("is reserved");
    }
    Ok(())
}

/// Reject keys that could escape a container or address something other than a stored object.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if key.contains("..") || key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    if key.contains('\\') || key.chars().any(|c| c.is_control()) {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    if key.split('/').any(|segment| segment.is_empty() || segment == ".") {
        return Err(StorageError::InvalidKey(
            "Storage key contains an empty path segment".to_string(),
        ));
    }
    Ok(())
}

/// Category encoded as the first segment of a key.
pub fn parse_category(key: &str) -> StorageResult<StorageCategory> {
    ObjectKey::parse(key).map(|k| k.category())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_key_layout_with_tenant() {
        let keys = KeyNamingPolicy::new();
        let key = keys
            .derive_key(StorageCategory::Avatar, "photo.PNG", Some("church-42"))
            .unwrap();
        let rendered = key.to_string();

        assert!(rendered.starts_with("avatar/church-42/"));
        assert!(rendered.ends_with(".png"));
        assert_eq!(key.file_name().len(), 32 + ".png".len());
    }

    #[test]
    fn test_key_layout_without_tenant() {
        let keys = KeyNamingPolicy::new();
        let key = keys
            .derive_key(StorageCategory::Recording, "sermon.mp3", None)
            .unwrap();
        assert!(key.to_string().starts_with("recording/default/"));
        assert_eq!(key.tenant(), None);
    }

    #[test]
    fn test_hostile_names_contribute_only_an_extension() {
        let keys = KeyNamingPolicy::new();
        for name in ["../../etc/passwd", "..\\..\\boot.ini", "a/b/c.txt", "\0evil", ""] {
            let key = keys.derive_key(StorageCategory::Sequence, name, None).unwrap();
            let rendered = key.to_string();
            assert!(validate_key(&rendered).is_ok(), "{rendered}");
            assert_eq!(rendered.split('/').count(), 3);
        }

        let key = keys.derive_key(StorageCategory::Sequence, "../../etc/passwd", None).unwrap();
        assert!(!key.file_name().contains('.'));
        let key = keys.derive_key(StorageCategory::Sequence, "..\\..\\boot.ini", None).unwrap();
        assert!(key.file_name().ends_with(".ini"));
    }

    #[test]
    fn test_extension_sanitizing() {
        assert_eq!(extension_of("score.MusicXML"), Some("musicxml".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("weird.p n?g"), Some("png".to_string()));
        assert_eq!(extension_of(".bashrc"), None);
        assert_eq!(extension_of("noext"), None);
        assert_eq!(extension_of("trailing."), None);
        assert_eq!(extension_of("x.aaaaaaaaaaaaaaaaaaaaaaaaa"), None);
    }

    #[test]
    fn test_ten_thousand_keys_are_distinct() {
        let keys = KeyNamingPolicy::new();
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let key = keys
                .derive_key(StorageCategory::Multimedia, "clip.mp4", Some("church-1"))
                .unwrap();
            assert!(seen.insert(key.to_string()));
        }
    }

    #[test]
    fn test_seeded_policy_is_reproducible() {
        let a = KeyNamingPolicy::seeded(7);
        let b = KeyNamingPolicy::seeded(7);
        for _ in 0..5 {
            let ka = a.derive_key(StorageCategory::Avatar, "a.png", None).unwrap();
            let kb = b.derive_key(StorageCategory::Avatar, "a.png", None).unwrap();
            assert_eq!(ka, kb);
        }
        let first = a.derive_key(StorageCategory::Avatar, "a.png", None).unwrap();
        let second = a.derive_key(StorageCategory::Avatar, "a.png", None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_invalid_tenants_rejected() {
        let keys = KeyNamingPolicy::new();
        for tenant in ["", "  ", "a/b", "a\\b", "..", ".", "x..y", "bad\nline"] {
            let result = keys.derive_key(StorageCategory::Avatar, "a.png", Some(tenant));
            assert!(
                matches!(result, Err(StorageError::InvalidTenant(_))),
                "tenant {tenant:?} should be rejected"
            );
        }
        assert!(validate_tenant(&"t".repeat(MAX_TENANT_LEN + 1)).is_err());
    }

    #[test]
    fn test_default_tenant_segment_is_reserved() {
        let keys = KeyNamingPolicy::new();
        let result = keys.derive_key(StorageCategory::Recording, "a.mp3", Some("default"));
        assert!(matches!(result, Err(StorageError::InvalidTenant(_))));

        let shared = keys
            .derive_key(StorageCategory::Recording, "a.mp3", None)
            .unwrap();
        assert_eq!(ObjectKey::parse(&shared.to_string()).unwrap().tenant_segment(), "default");
        assert!(validate_tenant("Default").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_traversal() {
        for key in [
            "",
            "../etc/passwd",
            "/etc/passwd",
            "avatar//x.png",
            "avatar/./x.png",
            "avatar\\default\\x.png",
            "avatar/default/x.png/",
        ] {
            assert!(validate_key(key).is_err(), "{key:?} should be rejected");
        }
        assert!(validate_key("avatar/default/abc.png").is_ok());
    }

    #[test]
    fn test_parse_round_trips_derived_key() {
        let keys = KeyNamingPolicy::new();
        let key = keys
            .derive_key(StorageCategory::Sequence, "chart.pdf", Some("church-9"))
            .unwrap();
        assert_eq!(ObjectKey::parse(&key.to_string()).unwrap(), key);

        assert_eq!(
            parse_category("recording/default/abc.mp3").unwrap(),
            StorageCategory::Recording
        );
        assert!(parse_category("podcast/default/abc.mp3").is_err());
        assert!(parse_category("avatar/abc.png").is_err());
        assert!(parse_category("avatar/default/x/abc.png").is_err());
    }
}
