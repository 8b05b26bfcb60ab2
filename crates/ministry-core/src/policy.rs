//! Per-category upload policy.
//!
//! Every [`StorageCategory`] has exactly one [`CategoryPolicy`]. The table is
//! built once at startup and is read-only afterwards; a missing or duplicated
//! entry is a configuration error, never a runtime fallback.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage_types::{StorageCategory, Visibility};

const MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    pub max_size_bytes: u64,
    pub allowed_content_types: Vec<String>,
    pub visibility: Visibility,
    /// Folder or bucket name used by backends that keep one container per category.
    pub container: String,
}

impl CategoryPolicy {
    pub fn new(
        max_size_bytes: u64,
        allowed_content_types: &[&str],
        visibility: Visibility,
        container: &str,
    ) -> Self {
        Self {
            max_size_bytes,
            allowed_content_types: allowed_content_types.iter().map(|s| s.to_string()).collect(),
            visibility,
            container: container.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("No storage policy configured for category '{0}'")]
    MissingCategory(StorageCategory),

    #[error("Storage policy for category '{0}' is configured more than once")]
    DuplicateCategory(StorageCategory),

    #[error("Storage policy for category '{0}' has an empty container name")]
    EmptyContainer(StorageCategory),

    #[error("Categories '{0}' and '{1}' share the container '{2}'")]
    SharedContainer(StorageCategory, StorageCategory, String),
}

/// Complete, immutable policy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPolicies {
    entries: [CategoryPolicy; 4],
}

fn slot(category: StorageCategory) -> usize {
    match category {
        StorageCategory::Avatar => 0,
        StorageCategory::Recording => 1,
        StorageCategory::Sequence => 2,
        StorageCategory::Multimedia => 3,
    }
}

impl CategoryPolicies {
    pub fn new(
        entries: impl IntoIterator<Item = (StorageCategory, CategoryPolicy)>,
    ) -> Result<Self, PolicyError> {
        let mut slots: [Option<CategoryPolicy>; 4] = [None, None, None, None];

        for (category, policy) in entries {
            if policy.container.trim().is_empty() {
                return Err(PolicyError::EmptyContainer(category));
            }
            let entry = &mut slots[slot(category)];
            if entry.is_some() {
                return Err(PolicyError::DuplicateCategory(category));
            }
            *entry = Some(policy);
        }

        let [avatar, recording, sequence, multimedia] = slots;
        let entries = match (avatar, recording, sequence, multimedia) {
            (Some(a), Some(r), Some(s), Some(m)) => [a, r, s, m],
            (a, r, s, _) => {
                let missing = if a.is_none() {
                    StorageCategory::Avatar
                } else if r.is_none() {
                    StorageCategory::Recording
                } else if s.is_none() {
                    StorageCategory::Sequence
                } else {
                    StorageCategory::Multimedia
                };
                return Err(PolicyError::MissingCategory(missing));
            }
        };

        let policies = Self { entries };
        policies.check_unique_containers()?;
        Ok(policies)
    }

    /// Compiled-in defaults for the ministry application.
    pub fn defaults() -> Self {
        Self {
            entries: [
                CategoryPolicy::new(
                    5 * MB,
                    &["image/jpeg", "image/png", "image/webp", "image/gif"],
                    Visibility::Public,
                    "avatars",
                ),
                CategoryPolicy::new(
                    50 * MB,
                    &[
                        "audio/mpeg",
                        "audio/mp4",
                        "audio/x-m4a",
                        "audio/wav",
                        "audio/x-wav",
                        "audio/ogg",
                        "audio/webm",
                        "audio/aac",
                    ],
                    Visibility::Private,
                    "recordings",
                ),
                CategoryPolicy::new(
                    20 * MB,
                    &[
                        "application/pdf",
                        "image/png",
                        "image/jpeg",
                        "application/vnd.recordare.musicxml+xml",
                        "application/vnd.recordare.musicxml",
                        "audio/midi",
                    ],
                    Visibility::Private,
                    "sequences",
                ),
                CategoryPolicy::new(
                    100 * MB,
                    &[
                        "image/jpeg",
                        "image/png",
                        "image/webp",
                        "image/gif",
                        "video/mp4",
                        "video/webm",
                        "video/quicktime",
                        "audio/mpeg",
                    ],
                    Visibility::Public,
                    "multimedia",
                ),
            ],
        }
    }

    pub fn get(&self, category: StorageCategory) -> &CategoryPolicy {
        &self.entries[slot(category)]
    }

    pub fn visibility(&self, category: StorageCategory) -> Visibility {
        self.get(category).visibility
    }

    pub fn iter(&self) -> impl Iterator<Item = (StorageCategory, &CategoryPolicy)> {
        StorageCategory::ALL
            .into_iter()
            .map(move |category| (category, self.get(category)))
    }

    pub fn with_max_size(mut self, category: StorageCategory, max_size_bytes: u64) -> Self {
        self.entries[slot(category)].max_size_bytes = max_size_bytes;
        self
    }

    fn check_unique_containers(&self) -> Result<(), PolicyError> {
        for (i, (a, pa)) in self.iter().enumerate() {
            for (b, pb) in self.iter().skip(i + 1) {
                if pa.container == pb.container {
                    return Err(PolicyError::SharedContainer(a, b, pa.container.clone()));
                }
            }
        }
        Ok(())
    }
}

impl Default for CategoryPolicies {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(container: &str) -> CategoryPolicy {
        CategoryPolicy::new(MB, &["image/png"], Visibility::Public, container)
    }

    #[test]
    fn test_defaults_cover_every_category() {
        let policies = CategoryPolicies::defaults();
        for category in StorageCategory::ALL {
            assert!(!policies.get(category).allowed_content_types.is_empty());
        }
        assert_eq!(policies.get(StorageCategory::Avatar).max_size_bytes, 5 * MB);
        assert_eq!(policies.get(StorageCategory::Recording).max_size_bytes, 50 * MB);
        assert_eq!(policies.visibility(StorageCategory::Recording), Visibility::Private);
    }

    #[test]
    fn test_missing_category_is_rejected() {
        let result = CategoryPolicies::new([
            (StorageCategory::Avatar, policy("a")),
            (StorageCategory::Recording, policy("r")),
            (StorageCategory::Multimedia, policy("m")),
        ]);
        assert_eq!(result, Err(PolicyError::MissingCategory(StorageCategory::Sequence)));
    }

    #[test]
    fn test_duplicate_category_is_rejected() {
        let result = CategoryPolicies::new([
            (StorageCategory::Avatar, policy("a")),
            (StorageCategory::Avatar, policy("b")),
        ]);
        assert_eq!(result, Err(PolicyError::DuplicateCategory(StorageCategory::Avatar)));
    }

    #[test]
    fn test_shared_container_is_rejected() {
        let result = CategoryPolicies::new([
            (StorageCategory::Avatar, policy("media")),
            (StorageCategory::Recording, policy("r")),
            (StorageCategory::Sequence, policy("s")),
            (StorageCategory::Multimedia, policy("media")),
        ]);
        assert!(matches!(result, Err(PolicyError::SharedContainer(..))));
    }

    #[test]
    fn test_with_max_size_overrides_one_category() {
        let policies = CategoryPolicies::defaults().with_max_size(StorageCategory::Avatar, 42);
        assert_eq!(policies.get(StorageCategory::Avatar).max_size_bytes, 42);
        assert_eq!(policies.get(StorageCategory::Multimedia).max_size_bytes, 100 * MB);
    }
}
