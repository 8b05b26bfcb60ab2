use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// Exactly one backend is active per process. It is chosen at startup from
/// `STORAGE_BACKEND` and never switched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    Local,
    ObjectStore,
    ManagedStorage,
    CloudDrive,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "object-store" | "objectstore" | "s3" => Ok(StorageBackend::ObjectStore),
            "managed-storage" | "managed" | "supabase" => Ok(StorageBackend::ManagedStorage),
            "cloud-drive" | "drive" | "gdrive" => Ok(StorageBackend::CloudDrive),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::ObjectStore => write!(f, "object-store"),
            StorageBackend::ManagedStorage => write!(f, "managed-storage"),
            StorageBackend::CloudDrive => write!(f, "cloud-drive"),
        }
    }
}

/// Class of uploaded content. Each category carries its own size, type and
/// visibility policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCategory {
    Avatar,
    Recording,
    Sequence,
    Multimedia,
}

impl StorageCategory {
    pub const ALL: [StorageCategory; 4] = [
        StorageCategory::Avatar,
        StorageCategory::Recording,
        StorageCategory::Sequence,
        StorageCategory::Multimedia,
    ];

    /// Path segment used as the first component of every object key.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageCategory::Avatar => "avatar",
            StorageCategory::Recording => "recording",
            StorageCategory::Sequence => "sequence",
            StorageCategory::Multimedia => "multimedia",
        }
    }
}

impl FromStr for StorageCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avatar" => Ok(StorageCategory::Avatar),
            "recording" => Ok(StorageCategory::Recording),
            "sequence" => Ok(StorageCategory::Sequence),
            "multimedia" => Ok(StorageCategory::Multimedia),
            _ => Err(anyhow::anyhow!("Unknown storage category: {}", s)),
        }
    }
}

impl Display for StorageCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_aliases() {
        assert_eq!("s3".parse::<StorageBackend>().unwrap(), StorageBackend::ObjectStore);
        assert_eq!(
            "Managed-Storage".parse::<StorageBackend>().unwrap(),
            StorageBackend::ManagedStorage
        );
        assert_eq!("gdrive".parse::<StorageBackend>().unwrap(), StorageBackend::CloudDrive);
        assert!("nfs".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_backend_display_parses_back() {
        for backend in [
            StorageBackend::Local,
            StorageBackend::ObjectStore,
            StorageBackend::ManagedStorage,
            StorageBackend::CloudDrive,
        ] {
            assert_eq!(backend.to_string().parse::<StorageBackend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_category_is_case_sensitive() {
        assert_eq!("avatar".parse::<StorageCategory>().unwrap(), StorageCategory::Avatar);
        assert!("Avatar".parse::<StorageCategory>().is_err());
    }
}
