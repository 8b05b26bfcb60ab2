//! Upload validation against a category policy.
//!
//! Runs before any filesystem or network access, so a rejected upload costs no I/O.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::Serialize;

use crate::policy::{CategoryPolicies, CategoryPolicy};
use crate::storage_types::StorageCategory;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    TooLarge { size: u64, max: u64 },
    UnsupportedType { mime_type: String },
    /// The category allows no types at all; everything is rejected.
    NoAllowedTypes,
    EmptyPayload,
}

impl Display for RejectionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RejectionReason::TooLarge { size, max } => write!(
                f,
                "file size {} bytes exceeds maximum allowed size of {} MB",
                size,
                max / 1024 / 1024
            ),
            RejectionReason::UnsupportedType { mime_type } => {
                write!(f, "content type '{}' is not allowed", mime_type)
            }
            RejectionReason::NoAllowedTypes => write!(f, "no content types are allowed"),
            RejectionReason::EmptyPayload => write!(f, "file is empty"),
        }
    }
}

/// A validation failure. All applicable reasons are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRejection {
    pub category: StorageCategory,
    pub reasons: Vec<RejectionReason>,
}

impl UploadRejection {
    pub fn is_too_large(&self) -> bool {
        self.reasons
            .iter()
            .any(|r| matches!(r, RejectionReason::TooLarge { .. }))
    }

    pub fn is_unsupported_type(&self) -> bool {
        self.reasons.iter().any(|r| {
            matches!(
                r,
                RejectionReason::UnsupportedType { .. } | RejectionReason::NoAllowedTypes
            )
        })
    }
}

impl Display for UploadRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Upload rejected for category '{}': ", self.category)?;
        for (i, reason) in self.reasons.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for UploadRejection {}

/// Strip media-type parameters (e.g. "audio/mpeg; codecs=mp3" -> "audio/mpeg").
pub fn normalize_mime_type(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .map(|s| s.trim())
        .unwrap_or(content_type)
}

/// Check one candidate upload against its category policy.
pub fn validate_upload(
    policies: &CategoryPolicies,
    category: StorageCategory,
    content_type: &str,
    size: u64,
) -> Result<(), UploadRejection> {
    let reasons = rejection_reasons(policies.get(category), content_type, size);
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(UploadRejection { category, reasons })
    }
}

fn rejection_reasons(policy: &CategoryPolicy, content_type: &str, size: u64) -> Vec<RejectionReason> {
    let mut reasons = Vec::new();

    if size == 0 {
        reasons.push(RejectionReason::EmptyPayload);
    } else if size > policy.max_size_bytes {
        reasons.push(RejectionReason::TooLarge {
            size,
            max: policy.max_size_bytes,
        });
    }

    // Case-sensitive on purpose: "IMAGE/PNG" is not on any list.
    let mime = normalize_mime_type(content_type);
    if policy.allowed_content_types.is_empty() {
        reasons.push(RejectionReason::NoAllowedTypes);
    } else if !policy.allowed_content_types.iter().any(|allowed| allowed == mime) {
        reasons.push(RejectionReason::UnsupportedType {
            mime_type: content_type.to_string(),
        });
    }

    reasons
}
