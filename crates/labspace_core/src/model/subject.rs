//! Subject domain model and canonical id normalization.
//!
//! # Responsibility
//! - Define the research subject record tracked inside a lab.
//! - Normalize external subject identifiers into one canonical shape.
//!
//! # Invariants
//! - `CanonicalSubjectId` always carries the `fsid_` prefix exactly once.
//! - `Subject::subject_slug` is always the canonical id without the prefix.
//! - `Subject::id` is client-local, generated at add time and stable across moves.

use crate::model::category::CategoryId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Prefix carried by every stored canonical subject id.
pub const FSID_PREFIX: &str = "fsid_";

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s/?#]+$").expect("valid subject slug regex"));

/// Client-local subject identifier.
///
/// Time-ordered (UUID v7) so local ids sort by add time.
pub type SubjectLocalId = Uuid;

/// Errors from canonical subject id parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectIdError {
    /// Input is blank, or only the prefix.
    Empty,
    /// Slug part contains whitespace or URL-reserved characters.
    InvalidCharacters(String),
}

impl Display for SubjectIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "subject id must not be empty"),
            Self::InvalidCharacters(value) => {
                write!(f, "subject id contains invalid characters: `{value}`")
            }
        }
    }
}

impl Error for SubjectIdError {}

/// Canonical external subject id, stored in prefixed (`fsid_...`) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalSubjectId(String);

impl CanonicalSubjectId {
    /// Parses either the prefixed or the bare slug form.
    pub fn parse(raw: &str) -> Result<Self, SubjectIdError> {
        let slug = to_slug(raw.trim());
        if slug.is_empty() {
            return Err(SubjectIdError::Empty);
        }
        if !SLUG_RE.is_match(slug.as_str()) {
            return Err(SubjectIdError::InvalidCharacters(slug));
        }
        Ok(Self(format!("{FSID_PREFIX}{slug}")))
    }

    /// Prefixed form used for storage and remote requests.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Bare slug form.
    pub fn slug(&self) -> &str {
        &self.0[FSID_PREFIX.len()..]
    }
}

impl Display for CanonicalSubjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl TryFrom<String> for CanonicalSubjectId {
    type Error = SubjectIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<CanonicalSubjectId> for String {
    fn from(value: CanonicalSubjectId) -> Self {
        value.0
    }
}

/// Adds the `fsid_` prefix unless already present.
pub fn to_fsid(raw: &str) -> String {
    if raw.starts_with(FSID_PREFIX) {
        raw.to_string()
    } else {
        format!("{FSID_PREFIX}{raw}")
    }
}

/// Strips one leading `fsid_` prefix when present.
pub fn to_slug(raw: &str) -> String {
    raw.strip_prefix(FSID_PREFIX).unwrap_or(raw).to_string()
}

/// Asynchronously computed subject metrics.
///
/// `None` means "not yet computed", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetrics {
    pub horizon_rank: Option<f64>,
    pub tech_transfer: Option<f64>,
    pub white_space: Option<f64>,
}

impl SubjectMetrics {
    /// Returns whether no metric has been computed yet.
    pub fn is_pending(&self) -> bool {
        self.horizon_rank.is_none() && self.tech_transfer.is_none() && self.white_space.is_none()
    }
}

/// Research subject tracked within one lab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Client-local id, stable across moves.
    pub id: SubjectLocalId,
    /// Canonical external id in prefixed form.
    pub subject_id: CanonicalSubjectId,
    /// Canonical external id without prefix.
    pub subject_slug: String,
    /// Back-reference to the owning category.
    pub category_id: CategoryId,
    pub subject_name: String,
    /// Summary text.
    pub notes: Option<String>,
    /// Unix epoch milliseconds.
    pub added_at: i64,
    pub added_by_id: Option<String>,
    #[serde(flatten)]
    pub metrics: SubjectMetrics,
}

impl Subject {
    /// Creates a subject with a fresh time-based local id.
    ///
    /// The category back-reference is assigned when the subject is placed.
    pub fn new(
        subject_id: CanonicalSubjectId,
        subject_name: impl Into<String>,
        category_id: CategoryId,
    ) -> Self {
        let subject_slug = subject_id.slug().to_string();
        Self {
            id: Uuid::now_v7(),
            subject_id,
            subject_slug,
            category_id,
            subject_name: subject_name.into(),
            notes: None,
            added_at: now_epoch_ms(),
            added_by_id: None,
            metrics: SubjectMetrics::default(),
        }
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{to_fsid, to_slug, CanonicalSubjectId, SubjectIdError, FSID_PREFIX};

    #[test]
    fn parse_accepts_bare_and_prefixed_forms() {
        let bare = CanonicalSubjectId::parse("abc123").unwrap();
        let prefixed = CanonicalSubjectId::parse("fsid_abc123").unwrap();
        assert_eq!(bare, prefixed);
        assert_eq!(bare.as_str(), "fsid_abc123");
        assert_eq!(bare.slug(), "abc123");
    }

    #[test]
    fn parse_rejects_blank_and_prefix_only() {
        assert_eq!(CanonicalSubjectId::parse("  "), Err(SubjectIdError::Empty));
        assert_eq!(
            CanonicalSubjectId::parse(FSID_PREFIX),
            Err(SubjectIdError::Empty)
        );
    }

    #[test]
    fn parse_rejects_whitespace_inside_slug() {
        let err = CanonicalSubjectId::parse("abc 123").unwrap_err();
        assert!(matches!(err, SubjectIdError::InvalidCharacters(_)));
    }

    #[test]
    fn prefix_helpers_compose_to_identity() {
        for raw in ["abc123", "fsid_abc123", "x-y_z"] {
            let fsid = to_fsid(raw);
            assert!(fsid.starts_with(FSID_PREFIX));
            assert_eq!(to_fsid(&to_slug(&fsid)), fsid);
            assert_eq!(to_slug(&to_fsid(&to_slug(raw))), to_slug(raw));
        }
    }

    #[test]
    fn serde_normalizes_bare_ids() {
        let parsed: CanonicalSubjectId = serde_json::from_str("\"q42\"").unwrap();
        assert_eq!(parsed.as_str(), "fsid_q42");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"fsid_q42\"");
    }
}
