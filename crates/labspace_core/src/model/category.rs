//! Category domain model.
//!
//! # Responsibility
//! - Define the named subject bucket and its closed set of kinds.
//!
//! # Invariants
//! - `kind` is decided once at construction, never re-derived from the name.
//! - Only `CategoryKind::Custom` categories may be deleted or renamed.

use crate::model::subject::Subject;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Display name of the default category.
pub const DEFAULT_CATEGORY_NAME: &str = "Uncategorized";
/// Id used when the default category has to be synthesized locally.
pub const DEFAULT_CATEGORY_ID: &str = "uncategorized";

const PROVISIONAL_ID_PREFIX: &str = "local-";

/// Opaque category identifier, unique within one lab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a client-side id used until the server issues the real one.
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns whether this id was minted locally and not yet reconciled.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for CategoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl From<&str> for CategoryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Closed set of category kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// The single "Uncategorized" bucket every new subject is born into.
    Default,
    /// User-created bucket.
    Custom,
    /// Older labs carry an extra non-deletable exclude bucket.
    LegacyExclude,
}

impl CategoryKind {
    /// Parses the wire `type` field. Unknown values map to `Custom`.
    pub fn from_wire(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Self::Default,
            "exclude" => Self::LegacyExclude,
            _ => Self::Custom,
        }
    }

    /// Wire `type` value.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Custom => "custom",
            Self::LegacyExclude => "exclude",
        }
    }

    /// Special kinds can never be deleted or renamed.
    pub fn is_special(self) -> bool {
        !matches!(self, Self::Custom)
    }
}

/// Named bucket of subjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
    /// Display order only.
    pub subjects: Vec<Subject>,
}

impl Category {
    /// Creates an empty category.
    pub fn new(id: CategoryId, name: impl Into<String>, kind: CategoryKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            subjects: Vec::new(),
        }
    }

    /// Creates the default "Uncategorized" category with the synthesized id.
    pub fn default_bucket() -> Self {
        Self::new(
            CategoryId::new(DEFAULT_CATEGORY_ID),
            DEFAULT_CATEGORY_NAME,
            CategoryKind::Default,
        )
    }

    pub fn is_default(&self) -> bool {
        self.kind == CategoryKind::Default
    }

    pub fn is_special(&self) -> bool {
        self.kind.is_special()
    }
}
