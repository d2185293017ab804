//! Wire shapes exchanged with the lab service.

use crate::model::category::{Category, CategoryId, CategoryKind};
use crate::model::subject::{CanonicalSubjectId, Subject, SubjectMetrics};
use crate::model::tree::{LabId, LabTree};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subject id as returned by the directory: plain string or nested object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSubjectId {
    Plain(String),
    Nested(NestedSubjectId),
}

/// Object-shaped id, e.g. `{"fsid": "abc"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestedSubjectId {
    #[serde(alias = "fsid", alias = "value", alias = "subjectId")]
    pub id: String,
}

impl RawSubjectId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(value) => value.as_str(),
            Self::Nested(nested) => nested.id.as_str(),
        }
    }
}

/// One subject record from the directory search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSubjectRecord {
    pub id: RawSubjectId,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub canonical_fsid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSubjectsRequest {
    pub keyword: String,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSubjectsResponse {
    #[serde(default)]
    pub exact_match: Option<RemoteSubjectRecord>,
    #[serde(default)]
    pub rows: Vec<RemoteSubjectRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubcategoryRequest {
    pub name: String,
    pub lab_id: LabId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubcategoryResponse {
    pub id: CategoryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSubcategoryRequest {
    pub lab_id: LabId,
    pub category_id: CategoryId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSubjectsRequest {
    pub subject_ids: Vec<CanonicalSubjectId>,
    pub lab_id: LabId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveSubjectsRequest {
    pub subject_ids: Vec<CanonicalSubjectId>,
    pub lab_id: LabId,
    pub from_category_id: CategoryId,
    pub to_category_id: CategoryId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSubcategoryRequest {
    pub category_id: CategoryId,
    pub subject_ids: Vec<CanonicalSubjectId>,
    pub lab_id: LabId,
    /// `true` re-parents subjects into the default category; `false` deletes them.
    pub redistribute: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSubjectRequest {
    pub lab_id: LabId,
    pub subject_id: CanonicalSubjectId,
}

/// Lab subject as stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLabSubject {
    pub subject_id: String,
    pub subject_name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub added_at: i64,
    #[serde(default)]
    pub added_by_id: Option<String>,
}

/// Category as stored server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCategory {
    pub id: CategoryId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subjects: Vec<RemoteLabSubject>,
}

/// Lab payload used for the initial load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabPayload {
    pub lab_id: LabId,
    #[serde(default)]
    pub categories: Vec<RemoteCategory>,
}

impl LabPayload {
    /// Maps the payload into a tree with a guaranteed default category.
    ///
    /// Subjects whose id cannot be normalized, or whose canonical id was
    /// already seen, are skipped.
    pub fn into_tree(self) -> LabTree {
        let mut seen = std::collections::HashSet::new();
        let mut categories = Vec::with_capacity(self.categories.len());
        for remote in self.categories {
            let mut category = Category::new(
                remote.id,
                remote.name,
                CategoryKind::from_wire(remote.kind.as_str()),
            );
            for record in remote.subjects {
                let subject_id = match CanonicalSubjectId::parse(record.subject_id.as_str()) {
                    Ok(id) => id,
                    Err(err) => {
                        warn!(
                            "event=lab_load module=remote status=skipped_subject lab_id={} reason=\"{}\"",
                            self.lab_id, err
                        );
                        continue;
                    }
                };
                if !seen.insert(subject_id.clone()) {
                    continue;
                }
                category.subjects.push(Subject {
                    id: Uuid::now_v7(),
                    subject_slug: subject_id.slug().to_string(),
                    subject_id,
                    category_id: category.id.clone(),
                    subject_name: record.subject_name,
                    notes: record.notes,
                    added_at: record.added_at,
                    added_by_id: record.added_by_id,
                    metrics: SubjectMetrics::default(),
                });
            }
            categories.push(category);
        }
        LabTree::new(self.lab_id, categories)
    }
}

/// Computed metrics for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMetricsRecord {
    pub subject_id: CanonicalSubjectId,
    #[serde(flatten)]
    pub metrics: SubjectMetrics,
}
