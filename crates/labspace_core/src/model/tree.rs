//! In-memory category/subject tree for one lab.
//!
//! # Responsibility
//! - Hold the ordered categories of a lab and the subjects inside them.
//! - Provide fallible, copy-on-write transformations used by the engine.
//!
//! # Invariants
//! - Exactly one category has `CategoryKind::Default` (`LabTree::new`).
//! - Every subject lives in exactly one category and its `category_id`
//!   equals that category's id.
//! - A canonical subject id appears at most once per lab.
//! - `try_*` methods never mutate `self`; they return a new tree or an error.

use crate::model::category::{Category, CategoryId, CategoryKind};
use crate::model::subject::{CanonicalSubjectId, Subject, SubjectLocalId, SubjectMetrics};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Lab (workspace) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabId(String);

impl LabId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Local lookup/structure failures on a tree transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    CategoryNotFound(CategoryId),
    SubjectNotFound(SubjectLocalId),
    SubjectNotInCategory {
        subject: SubjectLocalId,
        category: CategoryId,
    },
    /// No default category exists; configuration invariant violation.
    DefaultCategoryMissing,
    /// Target category is default or legacy exclude.
    SpecialCategory(CategoryId),
    DuplicateSubject(CanonicalSubjectId),
    DuplicateCategory(CategoryId),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CategoryNotFound(id) => write!(f, "category not found: {id}"),
            Self::SubjectNotFound(id) => write!(f, "subject not found: {id}"),
            Self::SubjectNotInCategory { subject, category } => {
                write!(f, "subject {subject} is not in category {category}")
            }
            Self::DefaultCategoryMissing => write!(f, "lab has no default category"),
            Self::SpecialCategory(id) => write!(f, "category is not modifiable: {id}"),
            Self::DuplicateSubject(id) => write!(f, "subject already exists in lab: {id}"),
            Self::DuplicateCategory(id) => write!(f, "category id already exists: {id}"),
        }
    }
}

impl Error for TreeError {}

/// Structural invariant violations reported by [`LabTree::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeInvariantError {
    DefaultCategoryCount(usize),
    DuplicateCategoryId(CategoryId),
    DuplicateSubjectLocalId(SubjectLocalId),
    DuplicateCanonicalId(CanonicalSubjectId),
    BrokenBackReference {
        subject: SubjectLocalId,
        holder: CategoryId,
        recorded: CategoryId,
    },
}

impl Display for TreeInvariantError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DefaultCategoryCount(count) => {
                write!(f, "expected exactly one default category, found {count}")
            }
            Self::DuplicateCategoryId(id) => write!(f, "duplicate category id: {id}"),
            Self::DuplicateSubjectLocalId(id) => write!(f, "duplicate subject local id: {id}"),
            Self::DuplicateCanonicalId(id) => write!(f, "duplicate canonical subject id: {id}"),
            Self::BrokenBackReference {
                subject,
                holder,
                recorded,
            } => write!(
                f,
                "subject {subject} is held by {holder} but records category {recorded}"
            ),
        }
    }
}

impl Error for TreeInvariantError {}

/// Category/subject tree snapshot of one lab.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabTree {
    lab_id: LabId,
    categories: Vec<Category>,
}

impl LabTree {
    /// Builds a tree and guarantees exactly one default category.
    ///
    /// A missing default is synthesized at the front; extra defaults are
    /// demoted to custom.
    pub fn new(lab_id: LabId, categories: Vec<Category>) -> Self {
        let mut categories = categories;
        let mut seen_default = false;
        for category in categories.iter_mut() {
            if category.kind != CategoryKind::Default {
                continue;
            }
            if seen_default {
                warn!(
                    "event=tree_build module=model status=demoted_default lab_id={} category_id={}",
                    lab_id, category.id
                );
                category.kind = CategoryKind::Custom;
            }
            seen_default = true;
        }
        if !seen_default {
            categories.insert(0, Category::default_bucket());
        }
        Self { lab_id, categories }
    }

    /// Tree with only the default category.
    pub fn empty(lab_id: LabId) -> Self {
        Self::new(lab_id, Vec::new())
    }

    /// Wraps categories verbatim, without default synthesis.
    ///
    /// Used when replaying a stored snapshot; callers that need the default
    /// guarantee should use [`LabTree::new`].
    pub fn from_raw(lab_id: LabId, categories: Vec<Category>) -> Self {
        Self { lab_id, categories }
    }

    pub fn lab_id(&self) -> &LabId {
        &self.lab_id
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    pub fn default_category(&self) -> Option<&Category> {
        self.categories.iter().find(|category| category.is_default())
    }

    pub fn find_subject(&self, id: SubjectLocalId) -> Option<&Subject> {
        self.categories
            .iter()
            .flat_map(|category| category.subjects.iter())
            .find(|subject| subject.id == id)
    }

    /// Category whose collection holds the subject.
    pub fn find_subject_category(&self, id: SubjectLocalId) -> Option<&Category> {
        self.categories
            .iter()
            .find(|category| category.subjects.iter().any(|subject| subject.id == id))
    }

    pub fn find_by_canonical(&self, id: &CanonicalSubjectId) -> Option<&Subject> {
        self.categories
            .iter()
            .flat_map(|category| category.subjects.iter())
            .find(|subject| &subject.subject_id == id)
    }

    pub fn subject_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.subjects.len())
            .sum()
    }

    /// Places a new subject into the default category.
    pub fn try_add_subject_to_default(&self, subject: Subject) -> Result<Self, TreeError> {
        if self.find_by_canonical(&subject.subject_id).is_some() {
            return Err(TreeError::DuplicateSubject(subject.subject_id));
        }
        let mut next = self.clone();
        let default = next
            .categories
            .iter_mut()
            .find(|category| category.is_default())
            .ok_or(TreeError::DefaultCategoryMissing)?;
        let mut subject = subject;
        subject.category_id = default.id.clone();
        default.subjects.push(subject);
        Ok(next)
    }

    /// Removes a subject from whichever category holds it.
    pub fn try_remove_subject(&self, id: SubjectLocalId) -> Result<Self, TreeError> {
        if self.find_subject(id).is_none() {
            return Err(TreeError::SubjectNotFound(id));
        }
        let mut next = self.clone();
        for category in next.categories.iter_mut() {
            category.subjects.retain(|subject| subject.id != id);
        }
        Ok(next)
    }

    /// Moves one subject from `from` to the end of `to`.
    ///
    /// `from == to` returns an identical tree.
    pub fn try_move_subject(
        &self,
        id: SubjectLocalId,
        from: &CategoryId,
        to: &CategoryId,
    ) -> Result<Self, TreeError> {
        let source_index = self.category_index(from)?;
        let target_index = self.category_index(to)?;
        let position = self.categories[source_index]
            .subjects
            .iter()
            .position(|subject| subject.id == id)
            .ok_or_else(|| TreeError::SubjectNotInCategory {
                subject: id,
                category: from.clone(),
            })?;
        if source_index == target_index {
            return Ok(self.clone());
        }

        let mut next = self.clone();
        let mut subject = next.categories[source_index].subjects.remove(position);
        subject.category_id = to.clone();
        next.categories[target_index].subjects.push(subject);
        Ok(next)
    }

    /// Appends a category after the existing ones.
    pub fn try_insert_category(&self, category: Category) -> Result<Self, TreeError> {
        if self.category(&category.id).is_some() {
            return Err(TreeError::DuplicateCategory(category.id));
        }
        let mut next = self.clone();
        next.categories.push(category);
        Ok(next)
    }

    /// Renames a custom category. Name validation is the caller's job.
    pub fn try_rename_category(&self, id: &CategoryId, name: &str) -> Result<Self, TreeError> {
        let index = self.category_index(id)?;
        if self.categories[index].is_special() {
            return Err(TreeError::SpecialCategory(id.clone()));
        }
        let mut next = self.clone();
        next.categories[index].name = name.to_string();
        Ok(next)
    }

    /// Deletes a custom category.
    ///
    /// With `move_subjects_to_default`, its subjects are appended to the
    /// default category; otherwise they leave the tree with it.
    pub fn try_delete_category(
        &self,
        id: &CategoryId,
        move_subjects_to_default: bool,
    ) -> Result<Self, TreeError> {
        let index = self.category_index(id)?;
        if self.categories[index].is_special() {
            return Err(TreeError::SpecialCategory(id.clone()));
        }
        if move_subjects_to_default && self.default_category().is_none() {
            return Err(TreeError::DefaultCategoryMissing);
        }

        let mut next = self.clone();
        let removed = next.categories.remove(index);
        if move_subjects_to_default && !removed.subjects.is_empty() {
            if let Some(default) = next
                .categories
                .iter_mut()
                .find(|category| category.is_default())
            {
                let default_id = default.id.clone();
                default
                    .subjects
                    .extend(removed.subjects.into_iter().map(|mut subject| {
                        subject.category_id = default_id.clone();
                        subject
                    }));
            }
        }
        Ok(next)
    }

    /// Swaps a category id everywhere it is referenced.
    pub fn try_replace_category_id(
        &self,
        old: &CategoryId,
        new: &CategoryId,
    ) -> Result<Self, TreeError> {
        if old == new {
            return Ok(self.clone());
        }
        if self.category(new).is_some() {
            return Err(TreeError::DuplicateCategory(new.clone()));
        }
        let index = self.category_index(old)?;
        let mut next = self.clone();
        let category = &mut next.categories[index];
        category.id = new.clone();
        for subject in category.subjects.iter_mut() {
            subject.category_id = new.clone();
        }
        Ok(next)
    }

    /// Merges computed metrics into subjects by canonical id.
    ///
    /// Returns the new tree and how many subjects were updated. Absent
    /// values in `metrics` keep whatever the subject already had.
    pub fn with_metrics<'a>(
        &self,
        metrics: impl IntoIterator<Item = (&'a CanonicalSubjectId, &'a SubjectMetrics)>,
    ) -> (Self, usize) {
        let mut next = self.clone();
        let mut updated = 0;
        for (id, incoming) in metrics {
            let Some(subject) = next
                .categories
                .iter_mut()
                .flat_map(|category| category.subjects.iter_mut())
                .find(|subject| &subject.subject_id == id)
            else {
                continue;
            };
            let current = &mut subject.metrics;
            current.horizon_rank = incoming.horizon_rank.or(current.horizon_rank);
            current.tech_transfer = incoming.tech_transfer.or(current.tech_transfer);
            current.white_space = incoming.white_space.or(current.white_space);
            updated += 1;
        }
        (next, updated)
    }

    /// Verifies the structural invariants of the tree.
    pub fn check_invariants(&self) -> Result<(), TreeInvariantError> {
        let defaults = self
            .categories
            .iter()
            .filter(|category| category.is_default())
            .count();
        if defaults != 1 {
            return Err(TreeInvariantError::DefaultCategoryCount(defaults));
        }

        let mut category_ids = HashSet::new();
        let mut local_ids = HashSet::new();
        let mut canonical_ids = HashSet::new();
        for category in &self.categories {
            if !category_ids.insert(&category.id) {
                return Err(TreeInvariantError::DuplicateCategoryId(category.id.clone()));
            }
            for subject in &category.subjects {
                if subject.category_id != category.id {
                    return Err(TreeInvariantError::BrokenBackReference {
                        subject: subject.id,
                        holder: category.id.clone(),
                        recorded: subject.category_id.clone(),
                    });
                }
                if !local_ids.insert(subject.id) {
                    return Err(TreeInvariantError::DuplicateSubjectLocalId(subject.id));
                }
                if !canonical_ids.insert(&subject.subject_id) {
                    return Err(TreeInvariantError::DuplicateCanonicalId(
                        subject.subject_id.clone(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn category_index(&self, id: &CategoryId) -> Result<usize, TreeError> {
        self.categories
            .iter()
            .position(|category| &category.id == id)
            .ok_or_else(|| TreeError::CategoryNotFound(id.clone()))
    }
}
