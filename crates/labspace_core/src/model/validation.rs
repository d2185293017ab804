//! Pure category validation and aggregation utilities.
//!
//! # Responsibility
//! - Validate user-supplied category names.
//! - Derive display statistics and ordering for category lists.
//!
//! # Invariants
//! - Functions here are deterministic and perform no I/O.
//! - Name comparison for uniqueness is case-insensitive on the trimmed value.

use crate::model::category::{Category, CategoryId, CategoryKind};
use serde::Serialize;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Minimum category name length in characters, after trim.
pub const CATEGORY_NAME_MIN_CHARS: usize = 2;
/// Maximum category name length in characters, after trim.
pub const CATEGORY_NAME_MAX_CHARS: usize = 50;

const RESERVED_CATEGORY_NAMES: &[&str] = &["all", "none", "null", "undefined"];

/// Reasons a category name is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryNameError {
    Empty,
    TooShort { chars: usize },
    TooLong { chars: usize },
    /// Collides (case-insensitively) with an existing category name.
    Duplicate(String),
    Reserved(String),
}

impl CategoryNameError {
    /// Short machine-stable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::TooShort { .. } => "too short",
            Self::TooLong { .. } => "too long",
            Self::Duplicate(_) => "duplicate",
            Self::Reserved(_) => "reserved",
        }
    }
}

impl Display for CategoryNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Category name cannot be empty"),
            Self::TooShort { .. } => write!(
                f,
                "Category name must be at least {CATEGORY_NAME_MIN_CHARS} characters"
            ),
            Self::TooLong { .. } => write!(
                f,
                "Category name must be at most {CATEGORY_NAME_MAX_CHARS} characters"
            ),
            Self::Duplicate(name) => write!(f, "A category named \"{name}\" already exists"),
            Self::Reserved(name) => write!(f, "\"{name}\" is a reserved name"),
        }
    }
}

impl Error for CategoryNameError {}

/// Validates a category name against the lab's existing categories.
///
/// Returns the trimmed name on success.
pub fn validate_category_name(
    name: &str,
    existing: &[Category],
) -> Result<String, CategoryNameError> {
    validate_name_against(name, existing.iter().map(|category| category.name.as_str()))
}

/// Validates a rename, ignoring the renamed category's own current name.
pub fn validate_category_rename(
    name: &str,
    existing: &[Category],
    renamed: &CategoryId,
) -> Result<String, CategoryNameError> {
    validate_name_against(
        name,
        existing
            .iter()
            .filter(|category| &category.id != renamed)
            .map(|category| category.name.as_str()),
    )
}

/// Validates a name against an arbitrary set of taken names.
pub fn validate_name_against<'a>(
    name: &str,
    taken: impl IntoIterator<Item = &'a str>,
) -> Result<String, CategoryNameError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CategoryNameError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars < CATEGORY_NAME_MIN_CHARS {
        return Err(CategoryNameError::TooShort { chars });
    }
    if chars > CATEGORY_NAME_MAX_CHARS {
        return Err(CategoryNameError::TooLong { chars });
    }

    let folded = trimmed.to_lowercase();
    if let Some(existing) = taken
        .into_iter()
        .find(|existing| existing.trim().to_lowercase() == folded)
    {
        return Err(CategoryNameError::Duplicate(existing.trim().to_string()));
    }
    if RESERVED_CATEGORY_NAMES.contains(&folded.as_str()) {
        return Err(CategoryNameError::Reserved(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Aggregate counts over a category list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub total_categories: usize,
    pub custom_categories: usize,
    pub total_subjects: usize,
    pub categories_with_subjects: usize,
    pub empty_categories: usize,
    pub default_category_subject_count: usize,
    pub average_subjects_per_category: f64,
}

/// Computes [`CategoryStats`]; an empty list averages to zero.
pub fn compute_category_stats(categories: &[Category]) -> CategoryStats {
    let total_categories = categories.len();
    let total_subjects = categories
        .iter()
        .map(|category| category.subjects.len())
        .sum::<usize>();
    let categories_with_subjects = categories
        .iter()
        .filter(|category| !category.subjects.is_empty())
        .count();

    CategoryStats {
        total_categories,
        custom_categories: categories
            .iter()
            .filter(|category| category.kind == CategoryKind::Custom)
            .count(),
        total_subjects,
        categories_with_subjects,
        empty_categories: total_categories - categories_with_subjects,
        default_category_subject_count: categories
            .iter()
            .find(|category| category.is_default())
            .map(|category| category.subjects.len())
            .unwrap_or(0),
        average_subjects_per_category: total_subjects as f64 / total_categories.max(1) as f64,
    }
}

/// Orders categories: default first, legacy exclude second, then by name.
///
/// Names compare by their Unicode lowercase form, which stands in for a
/// locale-aware collation: accented letters sort by code point rather than
/// next to their base letter. Ties keep their input order.
pub fn sort_categories(categories: &[Category]) -> Vec<Category> {
    let mut sorted = categories.to_vec();
    sorted.sort_by(compare_categories);
    sorted
}

fn compare_categories(left: &Category, right: &Category) -> Ordering {
    kind_rank(left.kind)
        .cmp(&kind_rank(right.kind))
        .then_with(|| left.name.to_lowercase().cmp(&right.name.to_lowercase()))
}

fn kind_rank(kind: CategoryKind) -> u8 {
    match kind {
        CategoryKind::Default => 0,
        CategoryKind::LegacyExclude => 1,
        CategoryKind::Custom => 2,
    }
}
