//! Fail-soft tree operations for presentation-side callers.
//!
//! # Responsibility
//! - Expose the category/subject transformations as total functions.
//!
//! # Invariants
//! - Not-found conditions are logged and return the input tree unchanged.
//! - A missing default category is logged at error level; it is a
//!   configuration invariant violation, not a user error.
//! - Only `create_new_category` reports failure, for name validation.

use crate::model::category::{Category, CategoryId, CategoryKind};
use crate::model::subject::{Subject, SubjectLocalId};
use crate::model::tree::{LabTree, TreeError};
use crate::model::validation::{validate_category_name, CategoryNameError};
use log::{error, warn};

/// Returns the default category, if any.
pub fn find_default_category(tree: &LabTree) -> Option<&Category> {
    tree.default_category()
}

/// Returns the category currently holding `subject`.
pub fn find_subject_category(tree: &LabTree, subject: SubjectLocalId) -> Option<&Category> {
    tree.find_subject_category(subject)
}

/// Moves a subject between categories; unchanged tree on lookup failure.
pub fn move_subject_between_categories(
    tree: &LabTree,
    subject: SubjectLocalId,
    from: &CategoryId,
    to: &CategoryId,
) -> LabTree {
    settle(tree, "move_subject", tree.try_move_subject(subject, from, to))
}

/// Removes a subject from every category. Removing an absent id is a no-op.
pub fn remove_subject_from_categories(tree: &LabTree, subject: SubjectLocalId) -> LabTree {
    match tree.try_remove_subject(subject) {
        Ok(next) => next,
        Err(TreeError::SubjectNotFound(_)) => tree.clone(),
        Err(err) => settle(tree, "remove_subject", Err(err)),
    }
}

/// Places a subject into the default category.
pub fn add_subject_to_default_category(tree: &LabTree, subject: Subject) -> LabTree {
    settle(
        tree,
        "add_subject",
        tree.try_add_subject_to_default(subject),
    )
}

/// Deletes a custom category, optionally re-parenting its subjects.
pub fn delete_category(
    tree: &LabTree,
    category: &CategoryId,
    move_subjects_to_default: bool,
) -> LabTree {
    settle(
        tree,
        "delete_category",
        tree.try_delete_category(category, move_subjects_to_default),
    )
}

/// Validates `name` and returns a new, empty custom category.
///
/// The id is provisional until the server issues the authoritative one.
pub fn create_new_category(tree: &LabTree, name: &str) -> Result<Category, CategoryNameError> {
    let name = validate_category_name(name, tree.categories())?;
    Ok(Category::new(
        CategoryId::provisional(),
        name,
        CategoryKind::Custom,
    ))
}

fn settle(tree: &LabTree, op: &str, result: Result<LabTree, TreeError>) -> LabTree {
    match result {
        Ok(next) => next,
        Err(TreeError::DefaultCategoryMissing) => {
            error!(
                "event=tree_op module=model op={} status=error reason=default_category_missing lab_id={}",
                op,
                tree.lab_id()
            );
            tree.clone()
        }
        Err(err) => {
            warn!(
                "event=tree_op module=model op={} status=skipped lab_id={} reason=\"{}\"",
                op,
                tree.lab_id(),
                err
            );
            tree.clone()
        }
    }
}
