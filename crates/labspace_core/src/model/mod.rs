//! Lab domain model: categories, subjects and the tree that binds them.
//!
//! # Responsibility
//! - Define canonical data structures used by the reconciliation engine.
//! - Keep every tree transformation pure and copy-on-write.
//!
//! # Invariants
//! - A subject belongs to exactly one category at a time.
//! - Exactly one category per lab is the default bucket.

pub mod category;
pub mod ops;
pub mod subject;
pub mod tree;
pub mod validation;
