//! Core domain logic for the Labspace research workspace.
//! This crate owns the category/subject tree and every rule that keeps it
//! consistent with the lab service.

pub mod config;
pub mod dnd;
pub mod logging;
pub mod model;
pub mod notify;
pub mod remote;
pub mod search;
pub mod service;
pub mod session;

pub use config::{ConfigError, EngineSettings, LabspaceConfig};
pub use dnd::{resolve_drop, DragPayload, DragTracker, DropTarget, MoveIntent};
pub use logging::{init_logging, logging_status};
pub use model::category::{
    Category, CategoryId, CategoryKind, DEFAULT_CATEGORY_ID, DEFAULT_CATEGORY_NAME,
};
pub use model::ops::{
    add_subject_to_default_category, create_new_category, delete_category,
    find_default_category, find_subject_category, move_subject_between_categories,
    remove_subject_from_categories,
};
pub use model::subject::{
    to_fsid, to_slug, CanonicalSubjectId, Subject, SubjectIdError, SubjectLocalId,
    SubjectMetrics, FSID_PREFIX,
};
pub use model::tree::{LabId, LabTree, TreeError, TreeInvariantError};
pub use model::validation::{
    compute_category_stats, sort_categories, validate_category_name, validate_category_rename,
    CategoryNameError, CategoryStats,
};
pub use notify::{
    ChannelSink, Notification, NotificationAction, NotificationQueue, NotificationSink, Severity,
    UndoToken,
};
pub use remote::http::HttpLabRemote;
pub use remote::memory::{InMemoryLabRemote, RemoteCall, RemoteOp};
pub use remote::{LabRemote, RemoteError, RemoteResult};
pub use search::{
    display_page, display_page_with_limit, merge_search_response, DisplayPage, SearchError,
    SearchResult, SubjectSearch, SubjectSearchHit, DISPLAY_LIMIT, SEARCH_LIMIT_MAX,
};
pub use service::lab_engine::{EngineError, LabEngine, MutationOutcome, SkipReason};
pub use service::mutation::{InvalidTransition, Mutation, MutationKind, MutationPhase};
pub use session::{CredentialProvider, LabRole, SessionCredentials};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
