//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose lab workspace use cases to Dart via FRB.
//! - Hold the single open lab session of the process.
//!
//! # Invariants
//! - Exported functions must not panic across the FFI boundary.
//! - Failures come back as envelopes with `ok = false` and a message.
//! - Calls that reach the lab service are async exports; their work runs on
//!   one process-wide tokio runtime, so sync reads such as `lab_snapshot`
//!   observe the optimistic state while a mutation is in flight.

use labspace_core::{
    core_version as core_version_inner, display_page_with_limit,
    init_logging as init_logging_inner, ping as ping_inner, sort_categories,
    validate_category_name, CategoryId, EngineError, HttpLabRemote, LabEngine, LabId, LabRole,
    LabRemote, LabTree, LabspaceConfig, MutationOutcome, NotificationQueue, SessionCredentials, SkipReason,
    SubjectSearch, UndoToken,
};
use log::info;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinError;
use uuid::Uuid;

static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();
static SESSION: OnceLock<Mutex<Option<Arc<LabSession>>>> = OnceLock::new();

struct LabSession {
    engine: LabEngine<dyn LabRemote>,
    search: SubjectSearch<dyn LabRemote>,
    notifications: Arc<NotificationQueue>,
    display_limit: usize,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Exposes the core crate version.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory for rolling logs.
/// - Returns empty string on success and the error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Subject row in a lab snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LabSubjectItem {
    /// Client-local id used for moves and removal.
    pub local_id: String,
    /// Canonical `fsid_` id.
    pub subject_id: String,
    pub subject_slug: String,
    pub category_id: String,
    pub name: String,
    pub notes: Option<String>,
    pub added_at: i64,
    pub horizon_rank: Option<f64>,
    pub tech_transfer: Option<f64>,
    pub white_space: Option<f64>,
}

/// Category with its subjects, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabCategoryItem {
    pub id: String,
    pub name: String,
    /// `default|custom|exclude`.
    pub kind: String,
    pub subjects: Vec<LabSubjectItem>,
}

/// Snapshot envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct LabSnapshotResponse {
    pub ok: bool,
    pub categories: Vec<LabCategoryItem>,
    pub message: String,
}

/// Generic action envelope for lab mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabActionResponse {
    /// Whether the change is in effect.
    pub ok: bool,
    /// New subject local id or confirmed category id, when relevant.
    pub id: Option<String>,
    /// Undo handle after a removal.
    pub undo_token: Option<String>,
    pub message: String,
}

impl LabActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: None,
            undo_token: None,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id: None,
            undo_token: None,
            message: message.into(),
        }
    }
}

/// One directory search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSearchItem {
    pub subject_id: String,
    pub name: String,
    pub summary: Option<String>,
    pub exact: bool,
}

/// Search envelope; `hidden_count` results are folded behind "view more".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSearchResponse {
    pub ok: bool,
    pub items: Vec<SubjectSearchItem>,
    pub hidden_count: u32,
    pub message: String,
}

/// Drained toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationItem {
    pub title: String,
    pub description: String,
    /// `success|error|warning|info`.
    pub severity: String,
    pub duration_ms: u64,
    pub action_label: Option<String>,
    pub undo_token: Option<String>,
}

/// Opens a lab session and loads its tree.
///
/// `config_json` is the camelCase `LabspaceConfig` document. Replaces any
/// previously open session.
///
/// # FFI contract
/// - Async call; resolves after the initial load.
/// - Never panics.
pub async fn lab_open(
    config_json: String,
    lab_id: String,
    role: String,
    bearer_token: String,
    user_id: Option<String>,
) -> LabActionResponse {
    let config = match LabspaceConfig::from_json_str(config_json.as_str()) {
        Ok(config) => config,
        Err(err) => return LabActionResponse::failure(format!("lab_open failed: {err}")),
    };
    let remote: Arc<dyn LabRemote> = match HttpLabRemote::new(&config) {
        Ok(remote) => Arc::new(remote),
        Err(err) => return LabActionResponse::failure(format!("lab_open failed: {err}")),
    };
    open_session(remote, &config, lab_id, role, bearer_token, user_id).await
}

async fn open_session(
    remote: Arc<dyn LabRemote>,
    config: &LabspaceConfig,
    lab_id: String,
    role: String,
    bearer_token: String,
    user_id: Option<String>,
) -> LabActionResponse {
    let mut credentials = SessionCredentials::new(bearer_token);
    if let Some(user_id) = user_id.filter(|value| !value.trim().is_empty()) {
        credentials = credentials.with_user_id(user_id);
    }
    let credentials = Arc::new(credentials);
    let notifications = Arc::new(NotificationQueue::new());
    let lab_id = LabId::new(lab_id.trim());
    let engine = LabEngine::new(
        lab_id.clone(),
        LabRole::parse(role.as_str()),
        Arc::clone(&remote),
        credentials.clone(),
        notifications.clone(),
    )
    .with_settings(config.engine_settings());
    let search =
        SubjectSearch::new(remote, credentials).with_limit(config.effective_search_limit());

    let session = Arc::new(LabSession {
        engine,
        search,
        notifications,
        display_limit: config.search_display_limit,
    });
    let loading = Arc::clone(&session);
    let loaded = on_runtime(async move { loading.engine.load().await }).await;
    match loaded {
        Ok(Ok(tree)) => {
            let subjects = tree.subject_count();
            *lock_session() = Some(session);
            info!(
                "event=lab_open module=ffi status=ok lab_id={} subjects={}",
                lab_id, subjects
            );
            let mut response = LabActionResponse::success(format!("Loaded {subjects} subject(s)."));
            response.id = Some(lab_id.to_string());
            response
        }
        Ok(Err(err)) => LabActionResponse::failure(format!("lab_open failed: {err}")),
        Err(err) => LabActionResponse::failure(format!("lab_open failed: {err}")),
    }
}

/// Drops the open lab session, if any.
#[flutter_rust_bridge::frb(sync)]
pub fn lab_close() -> bool {
    lock_session().take().is_some()
}

/// Returns the visible tree in display order.
#[flutter_rust_bridge::frb(sync)]
pub fn lab_snapshot() -> LabSnapshotResponse {
    match current_session() {
        Ok(session) => LabSnapshotResponse {
            ok: true,
            categories: to_category_items(&session.engine.snapshot()),
            message: String::new(),
        },
        Err(message) => LabSnapshotResponse {
            ok: false,
            categories: Vec::new(),
            message,
        },
    }
}

/// Validates a category name for inline form feedback.
///
/// Returns empty string when the name is acceptable.
#[flutter_rust_bridge::frb(sync)]
pub fn lab_validate_category_name(name: String) -> String {
    let categories = match current_session() {
        Ok(session) => session.engine.snapshot().categories().to_vec(),
        Err(_) => Vec::new(),
    };
    match validate_category_name(name.as_str(), &categories) {
        Ok(_) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Searches the subject directory.
pub async fn lab_search(keyword: String, expanded: bool) -> SubjectSearchResponse {
    let failure = |message: String| SubjectSearchResponse {
        ok: false,
        items: Vec::new(),
        hidden_count: 0,
        message,
    };
    let session = match current_session() {
        Ok(session) => session,
        Err(message) => return failure(message),
    };
    let searching = Arc::clone(&session);
    let query = async move { searching.search.search(keyword.as_str()).await };
    let hits = match on_runtime(query).await {
        Ok(Ok(hits)) => hits,
        Ok(Err(err)) => return failure(format!("lab_search failed: {err}")),
        Err(err) => return failure(format!("lab_search failed: {err}")),
    };

    let page = display_page_with_limit(&hits, expanded, session.display_limit);
    let items = page
        .visible
        .iter()
        .map(|hit| SubjectSearchItem {
            subject_id: hit.canonical_id.to_string(),
            name: hit.name.clone(),
            summary: hit.summary.clone(),
            exact: hit.exact,
        })
        .collect::<Vec<_>>();
    let message = if hits.is_empty() {
        "No results.".to_string()
    } else {
        format!("Found {} result(s).", hits.len())
    };
    SubjectSearchResponse {
        ok: true,
        items,
        hidden_count: page.hidden as u32,
        message,
    }
}

/// Adds a subject to the default category.
///
/// # FFI contract
/// - Async call; resolves once the change is confirmed or rolled back.
/// - The optimistic tree is readable through `lab_snapshot` meanwhile.
pub async fn lab_add_subject(
    subject_id: String,
    name: String,
    summary: Option<String>,
) -> LabActionResponse {
    run_mutation("lab_add_subject", move |session| async move {
        session
            .engine
            .add_subject(subject_id.as_str(), name.as_str(), summary)
            .await
    })
    .await
}

/// Removes a subject; the response carries an undo token.
pub async fn lab_remove_subject(local_id: String) -> LabActionResponse {
    let subject = match parse_local_id(&local_id) {
        Ok(subject) => subject,
        Err(message) => return LabActionResponse::failure(message),
    };
    run_mutation("lab_remove_subject", move |session| async move {
        session.engine.remove_subject(subject).await
    })
    .await
}

/// Restores a removed subject locally.
#[flutter_rust_bridge::frb(sync)]
pub fn lab_undo_remove(undo_token: String) -> LabActionResponse {
    let session = match current_session() {
        Ok(session) => session,
        Err(message) => return LabActionResponse::failure(message),
    };
    let Some(token) = UndoToken::parse(undo_token.as_str()) else {
        return LabActionResponse::failure("lab_undo_remove failed: invalid undo token");
    };
    match session.engine.undo_remove(token) {
        Ok(()) => LabActionResponse::success("Restored in UI only. Please refresh."),
        Err(err) => LabActionResponse::failure(format!("lab_undo_remove failed: {err}")),
    }
}

/// Moves a subject between categories.
pub async fn lab_move_subject(
    local_id: String,
    from_category_id: String,
    to_category_id: String,
) -> LabActionResponse {
    let subject = match parse_local_id(&local_id) {
        Ok(subject) => subject,
        Err(message) => return LabActionResponse::failure(message),
    };
    let from = CategoryId::new(from_category_id.trim());
    let to = CategoryId::new(to_category_id.trim());
    run_mutation("lab_move_subject", move |session| async move {
        session.engine.move_subject(subject, &from, &to).await
    })
    .await
}

/// Creates a custom category; the response carries the server-issued id.
pub async fn lab_create_category(name: String) -> LabActionResponse {
    run_mutation("lab_create_category", move |session| async move {
        session.engine.create_category(name.as_str()).await
    })
    .await
}

pub async fn lab_rename_category(category_id: String, name: String) -> LabActionResponse {
    let category_id = CategoryId::new(category_id.trim());
    run_mutation("lab_rename_category", move |session| async move {
        session
            .engine
            .rename_category(&category_id, name.as_str())
            .await
    })
    .await
}

/// Deletes a custom category, moving its subjects to the default one when
/// `redistribute` is set.
pub async fn lab_delete_category(category_id: String, redistribute: bool) -> LabActionResponse {
    let category_id = CategoryId::new(category_id.trim());
    run_mutation("lab_delete_category", move |session| async move {
        session
            .engine
            .delete_category(&category_id, redistribute)
            .await
    })
    .await
}

/// Pulls computed subject metrics into the tree.
pub async fn lab_refresh_metrics() -> LabActionResponse {
    let session = match current_session() {
        Ok(session) => session,
        Err(message) => return LabActionResponse::failure(message),
    };
    match on_runtime(async move { session.engine.refresh_metrics().await }).await {
        Ok(Ok(updated)) => LabActionResponse::success(format!("Updated {updated} subject(s).")),
        Ok(Err(err)) => LabActionResponse::failure(format!("lab_refresh_metrics failed: {err}")),
        Err(err) => LabActionResponse::failure(format!("lab_refresh_metrics failed: {err}")),
    }
}

/// Removes and returns pending toasts.
#[flutter_rust_bridge::frb(sync)]
pub fn lab_drain_notifications() -> Vec<NotificationItem> {
    let Ok(session) = current_session() else {
        return Vec::new();
    };
    session
        .notifications
        .drain()
        .into_iter()
        .map(|notification| NotificationItem {
            title: notification.title,
            description: notification.description,
            severity: notification.severity.as_str().to_string(),
            duration_ms: notification.duration_ms,
            action_label: notification.action.as_ref().map(|action| action.label.clone()),
            undo_token: notification.action.map(|action| action.undo.to_string()),
        })
        .collect()
}

async fn run_mutation<F, Fut>(op: &str, call: F) -> LabActionResponse
where
    F: FnOnce(Arc<LabSession>) -> Fut,
    Fut: Future<Output = Result<MutationOutcome, EngineError>> + Send + 'static,
{
    let session = match current_session() {
        Ok(session) => session,
        Err(message) => return LabActionResponse::failure(message),
    };
    match on_runtime(call(session)).await {
        Ok(Ok(outcome)) => to_action_response(outcome),
        Ok(Err(err)) => LabActionResponse::failure(format!("{op} failed: {err}")),
        Err(err) => LabActionResponse::failure(format!("{op} failed: {err}")),
    }
}

fn to_action_response(outcome: MutationOutcome) -> LabActionResponse {
    match outcome {
        MutationOutcome::Confirmed => LabActionResponse::success("Saved."),
        MutationOutcome::SubjectAdded(local_id) => LabActionResponse {
            id: Some(local_id.to_string()),
            ..LabActionResponse::success("Subject added.")
        },
        MutationOutcome::CategoryCreated(category_id) => LabActionResponse {
            id: Some(category_id.to_string()),
            ..LabActionResponse::success("Category created.")
        },
        MutationOutcome::SubjectRemoved { undo } => LabActionResponse {
            undo_token: Some(undo.to_string()),
            ..LabActionResponse::success("Subject removed.")
        },
        MutationOutcome::RolledBack { reason } => {
            LabActionResponse::failure(format!("Change reverted: {reason}"))
        }
        MutationOutcome::Unchanged(SkipReason::AlreadyExists) => {
            LabActionResponse::failure("Subject already exists in this lab.")
        }
        MutationOutcome::Unchanged(SkipReason::SameCategory) => {
            LabActionResponse::success("Subject is already in that category.")
        }
        MutationOutcome::Unchanged(SkipReason::SameName) => {
            LabActionResponse::success("Category name unchanged.")
        }
    }
}

fn to_category_items(tree: &LabTree) -> Vec<LabCategoryItem> {
    sort_categories(tree.categories())
        .into_iter()
        .map(|category| LabCategoryItem {
            id: category.id.to_string(),
            name: category.name,
            kind: category.kind.as_wire().to_string(),
            subjects: category
                .subjects
                .into_iter()
                .map(|subject| LabSubjectItem {
                    local_id: subject.id.to_string(),
                    subject_id: subject.subject_id.to_string(),
                    subject_slug: subject.subject_slug,
                    category_id: subject.category_id.to_string(),
                    name: subject.subject_name,
                    notes: subject.notes,
                    added_at: subject.added_at,
                    horizon_rank: subject.metrics.horizon_rank,
                    tech_transfer: subject.metrics.tech_transfer,
                    white_space: subject.metrics.white_space,
                })
                .collect(),
        })
        .collect()
}

fn parse_local_id(raw: &str) -> Result<Uuid, String> {
    Uuid::parse_str(raw.trim()).map_err(|err| format!("invalid subject id `{}`: {err}", raw.trim()))
}

fn current_session() -> Result<Arc<LabSession>, String> {
    lock_session()
        .clone()
        .ok_or_else(|| "no lab is open; call lab_open first".to_string())
}

fn lock_session() -> std::sync::MutexGuard<'static, Option<Arc<LabSession>>> {
    SESSION
        .get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Runs `future` on the shared runtime and waits for it from any executor.
async fn on_runtime<F>(future: F) -> Result<F::Output, String>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let runtime = RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("labspace-ffi")
            .enable_all()
            .build()
            .map_err(|err| format!("failed to start async runtime: {err}"))
    });
    match runtime {
        Ok(runtime) => runtime
            .spawn(future)
            .await
            .map_err(|err: JoinError| format!("background task failed: {err}")),
        Err(err) => Err(err.clone()),
    }
}
