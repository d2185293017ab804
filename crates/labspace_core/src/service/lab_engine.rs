//! Optimistic reconciliation engine for one lab.
//!
//! # Responsibility
//! - Own the visible category/subject tree and publish snapshots of it.
//! - Run every mutation as apply-optimistically, confirm remotely, or
//!   roll back to the exact pre-mutation snapshot.
//! - Translate outcomes into transient notifications.
//!
//! # Invariants
//! - The engine is the only writer of the tree; snapshots are immutable
//!   `Arc<LabTree>` values replaced wholesale.
//! - Permission and credential checks run before any state change.
//! - A rollback restores the snapshot taken at dispatch time, even if other
//!   mutations confirmed in between.
//! - Only `delete_category` returns remote failures as errors; the other
//!   mutations report them as `MutationOutcome::RolledBack`.
//! - Undo of a removal is local only; the server keeps the deletion.
//!
//! # See also
//! - `service::mutation` for the per-mutation state machine.

use crate::config::EngineSettings;
use crate::dnd::MoveIntent;
use crate::model::category::CategoryId;
use crate::model::ops::create_new_category;
use crate::model::subject::{CanonicalSubjectId, Subject, SubjectIdError, SubjectLocalId};
use crate::model::tree::{LabId, LabTree, TreeError};
use crate::model::validation::{validate_category_rename, CategoryNameError};
use crate::notify::{Notification, NotificationSink, Severity, UndoToken};
use crate::remote::types::{
    AddSubjectsRequest, CreateSubcategoryRequest, DeleteSubcategoryRequest, MoveSubjectsRequest,
    RemoveSubjectRequest, RenameSubcategoryRequest,
};
use crate::remote::{LabRemote, RemoteError, RemoteResult};
use crate::search::SubjectSearchHit;
use crate::service::mutation::{InvalidTransition, Mutation, MutationKind};
use crate::session::{CredentialProvider, LabRole};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::time::Instant;

/// Errors surfaced by engine operations.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Caller's role is read-only.
    PermissionDenied,
    /// No credential available.
    AuthRequired,
    /// Server rejected the credential; session was logged out.
    SessionExpired,
    /// Category name rejected locally.
    Validation(CategoryNameError),
    /// Referenced category or subject is not in the local tree.
    NotFoundLocal(TreeError),
    /// Default or exclude category cannot be changed this way.
    SpecialCategory(CategoryId),
    /// Another mutation on the same subject/category is in flight.
    Busy,
    /// Undo token unknown or its window elapsed.
    UndoExpired,
    InvalidSubjectId(SubjectIdError),
    /// Remote confirmation failed; the change was rolled back.
    Remote(RemoteError),
    InvalidTransition(InvalidTransition),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "You have read-only access to this lab"),
            Self::AuthRequired => write!(f, "Please sign in to continue"),
            Self::SessionExpired => write!(f, "Session expired. Please sign in again"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFoundLocal(err) => write!(f, "{err}"),
            Self::SpecialCategory(id) => write!(f, "category cannot be modified: {id}"),
            Self::Busy => write!(f, "Another change to this item is still in progress"),
            Self::UndoExpired => write!(f, "Undo is no longer available"),
            Self::InvalidSubjectId(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::InvalidTransition(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::NotFoundLocal(err) => Some(err),
            Self::InvalidSubjectId(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::InvalidTransition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CategoryNameError> for EngineError {
    fn from(value: CategoryNameError) -> Self {
        Self::Validation(value)
    }
}

impl From<TreeError> for EngineError {
    fn from(value: TreeError) -> Self {
        match value {
            TreeError::SpecialCategory(id) => Self::SpecialCategory(id),
            other => Self::NotFoundLocal(other),
        }
    }
}

impl From<SubjectIdError> for EngineError {
    fn from(value: SubjectIdError) -> Self {
        Self::InvalidSubjectId(value)
    }
}

impl From<InvalidTransition> for EngineError {
    fn from(value: InvalidTransition) -> Self {
        Self::InvalidTransition(value)
    }
}

impl From<RemoteError> for EngineError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::SessionExpired => Self::SessionExpired,
            other => Self::Remote(other),
        }
    }
}

/// Why a request was accepted without touching state or the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Subject with that canonical id is already in the lab.
    AlreadyExists,
    /// Move source and destination are the same category.
    SameCategory,
    /// Rename to the category's current name.
    SameName,
}

/// Result of a mutation that passed its preconditions.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Confirmed,
    SubjectAdded(SubjectLocalId),
    /// Category confirmed under its server-issued id.
    CategoryCreated(CategoryId),
    /// Removal confirmed; `undo` restores it locally within the window.
    SubjectRemoved { undo: UndoToken },
    /// Remote step failed and the pre-mutation snapshot was restored.
    RolledBack { reason: RemoteError },
    Unchanged(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityKey {
    Subject(SubjectLocalId),
    Canonical(CanonicalSubjectId),
    Category(CategoryId),
}

struct PendingUndo {
    previous: Arc<LabTree>,
    subject: SubjectLocalId,
    expires_at: Instant,
}

/// Releases claimed entity keys when the mutation finishes.
struct InFlightClaim<'a> {
    registry: &'a Mutex<HashSet<EntityKey>>,
    keys: Vec<EntityKey>,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        if self.keys.is_empty() {
            return;
        }
        let mut registry = lock(self.registry);
        for key in &self.keys {
            registry.remove(key);
        }
    }
}

/// Reconciliation engine facade for one lab.
pub struct LabEngine<R: LabRemote + ?Sized> {
    lab_id: LabId,
    role: LabRole,
    remote: Arc<R>,
    credentials: Arc<dyn CredentialProvider>,
    notifier: Arc<dyn NotificationSink>,
    settings: EngineSettings,
    state: watch::Sender<Arc<LabTree>>,
    pending_undo: Mutex<HashMap<UndoToken, PendingUndo>>,
    in_flight: Mutex<HashSet<EntityKey>>,
}

impl<R: LabRemote + ?Sized> LabEngine<R> {
    /// Creates an engine over an empty tree; call [`LabEngine::load`] to fill it.
    pub fn new(
        lab_id: LabId,
        role: LabRole,
        remote: Arc<R>,
        credentials: Arc<dyn CredentialProvider>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (state, _) = watch::channel(Arc::new(LabTree::empty(lab_id.clone())));
        Self {
            lab_id,
            role,
            remote,
            credentials,
            notifier,
            settings: EngineSettings::default(),
            state,
            pending_undo: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn lab_id(&self) -> &LabId {
        &self.lab_id
    }

    pub fn role(&self) -> LabRole {
        self.role
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Current visible tree.
    pub fn snapshot(&self) -> Arc<LabTree> {
        Arc::clone(&self.state.borrow())
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<LabTree>> {
        self.state.subscribe()
    }

    /// Fetches the lab and replaces the visible tree.
    ///
    /// Viewers may load. A missing default category is created locally.
    pub async fn load(&self) -> Result<Arc<LabTree>, EngineError> {
        let token = self.require_token()?;
        match self.remote.fetch_lab(&token, &self.lab_id).await {
            Ok(payload) => {
                let tree = Arc::new(payload.into_tree());
                info!(
                    "event=lab_load module=engine status=ok lab_id={} categories={} subjects={}",
                    self.lab_id,
                    tree.categories().len(),
                    tree.subject_count()
                );
                self.state.send_replace(Arc::clone(&tree));
                Ok(tree)
            }
            Err(err) => Err(self.report_read_failure("lab_load", "Failed to load lab", err)),
        }
    }

    /// Adds a search hit to the default category.
    pub async fn add_search_hit(
        &self,
        hit: &SubjectSearchHit,
    ) -> Result<MutationOutcome, EngineError> {
        self.add_subject(hit.canonical_id.as_str(), &hit.name, hit.summary.clone())
            .await
    }

    /// Adds a subject, by canonical id in either form, to the default category.
    ///
    /// A subject already in the lab yields `Unchanged(AlreadyExists)` without
    /// any request.
    pub async fn add_subject(
        &self,
        raw_subject_id: &str,
        subject_name: &str,
        notes: Option<String>,
    ) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::AddSubject;
        let token = self.precheck(kind)?;
        let subject_id = CanonicalSubjectId::parse(raw_subject_id)?;

        let previous = self.snapshot();
        if previous.find_by_canonical(&subject_id).is_some() {
            info!(
                "event=lab_mutation module=engine kind={} status=skipped reason=already_exists lab_id={} subject_id={}",
                kind.as_str(),
                self.lab_id,
                subject_id
            );
            self.notify(
                Severity::Info,
                "Subject already added",
                format!("{subject_name} is already in this lab"),
            );
            return Ok(MutationOutcome::Unchanged(SkipReason::AlreadyExists));
        }

        let _claim = self.claim(vec![EntityKey::Canonical(subject_id.clone())])?;
        let default_id = previous
            .default_category()
            .map(|category| category.id.clone())
            .ok_or_else(|| self.local_failure(kind, TreeError::DefaultCategoryMissing))?;
        let mut subject = Subject::new(subject_id.clone(), subject_name.trim(), default_id);
        subject.notes = notes;
        subject.added_by_id = self.credentials.user_id();
        let local_id = subject.id;
        let next = previous
            .try_add_subject_to_default(subject)
            .map_err(|err| self.local_failure(kind, err))?;

        let request = AddSubjectsRequest {
            subject_ids: vec![subject_id],
            lab_id: self.lab_id.clone(),
        };
        let applied = self.toast(
            Severity::Success,
            "Subject added",
            format!("{} was added to the lab", subject_name.trim()),
        );
        let result = self
            .reconcile(
                Mutation::new(kind),
                previous,
                next,
                applied,
                "Failed to add subject",
                self.remote.add_subjects(&token, &request),
            )
            .await;
        swallow_remote(result.map(|()| MutationOutcome::SubjectAdded(local_id)))
    }

    /// Removes a subject from the lab and offers a local undo.
    pub async fn remove_subject(
        &self,
        subject: SubjectLocalId,
    ) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::RemoveSubject;
        let token = self.precheck(kind)?;
        let previous = self.snapshot();
        let subject_id = previous
            .find_subject(subject)
            .map(|found| found.subject_id.clone())
            .ok_or_else(|| self.local_failure(kind, TreeError::SubjectNotFound(subject)))?;

        let _claim = self.claim(vec![EntityKey::Subject(subject)])?;
        let next = previous
            .try_remove_subject(subject)
            .map_err(|err| self.local_failure(kind, err))?;

        let undo = self.register_undo(Arc::clone(&previous), subject);
        let applied = self
            .toast(
                Severity::Success,
                "Subject removed",
                "The subject was removed from this lab",
            )
            .with_action("Undo", undo);
        let applied = Notification {
            duration_ms: self.settings.undo_window.as_millis() as u64,
            ..applied
        };
        let request = RemoveSubjectRequest {
            lab_id: self.lab_id.clone(),
            subject_id,
        };
        let result = self
            .reconcile(
                Mutation::new(kind),
                previous,
                next,
                applied,
                "Failed to remove subject",
                self.remote.remove_subject(&token, &request),
            )
            .await;
        if result.is_err() {
            lock(&self.pending_undo).remove(&undo);
        }
        swallow_remote(result.map(|()| MutationOutcome::SubjectRemoved { undo }))
    }

    /// Restores the tree captured before a removal.
    ///
    /// The server keeps the deletion; the user is warned to refresh.
    pub fn undo_remove(&self, undo: UndoToken) -> Result<(), EngineError> {
        let pending = lock(&self.pending_undo).remove(&undo);
        let Some(pending) = pending else {
            return Err(EngineError::UndoExpired);
        };
        if Instant::now() > pending.expires_at {
            info!(
                "event=undo_remove module=engine status=expired lab_id={} subject_id={}",
                self.lab_id, pending.subject
            );
            return Err(EngineError::UndoExpired);
        }

        self.state.send_replace(pending.previous);
        warn!(
            "event=undo_remove module=engine status=local_only lab_id={} subject_id={}",
            self.lab_id, pending.subject
        );
        self.notify(
            Severity::Warning,
            "Restored in UI only",
            "The subject is back in this view but is still removed on the server. Please refresh.",
        );
        Ok(())
    }

    /// Moves a subject to another category.
    ///
    /// `from == to` yields `Unchanged(SameCategory)` without any request.
    /// With the overlap guard on, a category still awaiting its server id
    /// counts as in flight, so moves into or out of it return `Busy`.
    pub async fn move_subject(
        &self,
        subject: SubjectLocalId,
        from: &CategoryId,
        to: &CategoryId,
    ) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::MoveSubject;
        let token = self.precheck(kind)?;
        if from == to {
            return Ok(MutationOutcome::Unchanged(SkipReason::SameCategory));
        }

        let previous = self.snapshot();
        let next = previous
            .try_move_subject(subject, from, to)
            .map_err(|err| self.local_failure(kind, err))?;
        let subject_id = previous
            .find_subject(subject)
            .map(|found| found.subject_id.clone())
            .ok_or_else(|| self.local_failure(kind, TreeError::SubjectNotFound(subject)))?;
        let target_name = next
            .category(to)
            .map(|category| category.name.clone())
            .unwrap_or_default();

        let mut keys = vec![EntityKey::Subject(subject)];
        keys.extend(
            [from, to]
                .into_iter()
                .filter(|id| id.is_provisional())
                .map(|id| EntityKey::Category(id.clone())),
        );
        let _claim = self.claim(keys)?;
        let request = MoveSubjectsRequest {
            subject_ids: vec![subject_id],
            lab_id: self.lab_id.clone(),
            from_category_id: from.clone(),
            to_category_id: to.clone(),
        };
        let applied = self.toast(
            Severity::Success,
            "Subject moved",
            format!("Moved to {target_name}"),
        );
        let result = self
            .reconcile(
                Mutation::new(kind),
                previous,
                next,
                applied,
                "Failed to move subject",
                self.remote.move_subjects(&token, &request),
            )
            .await;
        swallow_remote(result.map(|()| MutationOutcome::Confirmed))
    }

    /// Runs a move produced by the drag-and-drop adapter.
    pub async fn dispatch_move(&self, intent: MoveIntent) -> Result<MutationOutcome, EngineError> {
        self.move_subject(intent.subject, &intent.from, &intent.to)
            .await
    }

    /// Creates a custom category.
    ///
    /// The category appears under a provisional id, which is swapped for the
    /// server-issued id on confirmation.
    pub async fn create_category(&self, name: &str) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::CreateCategory;
        let token = self.precheck(kind)?;
        let previous = self.snapshot();
        let category = create_new_category(&previous, name)?;
        let provisional = category.id.clone();
        let name = category.name.clone();

        let _claim = self.claim(vec![EntityKey::Category(provisional.clone())])?;
        let next = previous
            .try_insert_category(category)
            .map_err(|err| self.local_failure(kind, err))?;

        let request = CreateSubcategoryRequest {
            name: name.clone(),
            lab_id: self.lab_id.clone(),
        };
        let applied = self.toast(
            Severity::Success,
            "Category created",
            format!("\"{name}\" was created"),
        );
        let result = self
            .reconcile(
                Mutation::new(kind),
                previous,
                next,
                applied,
                "Failed to create category",
                self.remote.create_subcategory(&token, &request),
            )
            .await;
        let server_id = match result {
            Ok(created) => created.id,
            Err(EngineError::Remote(reason)) => {
                return Ok(MutationOutcome::RolledBack { reason })
            }
            Err(err) => return Err(err),
        };

        let current = self.snapshot();
        match current.try_replace_category_id(&provisional, &server_id) {
            Ok(next) => {
                self.state.send_replace(Arc::new(next));
                info!(
                    "event=category_id_swap module=engine status=ok lab_id={} provisional_id={} category_id={}",
                    self.lab_id, provisional, server_id
                );
            }
            Err(err) => warn!(
                "event=category_id_swap module=engine status=skipped lab_id={} provisional_id={} category_id={} reason=\"{}\"",
                self.lab_id, provisional, server_id, err
            ),
        }
        Ok(MutationOutcome::CategoryCreated(server_id))
    }

    /// Renames a custom category.
    pub async fn rename_category(
        &self,
        category_id: &CategoryId,
        name: &str,
    ) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::RenameCategory;
        let token = self.precheck(kind)?;
        let previous = self.snapshot();
        let category = previous.category(category_id).ok_or_else(|| {
            self.local_failure(kind, TreeError::CategoryNotFound(category_id.clone()))
        })?;
        if category.is_special() {
            return Err(self.special_category(kind, category_id));
        }
        let name = validate_category_rename(name, previous.categories(), category_id)?;
        if category.name == name {
            return Ok(MutationOutcome::Unchanged(SkipReason::SameName));
        }

        let _claim = self.claim(vec![EntityKey::Category(category_id.clone())])?;
        let next = previous
            .try_rename_category(category_id, &name)
            .map_err(|err| self.local_failure(kind, err))?;
        let request = RenameSubcategoryRequest {
            lab_id: self.lab_id.clone(),
            category_id: category_id.clone(),
            name: name.clone(),
        };
        let applied = self.toast(
            Severity::Success,
            "Category renamed",
            format!("Renamed to \"{name}\""),
        );
        let result = self
            .reconcile(
                Mutation::new(kind),
                previous,
                next,
                applied,
                "Failed to rename category",
                self.remote.rename_subcategory(&token, &request),
            )
            .await;
        swallow_remote(result.map(|()| MutationOutcome::Confirmed))
    }

    /// Deletes a custom category, moving its subjects to the default category
    /// when `redistribute` is set and deleting them otherwise.
    ///
    /// # Errors
    /// Unlike the other mutations, a failed remote step is returned as an
    /// error after the rollback.
    pub async fn delete_category(
        &self,
        category_id: &CategoryId,
        redistribute: bool,
    ) -> Result<MutationOutcome, EngineError> {
        let kind = MutationKind::DeleteCategory;
        let token = self.precheck(kind)?;
        let previous = self.snapshot();
        let category = previous.category(category_id).ok_or_else(|| {
            self.local_failure(kind, TreeError::CategoryNotFound(category_id.clone()))
        })?;
        if category.is_special() {
            return Err(self.special_category(kind, category_id));
        }
        let subject_ids: Vec<_> = category
            .subjects
            .iter()
            .map(|subject| subject.subject_id.clone())
            .collect();
        let name = category.name.clone();
        let mut keys = vec![EntityKey::Category(category_id.clone())];
        keys.extend(
            category
                .subjects
                .iter()
                .map(|subject| EntityKey::Subject(subject.id)),
        );

        let _claim = self.claim(keys)?;
        let next = previous
            .try_delete_category(category_id, redistribute)
            .map_err(|err| self.local_failure(kind, err))?;
        let request = DeleteSubcategoryRequest {
            category_id: category_id.clone(),
            subject_ids,
            lab_id: self.lab_id.clone(),
            redistribute,
        };
        let description = if redistribute {
            format!("\"{name}\" was deleted and its subjects moved to Uncategorized")
        } else {
            format!("\"{name}\" and its subjects were deleted")
        };
        let applied = self.toast(Severity::Success, "Category deleted", description);
        self.reconcile(
            Mutation::new(kind),
            previous,
            next,
            applied,
            "Failed to delete category",
            self.remote.delete_subcategory(&token, &request),
        )
        .await?;
        Ok(MutationOutcome::Confirmed)
    }

    /// Merges freshly computed metrics into the visible tree.
    ///
    /// Returns how many subjects were updated. Not an optimistic mutation:
    /// failures leave the tree untouched.
    pub async fn refresh_metrics(&self) -> Result<usize, EngineError> {
        let token = self.require_token()?;
        let records = match self.remote.fetch_subject_metrics(&token, &self.lab_id).await {
            Ok(records) => records,
            Err(err) => {
                return Err(self.report_read_failure(
                    "metrics_refresh",
                    "Failed to refresh metrics",
                    err,
                ))
            }
        };

        let current = self.snapshot();
        let (next, updated) = current.with_metrics(
            records
                .iter()
                .map(|record| (&record.subject_id, &record.metrics)),
        );
        if updated > 0 {
            self.state.send_replace(Arc::new(next));
        }
        info!(
            "event=metrics_refresh module=engine status=ok lab_id={} records={} updated={}",
            self.lab_id,
            records.len(),
            updated
        );
        Ok(updated)
    }

    /// Applies `next`, awaits `confirm`, and rolls back to `previous` on failure.
    async fn reconcile<T>(
        &self,
        mut mutation: Mutation,
        previous: Arc<LabTree>,
        next: LabTree,
        applied: Notification,
        failure_title: &str,
        confirm: impl Future<Output = RemoteResult<T>>,
    ) -> Result<T, EngineError> {
        mutation.mark_applied()?;
        self.state.send_replace(Arc::new(next));
        self.log_phase(&mutation);
        self.notifier.publish(applied);

        match confirm.await {
            Ok(value) => {
                mutation.mark_confirmed()?;
                self.log_phase(&mutation);
                Ok(value)
            }
            Err(err) => {
                self.state.send_replace(previous);
                mutation.mark_rolled_back()?;
                warn!(
                    "event=lab_mutation module=engine kind={} phase={} lab_id={} mutation_id={} reason=\"{}\"",
                    mutation.kind().as_str(),
                    mutation.phase().as_str(),
                    self.lab_id,
                    mutation.id(),
                    err
                );
                if err == RemoteError::SessionExpired {
                    self.credentials.force_logout();
                    self.notify(
                        Severity::Error,
                        "Session expired",
                        "Please sign in again. Your change has been reverted.",
                    );
                } else {
                    self.notify(
                        Severity::Error,
                        failure_title,
                        format!("{err}. Your change has been reverted."),
                    );
                }
                Err(err.into())
            }
        }
    }

    fn log_phase(&self, mutation: &Mutation) {
        info!(
            "event=lab_mutation module=engine kind={} phase={} lab_id={} mutation_id={}",
            mutation.kind().as_str(),
            mutation.phase().as_str(),
            self.lab_id,
            mutation.id()
        );
    }

    /// Role then credential check; returns the bearer token.
    fn precheck(&self, kind: MutationKind) -> Result<String, EngineError> {
        if !self.role.can_edit() {
            info!(
                "event=lab_mutation module=engine kind={} status=rejected reason=permission_denied lab_id={}",
                kind.as_str(),
                self.lab_id
            );
            self.notify(
                Severity::Error,
                "Permission denied",
                "You have read-only access to this lab",
            );
            return Err(EngineError::PermissionDenied);
        }
        self.require_token()
    }

    fn require_token(&self) -> Result<String, EngineError> {
        self.credentials.bearer_token().ok_or_else(|| {
            self.notify(
                Severity::Error,
                "Sign in required",
                "Please sign in to continue",
            );
            EngineError::AuthRequired
        })
    }

    fn claim(&self, keys: Vec<EntityKey>) -> Result<InFlightClaim<'_>, EngineError> {
        if !self.settings.reject_overlapping_mutations {
            return Ok(InFlightClaim {
                registry: &self.in_flight,
                keys: Vec::new(),
            });
        }
        let mut registry = lock(&self.in_flight);
        if keys.iter().any(|key| registry.contains(key)) {
            drop(registry);
            info!(
                "event=lab_mutation module=engine status=rejected reason=busy lab_id={}",
                self.lab_id
            );
            self.notify(
                Severity::Warning,
                "Please wait",
                "Another change to this item is still in progress",
            );
            return Err(EngineError::Busy);
        }
        registry.extend(keys.iter().cloned());
        Ok(InFlightClaim {
            registry: &self.in_flight,
            keys,
        })
    }

    fn register_undo(&self, previous: Arc<LabTree>, subject: SubjectLocalId) -> UndoToken {
        let now = Instant::now();
        let token = UndoToken::new();
        let mut pending = lock(&self.pending_undo);
        pending.retain(|_, entry| entry.expires_at >= now);
        pending.insert(
            token,
            PendingUndo {
                previous,
                subject,
                expires_at: now + self.settings.undo_window,
            },
        );
        token
    }

    fn local_failure(&self, kind: MutationKind, err: TreeError) -> EngineError {
        if err == TreeError::DefaultCategoryMissing {
            error!(
                "event=lab_mutation module=engine kind={} status=error reason=default_category_missing lab_id={}",
                kind.as_str(),
                self.lab_id
            );
        } else {
            warn!(
                "event=lab_mutation module=engine kind={} status=aborted lab_id={} reason=\"{}\"",
                kind.as_str(),
                self.lab_id,
                err
            );
        }
        err.into()
    }

    fn special_category(&self, kind: MutationKind, id: &CategoryId) -> EngineError {
        info!(
            "event=lab_mutation module=engine kind={} status=rejected reason=special_category lab_id={} category_id={}",
            kind.as_str(),
            self.lab_id,
            id
        );
        self.notify(
            Severity::Error,
            "Category cannot be changed",
            "The default category cannot be renamed or deleted",
        );
        EngineError::SpecialCategory(id.clone())
    }

    fn report_read_failure(&self, event: &str, title: &str, err: RemoteError) -> EngineError {
        warn!(
            "event={} module=engine status=error lab_id={} reason=\"{}\"",
            event, self.lab_id, err
        );
        if err == RemoteError::SessionExpired {
            self.credentials.force_logout();
            self.notify(Severity::Error, "Session expired", "Please sign in again");
        } else {
            self.notify(Severity::Error, title, err.to_string());
        }
        err.into()
    }

    fn toast(
        &self,
        severity: Severity,
        title: &str,
        description: impl Into<String>,
    ) -> Notification {
        let duration_ms = match severity {
            Severity::Error => self.settings.error_toast_ms,
            _ => self.settings.success_toast_ms,
        };
        Notification::new(severity, title, description, duration_ms)
    }

    fn notify(&self, severity: Severity, title: &str, description: impl Into<String>) {
        self.notifier
            .publish(self.toast(severity, title, description));
    }
}

/// Turns a non-auth remote failure into `RolledBack`.
fn swallow_remote(
    result: Result<MutationOutcome, EngineError>,
) -> Result<MutationOutcome, EngineError> {
    match result {
        Err(EngineError::Remote(reason)) => Ok(MutationOutcome::RolledBack { reason }),
        other => other,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
