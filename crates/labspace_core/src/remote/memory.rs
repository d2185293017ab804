//! In-process lab service.
//!
//! # Responsibility
//! - Implement [`LabRemote`] over an in-memory server model for tests,
//!   demos and offline development.
//! - Record every call and allow failures and in-flight holds to be scripted.
//!
//! # Invariants
//! - A scripted failure is consumed by exactly one call of its operation.
//! - Failed calls leave the server model untouched.
//! - No lock is held across an await point.

use crate::model::category::{CategoryId, CategoryKind, DEFAULT_CATEGORY_NAME};
use crate::model::subject::{now_epoch_ms, CanonicalSubjectId, SubjectMetrics};
use crate::model::tree::LabId;
use crate::remote::types::{
    AddSubjectsRequest, CreateSubcategoryRequest, CreateSubcategoryResponse,
    DeleteSubcategoryRequest, LabPayload, MoveSubjectsRequest, RemoteCategory, RemoteLabSubject,
    RemoveSubjectRequest, RenameSubcategoryRequest, SearchSubjectsRequest, SearchSubjectsResponse,
    SubjectMetricsRecord,
};
use crate::remote::{LabRemote, RemoteError, RemoteResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};

/// Server-side id of the default category in a fresh in-memory lab.
pub const MEMORY_DEFAULT_CATEGORY_ID: &str = "cat-default";

/// Remote operation discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchLab,
    SearchSubjects,
    CreateSubcategory,
    RenameSubcategory,
    AddSubjects,
    MoveSubjects,
    DeleteSubcategory,
    RemoveSubject,
    FetchSubjectMetrics,
}

/// One recorded call with its request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    FetchLab(LabId),
    SearchSubjects(SearchSubjectsRequest),
    CreateSubcategory(CreateSubcategoryRequest),
    RenameSubcategory(RenameSubcategoryRequest),
    AddSubjects(AddSubjectsRequest),
    MoveSubjects(MoveSubjectsRequest),
    DeleteSubcategory(DeleteSubcategoryRequest),
    RemoveSubject(RemoveSubjectRequest),
    FetchSubjectMetrics(LabId),
}

impl RemoteCall {
    pub fn op(&self) -> RemoteOp {
        match self {
            Self::FetchLab(_) => RemoteOp::FetchLab,
            Self::SearchSubjects(_) => RemoteOp::SearchSubjects,
            Self::CreateSubcategory(_) => RemoteOp::CreateSubcategory,
            Self::RenameSubcategory(_) => RemoteOp::RenameSubcategory,
            Self::AddSubjects(_) => RemoteOp::AddSubjects,
            Self::MoveSubjects(_) => RemoteOp::MoveSubjects,
            Self::DeleteSubcategory(_) => RemoteOp::DeleteSubcategory,
            Self::RemoveSubject(_) => RemoteOp::RemoveSubject,
            Self::FetchSubjectMetrics(_) => RemoteOp::FetchSubjectMetrics,
        }
    }
}

struct ServerModel {
    lab: LabPayload,
    directory: SearchSubjectsResponse,
    metrics: Vec<SubjectMetricsRecord>,
    next_category_seq: u64,
}

/// In-memory [`LabRemote`] implementation.
pub struct InMemoryLabRemote {
    model: Mutex<ServerModel>,
    calls: Mutex<Vec<RemoteCall>>,
    failures: Mutex<HashMap<RemoteOp, VecDeque<RemoteError>>>,
    gates: Mutex<HashMap<RemoteOp, Arc<Semaphore>>>,
    accepted_token: Mutex<Option<String>>,
    call_notify: Notify,
}

impl InMemoryLabRemote {
    /// Lab with a single server-side default category.
    pub fn new(lab_id: LabId) -> Self {
        Self::with_lab(LabPayload {
            lab_id,
            categories: vec![RemoteCategory {
                id: CategoryId::new(MEMORY_DEFAULT_CATEGORY_ID),
                name: DEFAULT_CATEGORY_NAME.to_string(),
                kind: CategoryKind::Default.as_wire().to_string(),
                subjects: Vec::new(),
            }],
        })
    }

    pub fn with_lab(lab: LabPayload) -> Self {
        Self {
            model: Mutex::new(ServerModel {
                lab,
                directory: SearchSubjectsResponse::default(),
                metrics: Vec::new(),
                next_category_seq: 1,
            }),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            accepted_token: Mutex::new(None),
            call_notify: Notify::new(),
        }
    }

    /// Sets what the subject directory answers to every search.
    pub fn set_directory(&self, response: SearchSubjectsResponse) {
        lock(&self.model).directory = response;
    }

    pub fn set_metrics(&self, metrics: Vec<SubjectMetricsRecord>) {
        lock(&self.model).metrics = metrics;
    }

    /// Only `token` is accepted afterwards; anything else is a 401.
    pub fn require_token(&self, token: impl Into<String>) {
        *lock(&self.accepted_token) = Some(token.into());
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        lock(&self.failures).entry(op).or_default().push_back(error);
    }

    /// Holds every later call of `op` until the returned gate gets permits.
    pub fn hold(&self, op: RemoteOp) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        lock(&self.gates).insert(op, Arc::clone(&gate));
        gate
    }

    /// Stops holding calls of `op`; waiting calls proceed.
    pub fn release(&self, op: RemoteOp) {
        if let Some(gate) = lock(&self.gates).remove(&op) {
            gate.close();
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op() == op)
            .count()
    }

    /// Count of calls that mutate lab state.
    pub fn mutation_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| {
                !matches!(
                    call.op(),
                    RemoteOp::FetchLab | RemoteOp::SearchSubjects | RemoteOp::FetchSubjectMetrics
                )
            })
            .count()
    }

    /// Resolves once at least `count` calls of `op` have been received.
    pub async fn wait_for_calls(&self, op: RemoteOp, count: usize) {
        loop {
            let notified = self.call_notify.notified();
            if self.call_count(op) >= count {
                return;
            }
            notified.await;
        }
    }

    /// Copy of the server-side lab model.
    pub fn server_lab(&self) -> LabPayload {
        lock(&self.model).lab.clone()
    }

    /// Server category currently holding `subject_id`.
    pub fn server_category_of(&self, subject_id: &CanonicalSubjectId) -> Option<CategoryId> {
        lock(&self.model)
            .lab
            .categories
            .iter()
            .find(|category| {
                category
                    .subjects
                    .iter()
                    .any(|subject| subject.subject_id == subject_id.as_str())
            })
            .map(|category| category.id.clone())
    }

    async fn enter(&self, token: &str, call: RemoteCall) -> RemoteResult<()> {
        let op = call.op();
        lock(&self.calls).push(call);
        self.call_notify.notify_waiters();

        let gate = lock(&self.gates).get(&op).cloned();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(accepted) = lock(&self.accepted_token).as_deref() {
            if accepted != token {
                return Err(RemoteError::SessionExpired);
            }
        }
        match lock(&self.failures).get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LabRemote for InMemoryLabRemote {
    async fn fetch_lab(&self, token: &str, lab_id: &LabId) -> RemoteResult<LabPayload> {
        self.enter(token, RemoteCall::FetchLab(lab_id.clone()))
            .await?;
        let model = lock(&self.model);
        ensure_lab(&model, lab_id)?;
        Ok(model.lab.clone())
    }

    async fn search_subjects(
        &self,
        token: &str,
        request: &SearchSubjectsRequest,
    ) -> RemoteResult<SearchSubjectsResponse> {
        self.enter(token, RemoteCall::SearchSubjects(request.clone()))
            .await?;
        let mut response = lock(&self.model).directory.clone();
        response.rows.truncate(request.limit as usize);
        Ok(response)
    }

    async fn create_subcategory(
        &self,
        token: &str,
        request: &CreateSubcategoryRequest,
    ) -> RemoteResult<CreateSubcategoryResponse> {
        self.enter(token, RemoteCall::CreateSubcategory(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        let id = CategoryId::new(format!("cat-{}", model.next_category_seq));
        model.next_category_seq += 1;
        model.lab.categories.push(RemoteCategory {
            id: id.clone(),
            name: request.name.clone(),
            kind: CategoryKind::Custom.as_wire().to_string(),
            subjects: Vec::new(),
        });
        Ok(CreateSubcategoryResponse { id })
    }

    async fn rename_subcategory(
        &self,
        token: &str,
        request: &RenameSubcategoryRequest,
    ) -> RemoteResult<()> {
        self.enter(token, RemoteCall::RenameSubcategory(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        let category = server_category_mut(&mut model, &request.category_id)?;
        category.name = request.name.clone();
        Ok(())
    }

    async fn add_subjects(&self, token: &str, request: &AddSubjectsRequest) -> RemoteResult<()> {
        self.enter(token, RemoteCall::AddSubjects(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        let default = model
            .lab
            .categories
            .iter_mut()
            .find(|category| CategoryKind::from_wire(&category.kind) == CategoryKind::Default)
            .ok_or_else(|| RemoteError::Failure("lab has no default subcategory".to_string()))?;
        for subject_id in &request.subject_ids {
            default.subjects.push(RemoteLabSubject {
                subject_id: subject_id.as_str().to_string(),
                subject_name: subject_id.slug().to_string(),
                notes: None,
                added_at: now_epoch_ms(),
                added_by_id: None,
            });
        }
        Ok(())
    }

    async fn move_subjects(
        &self,
        token: &str,
        request: &MoveSubjectsRequest,
    ) -> RemoteResult<()> {
        self.enter(token, RemoteCall::MoveSubjects(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        let from = server_category_index(&model, &request.from_category_id)?;
        let to = server_category_index(&model, &request.to_category_id)?;
        if from == to {
            return Ok(());
        }
        let categories = &mut model.lab.categories;
        let (moving, staying): (Vec<_>, Vec<_>) = std::mem::take(&mut categories[from].subjects)
            .into_iter()
            .partition(|subject| {
                request
                    .subject_ids
                    .iter()
                    .any(|id| id.as_str() == subject.subject_id)
            });
        categories[from].subjects = staying;
        categories[to].subjects.extend(moving);
        Ok(())
    }

    async fn delete_subcategory(
        &self,
        token: &str,
        request: &DeleteSubcategoryRequest,
    ) -> RemoteResult<()> {
        self.enter(token, RemoteCall::DeleteSubcategory(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        let index = server_category_index(&model, &request.category_id)?;
        let removed = model.lab.categories.remove(index);
        if request.redistribute {
            if let Some(default) = model
                .lab
                .categories
                .iter_mut()
                .find(|category| CategoryKind::from_wire(&category.kind) == CategoryKind::Default)
            {
                default.subjects.extend(removed.subjects);
            }
        }
        Ok(())
    }

    async fn remove_subject(
        &self,
        token: &str,
        request: &RemoveSubjectRequest,
    ) -> RemoteResult<()> {
        self.enter(token, RemoteCall::RemoveSubject(request.clone()))
            .await?;
        let mut model = lock(&self.model);
        ensure_lab(&model, &request.lab_id)?;
        for category in model.lab.categories.iter_mut() {
            category
                .subjects
                .retain(|subject| subject.subject_id != request.subject_id.as_str());
        }
        Ok(())
    }

    async fn fetch_subject_metrics(
        &self,
        token: &str,
        lab_id: &LabId,
    ) -> RemoteResult<Vec<SubjectMetricsRecord>> {
        self.enter(token, RemoteCall::FetchSubjectMetrics(lab_id.clone()))
            .await?;
        let model = lock(&self.model);
        ensure_lab(&model, lab_id)?;
        Ok(model.metrics.clone())
    }
}

/// Builds a metrics record; handy for seeding the in-memory service.
pub fn metrics_record(
    subject_id: CanonicalSubjectId,
    horizon_rank: Option<f64>,
    tech_transfer: Option<f64>,
    white_space: Option<f64>,
) -> SubjectMetricsRecord {
    SubjectMetricsRecord {
        subject_id,
        metrics: SubjectMetrics {
            horizon_rank,
            tech_transfer,
            white_space,
        },
    }
}

fn ensure_lab(model: &ServerModel, lab_id: &LabId) -> RemoteResult<()> {
    if &model.lab.lab_id != lab_id {
        return Err(RemoteError::Failure(format!("lab not found: {lab_id}")));
    }
    Ok(())
}

fn server_category_index(model: &ServerModel, id: &CategoryId) -> RemoteResult<usize> {
    model
        .lab
        .categories
        .iter()
        .position(|category| &category.id == id)
        .ok_or_else(|| RemoteError::Failure(format!("subcategory not found: {id}")))
}

fn server_category_mut<'a>(
    model: &'a mut ServerModel,
    id: &CategoryId,
) -> RemoteResult<&'a mut RemoteCategory> {
    model
        .lab
        .categories
        .iter_mut()
        .find(|category| &category.id == id)
        .ok_or_else(|| RemoteError::Failure(format!("subcategory not found: {id}")))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
