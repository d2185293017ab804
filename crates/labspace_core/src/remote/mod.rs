//! Remote lab service contract and implementations.
//!
//! # Responsibility
//! - Define the request/response contract the engine confirms mutations with.
//! - Map transport outcomes onto a small error taxonomy.
//!
//! # Invariants
//! - Every call carries the bearer credential supplied by the caller.
//! - `SessionExpired` is reserved for 401-equivalent responses and
//!   `PermissionDenied` for 403-equivalent ones.
//!
//! # See also
//! - `http` for the reqwest-backed client, `memory` for the in-process one.

pub mod http;
pub mod memory;
pub mod types;

use crate::model::tree::LabId;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};
use types::{
    AddSubjectsRequest, CreateSubcategoryRequest, CreateSubcategoryResponse,
    DeleteSubcategoryRequest, LabPayload, MoveSubjectsRequest, RemoveSubjectRequest,
    RenameSubcategoryRequest, SearchSubjectsRequest, SearchSubjectsResponse, SubjectMetricsRecord,
};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Remote call failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Credential rejected; caller must log out.
    SessionExpired,
    /// Authenticated but not allowed.
    PermissionDenied(String),
    /// Network or server failure.
    Failure(String),
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionExpired => write!(f, "Session expired. Please sign in again"),
            Self::PermissionDenied(message) => write!(f, "Permission denied: {message}"),
            Self::Failure(message) => write!(f, "{message}"),
        }
    }
}

impl Error for RemoteError {}

/// Lab service operations consumed by the engine and the search subsystem.
#[async_trait]
pub trait LabRemote: Send + Sync {
    /// Loads all categories and subjects of a lab.
    async fn fetch_lab(&self, token: &str, lab_id: &LabId) -> RemoteResult<LabPayload>;
    /// Queries the external subject directory.
    async fn search_subjects(
        &self,
        token: &str,
        request: &SearchSubjectsRequest,
    ) -> RemoteResult<SearchSubjectsResponse>;
    /// Creates a subcategory and returns its server-issued id.
    async fn create_subcategory(
        &self,
        token: &str,
        request: &CreateSubcategoryRequest,
    ) -> RemoteResult<CreateSubcategoryResponse>;
    async fn rename_subcategory(
        &self,
        token: &str,
        request: &RenameSubcategoryRequest,
    ) -> RemoteResult<()>;
    async fn add_subjects(&self, token: &str, request: &AddSubjectsRequest) -> RemoteResult<()>;
    async fn move_subjects(&self, token: &str, request: &MoveSubjectsRequest)
        -> RemoteResult<()>;
    /// Deletes a subcategory and reassigns or deletes its subjects in one call.
    async fn delete_subcategory(
        &self,
        token: &str,
        request: &DeleteSubcategoryRequest,
    ) -> RemoteResult<()>;
    async fn remove_subject(&self, token: &str, request: &RemoveSubjectRequest)
        -> RemoteResult<()>;
    /// Returns metrics computed so far for the lab's subjects.
    async fn fetch_subject_metrics(
        &self,
        token: &str,
        lab_id: &LabId,
    ) -> RemoteResult<Vec<SubjectMetricsRecord>>;
}
