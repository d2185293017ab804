//! reqwest-backed lab service client.
//!
//! # Responsibility
//! - Serialize contract requests as JSON over HTTP with bearer auth.
//! - Classify non-success statuses into `RemoteError`.
//!
//! # Invariants
//! - Path segments are percent-encoded by `Url`, never concatenated raw.
//! - Tokens and bodies are never logged; only op name and status code.

use crate::config::LabspaceConfig;
use crate::model::tree::LabId;
use crate::remote::types::{
    AddSubjectsRequest, CreateSubcategoryRequest, CreateSubcategoryResponse,
    DeleteSubcategoryRequest, LabPayload, MoveSubjectsRequest, RemoveSubjectRequest,
    RenameSubcategoryRequest, SearchSubjectsRequest, SearchSubjectsResponse, SubjectMetricsRecord,
};
use crate::remote::{LabRemote, RemoteError, RemoteResult};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// HTTP implementation of [`LabRemote`].
#[derive(Debug, Clone)]
pub struct HttpLabRemote {
    client: Client,
    base_url: Url,
}

impl HttpLabRemote {
    /// Builds a client from validated configuration.
    pub fn new(config: &LabspaceConfig) -> RemoteResult<Self> {
        let raw = config.api_base_url.trim();
        if raw.is_empty() {
            return Err(RemoteError::Failure(
                "api base url is not configured".to_string(),
            ));
        }
        let base_url = Url::parse(raw)
            .map_err(|err| RemoteError::Failure(format!("invalid api base url `{raw}`: {err}")))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| RemoteError::Failure(format!("failed to build http client: {err}")))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Failure("api base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        request: RequestBuilder,
        token: &str,
    ) -> RemoteResult<T> {
        let response = execute(op, request.bearer_auth(token)).await?;
        response.json::<T>().await.map_err(|err| {
            warn!("event=remote_call module=remote op={op} status=decode_error");
            RemoteError::Failure(format!("invalid response from server: {err}"))
        })
    }

    async fn send_empty(
        &self,
        op: &'static str,
        request: RequestBuilder,
        token: &str,
    ) -> RemoteResult<()> {
        execute(op, request.bearer_auth(token)).await.map(|_| ())
    }
}

#[async_trait]
impl LabRemote for HttpLabRemote {
    async fn fetch_lab(&self, token: &str, lab_id: &LabId) -> RemoteResult<LabPayload> {
        let url = self.endpoint(&["labs", lab_id.as_str()])?;
        self.send_json("fetch_lab", self.client.get(url), token)
            .await
    }

    async fn search_subjects(
        &self,
        token: &str,
        request: &SearchSubjectsRequest,
    ) -> RemoteResult<SearchSubjectsResponse> {
        let url = self.endpoint(&["subjects", "search"])?;
        self.send_json("search_subjects", self.client.post(url).json(request), token)
            .await
    }

    async fn create_subcategory(
        &self,
        token: &str,
        request: &CreateSubcategoryRequest,
    ) -> RemoteResult<CreateSubcategoryResponse> {
        let url = self.endpoint(&["labs", request.lab_id.as_str(), "subcategories"])?;
        self.send_json(
            "create_subcategory",
            self.client.post(url).json(request),
            token,
        )
        .await
    }

    async fn rename_subcategory(
        &self,
        token: &str,
        request: &RenameSubcategoryRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&[
            "labs",
            request.lab_id.as_str(),
            "subcategories",
            request.category_id.as_str(),
        ])?;
        self.send_empty(
            "rename_subcategory",
            self.client.patch(url).json(request),
            token,
        )
        .await
    }

    async fn add_subjects(&self, token: &str, request: &AddSubjectsRequest) -> RemoteResult<()> {
        let url = self.endpoint(&["labs", request.lab_id.as_str(), "subjects"])?;
        self.send_empty("add_subjects", self.client.post(url).json(request), token)
            .await
    }

    async fn move_subjects(
        &self,
        token: &str,
        request: &MoveSubjectsRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&["labs", request.lab_id.as_str(), "subjects", "move"])?;
        self.send_empty("move_subjects", self.client.post(url).json(request), token)
            .await
    }

    async fn delete_subcategory(
        &self,
        token: &str,
        request: &DeleteSubcategoryRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&[
            "labs",
            request.lab_id.as_str(),
            "subcategories",
            request.category_id.as_str(),
            "delete-with-subjects",
        ])?;
        self.send_empty(
            "delete_subcategory",
            self.client.post(url).json(request),
            token,
        )
        .await
    }

    async fn remove_subject(
        &self,
        token: &str,
        request: &RemoveSubjectRequest,
    ) -> RemoteResult<()> {
        let url = self.endpoint(&[
            "labs",
            request.lab_id.as_str(),
            "subjects",
            request.subject_id.as_str(),
        ])?;
        self.send_empty("remove_subject", self.client.delete(url), token)
            .await
    }

    async fn fetch_subject_metrics(
        &self,
        token: &str,
        lab_id: &LabId,
    ) -> RemoteResult<Vec<SubjectMetricsRecord>> {
        let url = self.endpoint(&["labs", lab_id.as_str(), "subjects", "metrics"])?;
        self.send_json("fetch_subject_metrics", self.client.get(url), token)
            .await
    }
}

async fn execute(op: &'static str, request: RequestBuilder) -> RemoteResult<Response> {
    let response = request.send().await.map_err(|err| {
        warn!("event=remote_call module=remote op={op} status=transport_error");
        RemoteError::Failure(format!("network error: {err}"))
    })?;
    let status = response.status();
    debug!(
        "event=remote_call module=remote op={op} status={}",
        status.as_u16()
    );
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, body.as_str()))
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Maps a non-success status and body onto [`RemoteError`].
pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.message.or(parsed.error))
        .filter(|message| !message.trim().is_empty());
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::SessionExpired,
        StatusCode::FORBIDDEN => RemoteError::PermissionDenied(
            message.unwrap_or_else(|| "you do not have access to this lab".to_string()),
        ),
        other => RemoteError::Failure(match message {
            Some(message) => message,
            None => format!("server responded with HTTP {}", other.as_u16()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify_status, HttpLabRemote};
    use crate::config::LabspaceConfig;
    use crate::remote::RemoteError;
    use reqwest::StatusCode;

    #[test]
    fn unauthorized_maps_to_session_expired() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::SessionExpired
        );
    }

    #[test]
    fn forbidden_keeps_server_message() {
        let err = classify_status(StatusCode::FORBIDDEN, r#"{"message":"viewer role"}"#);
        assert_eq!(err, RemoteError::PermissionDenied("viewer role".to_string()));
    }

    #[test]
    fn server_error_falls_back_to_status_code() {
        let err = classify_status(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(
            err,
            RemoteError::Failure("server responded with HTTP 502".to_string())
        );
        let err = classify_status(StatusCode::CONFLICT, r#"{"error":"name taken"}"#);
        assert_eq!(err, RemoteError::Failure("name taken".to_string()));
    }

    #[test]
    fn endpoint_encodes_segments_under_base_path() {
        let config = LabspaceConfig {
            api_base_url: "https://api.example.test/v1/".to_string(),
            ..LabspaceConfig::default()
        };
        let remote = HttpLabRemote::new(&config).unwrap();
        let url = remote.endpoint(&["labs", "lab 1", "subjects"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/labs/lab%201/subjects"
        );
    }

    #[test]
    fn new_requires_base_url() {
        let err = HttpLabRemote::new(&LabspaceConfig::default()).unwrap_err();
        assert!(matches!(err, RemoteError::Failure(_)));
    }
}
