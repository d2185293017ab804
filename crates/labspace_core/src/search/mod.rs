//! Subject directory search.
//!
//! # Responsibility
//! - Query the external subject directory with a bounded limit.
//! - Shape the response into de-duplicated, exact-match-first hits.
//!
//! # Invariants
//! - No request is issued without a ready credential or for a blank keyword.
//! - A canonical id appears at most once in the merged hits.
//! - Display truncation never drops hits from the result itself.

use crate::model::subject::CanonicalSubjectId;
use crate::remote::types::{RemoteSubjectRecord, SearchSubjectsRequest, SearchSubjectsResponse};
use crate::remote::{LabRemote, RemoteError};
use crate::session::CredentialProvider;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Upper bound for one directory query.
pub const SEARCH_LIMIT_MAX: u32 = 300;
/// Hits shown before the "view more" affordance.
pub const DISPLAY_LIMIT: usize = 10;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No credential available yet.
    AuthRequired,
    /// Server rejected the credential; session was dropped.
    SessionExpired,
    PermissionDenied(String),
    Remote(RemoteError),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthRequired => write!(f, "Please sign in to search subjects"),
            Self::SessionExpired => write!(f, "Session expired. Please sign in again"),
            Self::PermissionDenied(message) => write!(f, "Permission denied: {message}"),
            Self::Remote(err) => write!(f, "search failed: {err}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RemoteError> for SearchError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::SessionExpired => Self::SessionExpired,
            RemoteError::PermissionDenied(message) => Self::PermissionDenied(message),
            other => Self::Remote(other),
        }
    }
}

/// One selectable search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSearchHit {
    pub canonical_id: CanonicalSubjectId,
    pub name: String,
    pub summary: Option<String>,
    /// Came from the directory's exact-match slot.
    pub exact: bool,
}

/// Visible slice of a hit list plus how many are folded away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPage<'a> {
    pub visible: &'a [SubjectSearchHit],
    pub hidden: usize,
}

/// Search entry point bound to one remote and credential source.
pub struct SubjectSearch<R: LabRemote + ?Sized> {
    remote: Arc<R>,
    credentials: Arc<dyn CredentialProvider>,
    limit: u32,
}

impl<R: LabRemote + ?Sized> SubjectSearch<R> {
    pub fn new(remote: Arc<R>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            remote,
            credentials,
            limit: SEARCH_LIMIT_MAX,
        }
    }

    /// Overrides the query ceiling; clamped into `1..=SEARCH_LIMIT_MAX`.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.clamp(1, SEARCH_LIMIT_MAX);
        self
    }

    /// Runs a directory query for `keyword`.
    ///
    /// # Errors
    /// - `AuthRequired` when no credential is available.
    /// - `SessionExpired` after a 401; the session is logged out.
    /// - `PermissionDenied` / `Remote` for other failures.
    pub async fn search(&self, keyword: &str) -> SearchResult<Vec<SubjectSearchHit>> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(SearchError::AuthRequired)?;
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Ok(Vec::new());
        }

        let request = SearchSubjectsRequest {
            keyword: keyword.to_string(),
            limit: self.limit,
        };
        let response = match self.remote.search_subjects(&token, &request).await {
            Ok(response) => response,
            Err(RemoteError::SessionExpired) => {
                self.credentials.force_logout();
                warn!("event=subject_search module=search status=session_expired");
                return Err(SearchError::SessionExpired);
            }
            Err(err) => {
                warn!(
                    "event=subject_search module=search status=error reason=\"{}\"",
                    err
                );
                return Err(err.into());
            }
        };

        let hits = merge_search_response(response);
        info!(
            "event=subject_search module=search status=ok hits={} limit={}",
            hits.len(),
            self.limit
        );
        Ok(hits)
    }
}

/// Shapes a directory response into hits.
///
/// The exact match, when present, comes first; rows sharing its canonical
/// id (or repeating an earlier row) are dropped. Records whose id cannot be
/// normalized are skipped.
pub fn merge_search_response(response: SearchSubjectsResponse) -> Vec<SubjectSearchHit> {
    let mut seen = HashSet::new();
    let mut hits = Vec::with_capacity(response.rows.len() + 1);
    let exact = response.exact_match.map(|record| (record, true));
    let rows = response.rows.into_iter().map(|record| (record, false));
    for (record, is_exact) in exact.into_iter().chain(rows) {
        let Some(hit) = to_hit(record, is_exact) else {
            continue;
        };
        if seen.insert(hit.canonical_id.clone()) {
            hits.push(hit);
        }
    }
    hits
}

/// Splits hits into the displayed slice and the folded remainder.
pub fn display_page(hits: &[SubjectSearchHit], expanded: bool) -> DisplayPage<'_> {
    display_page_with_limit(hits, expanded, DISPLAY_LIMIT)
}

/// [`display_page`] with a configured fold point.
pub fn display_page_with_limit(
    hits: &[SubjectSearchHit],
    expanded: bool,
    limit: usize,
) -> DisplayPage<'_> {
    if expanded || hits.len() <= limit {
        return DisplayPage {
            visible: hits,
            hidden: 0,
        };
    }
    DisplayPage {
        visible: &hits[..limit],
        hidden: hits.len() - limit,
    }
}

fn to_hit(record: RemoteSubjectRecord, exact: bool) -> Option<SubjectSearchHit> {
    // canonicalFsid wins over the raw id when the directory provides both.
    let raw = record
        .canonical_fsid
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| record.id.as_str());
    match CanonicalSubjectId::parse(raw) {
        Ok(canonical_id) => Some(SubjectSearchHit {
            canonical_id,
            name: record.name,
            summary: record.summary,
            exact,
        }),
        Err(err) => {
            warn!(
                "event=subject_search module=search status=skipped_record reason=\"{}\"",
                err
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{display_page, merge_search_response, SubjectSearchHit, DISPLAY_LIMIT};
    use crate::model::subject::CanonicalSubjectId;
    use crate::remote::types::SearchSubjectsResponse;

    fn hit(slug: &str) -> SubjectSearchHit {
        SubjectSearchHit {
            canonical_id: CanonicalSubjectId::parse(slug).unwrap(),
            name: slug.to_string(),
            summary: None,
            exact: false,
        }
    }

    #[test]
    fn nested_and_plain_ids_normalize_to_same_hit() {
        let response: SearchSubjectsResponse = serde_json::from_str(
            r#"{
                "exactMatch": {"id": {"fsid": "abc"}, "name": "Abc"},
                "rows": [{"id": "fsid_abc", "name": "Abc again"}, {"id": "def", "name": "Def"}]
            }"#,
        )
        .unwrap();
        let hits = merge_search_response(response);
        let ids: Vec<_> = hits.iter().map(|hit| hit.canonical_id.as_str()).collect();
        assert_eq!(ids, vec!["fsid_abc", "fsid_def"]);
        assert!(hits[0].exact);
    }

    #[test]
    fn invalid_record_ids_are_skipped() {
        let response: SearchSubjectsResponse = serde_json::from_str(
            r#"{"rows": [{"id": "   ", "name": "Blank"}, {"id": "ok", "name": "Ok"}]}"#,
        )
        .unwrap();
        assert_eq!(merge_search_response(response).len(), 1);
    }

    #[test]
    fn display_page_folds_after_limit() {
        let hits: Vec<_> = (0..13).map(|index| hit(&format!("s{index}"))).collect();
        let page = display_page(&hits, false);
        assert_eq!(page.visible.len(), DISPLAY_LIMIT);
        assert_eq!(page.hidden, 3);
        let expanded = display_page(&hits, true);
        assert_eq!(expanded.visible.len(), 13);
        assert_eq!(expanded.hidden, 0);
    }
}
