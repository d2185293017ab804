//! Session credential and lab role contracts.
//!
//! # Responsibility
//! - Abstract the opaque bearer credential consumed by remote calls.
//! - Define lab roles and the read-only gate for viewers.
//!
//! # Invariants
//! - Credentials are never logged.
//! - `force_logout` clears the credential so later calls report auth required.

use std::sync::{PoisonError, RwLock};

/// Caller role inside one lab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabRole {
    Owner,
    Editor,
    /// Read-only.
    Viewer,
}

impl LabRole {
    /// Parses a role name; unknown values fall back to `Viewer`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" | "admin" => Self::Owner,
            "editor" | "member" => Self::Editor,
            _ => Self::Viewer,
        }
    }

    pub fn can_edit(self) -> bool {
        !matches!(self, Self::Viewer)
    }
}

/// Source of the bearer credential, injected into engine and search.
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, or `None` when the session is not ready.
    fn bearer_token(&self) -> Option<String>;

    /// Acting user id recorded on added subjects.
    fn user_id(&self) -> Option<String> {
        None
    }

    /// Drops the session after the server reported it expired.
    fn force_logout(&self);
}

/// In-process session holding one bearer token.
#[derive(Debug, Default)]
pub struct SessionCredentials {
    token: RwLock<Option<String>>,
    user_id: Option<String>,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Session with no credential yet.
    pub fn logged_out() -> Self {
        Self::default()
    }

    pub fn is_logged_in(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }
}

impl CredentialProvider for SessionCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|token| !token.trim().is_empty())
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn force_logout(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialProvider, LabRole, SessionCredentials};

    #[test]
    fn viewer_is_read_only() {
        assert!(!LabRole::Viewer.can_edit());
        assert!(LabRole::Editor.can_edit());
        assert_eq!(LabRole::parse("ADMIN"), LabRole::Owner);
        assert_eq!(LabRole::parse("guest"), LabRole::Viewer);
    }

    #[test]
    fn force_logout_clears_token() {
        let session = SessionCredentials::new("t-1");
        assert_eq!(session.bearer_token().as_deref(), Some("t-1"));
        session.force_logout();
        assert!(session.bearer_token().is_none());
        assert!(!session.is_logged_in());
    }

    #[test]
    fn blank_token_is_not_ready() {
        let session = SessionCredentials::new("   ");
        assert!(session.bearer_token().is_none());
    }
}
