//! Per-mutation lifecycle tracking.
//!
//! # Invariants
//! - Phases advance `Idle -> OptimisticallyApplied -> {Confirmed | RolledBack}`.
//! - `Confirmed` and `RolledBack` are terminal.

use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Kind of user-initiated lab mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    AddSubject,
    RemoveSubject,
    MoveSubject,
    CreateCategory,
    RenameCategory,
    DeleteCategory,
}

impl MutationKind {
    /// Stable name used in log events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddSubject => "add_subject",
            Self::RemoveSubject => "remove_subject",
            Self::MoveSubject => "move_subject",
            Self::CreateCategory => "create_category",
            Self::RenameCategory => "rename_category",
            Self::DeleteCategory => "delete_category",
        }
    }
}

/// Lifecycle phase of one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    OptimisticallyApplied,
    Confirmed,
    RolledBack,
}

impl MutationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::OptimisticallyApplied => "optimistic",
            Self::Confirmed => "confirmed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::RolledBack)
    }
}

/// Illegal phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MutationPhase,
    pub to: MutationPhase,
}

impl Display for InvalidTransition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid mutation transition: {} -> {}",
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

impl Error for InvalidTransition {}

/// One in-progress mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    id: Uuid,
    kind: MutationKind,
    phase: MutationPhase,
}

impl Mutation {
    pub fn new(kind: MutationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            phase: MutationPhase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    pub fn mark_applied(&mut self) -> Result<(), InvalidTransition> {
        self.advance(MutationPhase::Idle, MutationPhase::OptimisticallyApplied)
    }

    pub fn mark_confirmed(&mut self) -> Result<(), InvalidTransition> {
        self.advance(
            MutationPhase::OptimisticallyApplied,
            MutationPhase::Confirmed,
        )
    }

    pub fn mark_rolled_back(&mut self) -> Result<(), InvalidTransition> {
        self.advance(
            MutationPhase::OptimisticallyApplied,
            MutationPhase::RolledBack,
        )
    }

    fn advance(
        &mut self,
        expected: MutationPhase,
        next: MutationPhase,
    ) -> Result<(), InvalidTransition> {
        if self.phase != expected {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Mutation, MutationKind, MutationPhase};

    #[test]
    fn happy_path_reaches_confirmed() {
        let mut mutation = Mutation::new(MutationKind::MoveSubject);
        mutation.mark_applied().unwrap();
        mutation.mark_confirmed().unwrap();
        assert_eq!(mutation.phase(), MutationPhase::Confirmed);
        assert!(mutation.phase().is_terminal());
    }

    #[test]
    fn terminal_phase_cannot_change() {
        let mut mutation = Mutation::new(MutationKind::AddSubject);
        mutation.mark_applied().unwrap();
        mutation.mark_rolled_back().unwrap();
        let err = mutation.mark_confirmed().unwrap_err();
        assert_eq!(err.from, MutationPhase::RolledBack);
        assert_eq!(err.to, MutationPhase::Confirmed);
    }

    #[test]
    fn cannot_confirm_before_apply() {
        let mut mutation = Mutation::new(MutationKind::CreateCategory);
        assert!(mutation.mark_confirmed().is_err());
        assert_eq!(mutation.phase(), MutationPhase::Idle);
    }
}
