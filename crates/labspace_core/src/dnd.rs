//! Drag-and-drop gesture adapter.
//!
//! # Responsibility
//! - Turn a finished drag gesture into at most one move intent.
//! - Resolve nested drop zones with shallow hit-testing.
//!
//! # Invariants
//! - Hit lists are ordered innermost zone first; the first accepting zone
//!   wins and outer zones never see the drop.
//! - No intent is emitted when source and destination are the same.

use crate::model::category::CategoryId;
use crate::model::subject::SubjectLocalId;
use log::debug;

/// Subject being dragged and where it was picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragPayload {
    pub subject: SubjectLocalId,
    pub source: CategoryId,
}

/// Drop zone under the pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropTarget {
    pub category_id: CategoryId,
    /// Zone is willing to take the payload.
    pub accepts: bool,
}

impl DropTarget {
    pub fn accepting(category_id: CategoryId) -> Self {
        Self {
            category_id,
            accepts: true,
        }
    }

    pub fn rejecting(category_id: CategoryId) -> Self {
        Self {
            category_id,
            accepts: false,
        }
    }
}

/// Move request handed to `LabEngine::dispatch_move`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveIntent {
    pub subject: SubjectLocalId,
    pub from: CategoryId,
    pub to: CategoryId,
}

/// Picks the zone that takes the drop, innermost first.
pub fn accepting_target(hits: &[DropTarget]) -> Option<&DropTarget> {
    hits.iter().find(|target| target.accepts)
}

/// Resolves a drop into a move intent.
///
/// Returns `None` when no zone accepts or the accepting zone is the source.
pub fn resolve_drop(payload: &DragPayload, hits: &[DropTarget]) -> Option<MoveIntent> {
    let target = accepting_target(hits)?;
    if target.category_id == payload.source {
        return None;
    }
    Some(MoveIntent {
        subject: payload.subject,
        from: payload.source.clone(),
        to: target.category_id.clone(),
    })
}

/// Stateful drag session for one pointer.
#[derive(Debug, Default)]
pub struct DragTracker {
    active: Option<DragPayload>,
    hovered: Option<CategoryId>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a drag; an unfinished previous drag is discarded.
    pub fn begin(&mut self, subject: SubjectLocalId, source: CategoryId) {
        if self.active.is_some() {
            debug!("event=drag_begin module=dnd status=replaced_unfinished_drag");
        }
        self.active = Some(DragPayload { subject, source });
        self.hovered = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.active.is_some()
    }

    pub fn payload(&self) -> Option<&DragPayload> {
        self.active.as_ref()
    }

    /// Zone currently highlighted as the drop destination.
    pub fn hovered(&self) -> Option<&CategoryId> {
        self.hovered.as_ref()
    }

    /// Updates the highlighted zone; returns it.
    pub fn hover(&mut self, hits: &[DropTarget]) -> Option<&CategoryId> {
        self.hovered = match self.active {
            Some(_) => accepting_target(hits).map(|target| target.category_id.clone()),
            None => None,
        };
        self.hovered.as_ref()
    }

    /// Finishes the drag and returns the move to dispatch, if any.
    pub fn drop_on(&mut self, hits: &[DropTarget]) -> Option<MoveIntent> {
        self.hovered = None;
        let payload = self.active.take()?;
        let intent = resolve_drop(&payload, hits);
        debug!(
            "event=drag_drop module=dnd status={} subject_id={}",
            if intent.is_some() { "accepted" } else { "ignored" },
            payload.subject
        );
        intent
    }

    /// Abandons the drag without emitting anything.
    pub fn cancel(&mut self) {
        self.active = None;
        self.hovered = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_drop, DragPayload, DropTarget};
    use crate::model::category::CategoryId;
    use uuid::Uuid;

    #[test]
    fn inner_rejection_falls_through_to_outer_zone() {
        let payload = DragPayload {
            subject: Uuid::now_v7(),
            source: CategoryId::new("a"),
        };
        let hits = [
            DropTarget::rejecting(CategoryId::new("inner")),
            DropTarget::accepting(CategoryId::new("outer")),
        ];
        let intent = resolve_drop(&payload, &hits).unwrap();
        assert_eq!(intent.to, CategoryId::new("outer"));
    }

    #[test]
    fn no_accepting_zone_means_no_intent() {
        let payload = DragPayload {
            subject: Uuid::now_v7(),
            source: CategoryId::new("a"),
        };
        assert!(resolve_drop(&payload, &[DropTarget::rejecting(CategoryId::new("b"))]).is_none());
        assert!(resolve_drop(&payload, &[]).is_none());
    }
}
