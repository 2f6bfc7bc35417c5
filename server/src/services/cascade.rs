//! Ownership graph used when deleting events and organizers.

use uuid::Uuid;

use crate::store::{CascadePlan, CascadeReport, Store, StoreResult};

/// What to delete, and therefore what goes with it.
///
/// An event takes its ticket types, seats, promo codes, bookings, tickets and
/// waitlist entries along. An organizer takes every event they own, then the
/// user record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadePolicy {
    Event(Uuid),
    Organizer(Uuid),
}

impl CascadePolicy {
    pub async fn plan(&self, store: &dyn Store) -> StoreResult<CascadePlan> {
        match *self {
            CascadePolicy::Event(event_id) => Ok(CascadePlan {
                event_ids: vec![event_id],
                user_ids: Vec::new(),
            }),
            CascadePolicy::Organizer(user_id) => Ok(CascadePlan {
                event_ids: store.event_ids_for_organizer(user_id).await?,
                user_ids: vec![user_id],
            }),
        }
    }

    /// Resolves the plan and applies it as a single store operation.
    pub async fn execute(&self, store: &dyn Store) -> StoreResult<CascadeReport> {
        let plan = self.plan(store).await?;
        let report = store.apply_cascade(&plan).await?;
        tracing::info!(policy = ?self, ?report, "Cascade applied");
        Ok(report)
    }
}
