//! First-come-first-served waitlist with capacity-bounded batch notification.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{load_event, DomainError, WaitlistNotifier};
use crate::auth::AuthContext;
use crate::models::{Event, Role, SeatStatus, WaitlistEntry, WaitlistStatus};
use crate::store::{Store, StoreError, WaitlistFilter};
use crate::utils::error::{AppError, AppResult};

/// Who is joining or leaving: a signed-in user or a guest identified by email.
#[derive(Debug, Clone)]
pub enum WaitlistIdentity {
    User(AuthContext),
    Guest { email: String, name: Option<String> },
}

impl WaitlistIdentity {
    /// Signed-in callers win over a supplied email.
    pub fn resolve(
        auth: Option<AuthContext>,
        email: Option<String>,
        name: Option<String>,
    ) -> AppResult<Self> {
        match (auth, email) {
            (Some(ctx), _) => Ok(WaitlistIdentity::User(ctx)),
            (None, Some(email)) if !email.trim().is_empty() => {
                Ok(WaitlistIdentity::Guest { email, name })
            }
            (None, _) => Err(AppError::AuthError(
                "Sign in or provide an email to use the waitlist".into(),
            )),
        }
    }

    fn attendee_key(&self) -> String {
        match self {
            WaitlistIdentity::User(ctx) => ctx.user_id.to_string(),
            WaitlistIdentity::Guest { email, .. } => email.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinWaitlist {
    pub event_id: Uuid,
    pub ticket_type_id: Option<Uuid>,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyOutcome {
    pub notified: usize,
    /// Entries whose delivery failed; they stay `waiting` for the next batch.
    pub failed: usize,
}

pub struct WaitlistManager {
    store: Arc<dyn Store>,
    notifier: Arc<dyn WaitlistNotifier>,
    default_batch_size: i64,
}

impl WaitlistManager {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn WaitlistNotifier>,
        default_batch_size: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            default_batch_size,
        }
    }

    pub async fn join(&self, identity: WaitlistIdentity, input: JoinWaitlist) -> AppResult<WaitlistEntry> {
        let event = load_event(self.store.as_ref(), input.event_id).await?;
        if let Some(ticket_type_id) = input.ticket_type_id {
            self.store
                .find_ticket_type(ticket_type_id)
                .await?
                .filter(|t| t.event_id == event.id)
                .ok_or(DomainError::TicketTypeNotFound(ticket_type_id))?;
        }

        let attendee_key = identity.attendee_key();
        let (attendee_id, email, name) = match identity {
            WaitlistIdentity::User(ctx) => (Some(ctx.user_id), input.email, input.name),
            WaitlistIdentity::Guest { email, name } => {
                (None, Some(email.trim().to_string()), name.or(input.name))
            }
        };

        let entry = WaitlistEntry {
            id: Uuid::new_v4(),
            event_id: event.id,
            ticket_type_id: input.ticket_type_id,
            attendee_id,
            email,
            name,
            attendee_key,
            status: WaitlistStatus::Waiting,
            joined_at: Utc::now(),
            notified_at: None,
            position: 0,
        };

        let stored = match self.store.insert_waitlist_entry(&entry).await {
            Ok(stored) => stored,
            Err(StoreError::Duplicate(_)) => return Err(DomainError::AlreadyOnWaitlist.into()),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(entry_id = %stored.id, event_id = %event.id, position = stored.position, "Joined waitlist");
        Ok(stored)
    }

    /// Signed-in users leave by session. Guests must also present the entry id
    /// handed out by `join`.
    pub async fn leave(
        &self,
        identity: &WaitlistIdentity,
        event_id: Uuid,
        entry_id: Option<Uuid>,
    ) -> AppResult<()> {
        let entry_id = match identity {
            WaitlistIdentity::User(_) => None,
            WaitlistIdentity::Guest { .. } => Some(entry_id.ok_or_else(|| {
                AppError::AuthError("Guests must give the entry id returned when joining".into())
            })?),
        };
        let key = identity.attendee_key();
        if !self
            .store
            .delete_waitlist_entry(event_id, &key, entry_id)
            .await?
        {
            return Err(DomainError::WaitlistEntryNotFound.into());
        }
        tracing::info!(event_id = %event_id, "Left waitlist");
        Ok(())
    }

    /// Managers see the queue of their events; attendees see their own entries.
    pub async fn list(&self, ctx: &AuthContext, event_id: Option<Uuid>) -> AppResult<Vec<WaitlistEntry>> {
        match ctx.role {
            Role::Attendee => Ok(self
                .store
                .list_waitlist(&WaitlistFilter {
                    event_id,
                    attendee_key: Some(ctx.user_id.to_string()),
                    status: None,
                })
                .await?),
            Role::Admin => Ok(self
                .store
                .list_waitlist(&WaitlistFilter {
                    event_id,
                    ..Default::default()
                })
                .await?),
            Role::Organizer => match event_id {
                Some(event_id) => {
                    let event = load_event(self.store.as_ref(), event_id).await?;
                    ctx.require_event_manager(event.organizer_id)?;
                    Ok(self
                        .store
                        .list_waitlist(&WaitlistFilter {
                            event_id: Some(event_id),
                            ..Default::default()
                        })
                        .await?)
                }
                None => {
                    let owned: HashSet<Uuid> = self
                        .store
                        .event_ids_for_organizer(ctx.user_id)
                        .await?
                        .into_iter()
                        .collect();
                    let mut entries = self.store.list_waitlist(&WaitlistFilter::default()).await?;
                    entries.retain(|e| owned.contains(&e.event_id));
                    Ok(entries)
                }
            },
        }
    }

    /// Organizer/admin trigger for [`WaitlistManager::notify_batch`].
    pub async fn notify_batch_as(
        &self,
        ctx: &AuthContext,
        event_id: Uuid,
        batch_size: Option<i64>,
    ) -> AppResult<NotifyOutcome> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        let batch_size = batch_size.unwrap_or(self.default_batch_size);
        if batch_size < 1 {
            return Err(AppError::ValidationError("batchSize must be at least 1".into()));
        }
        self.notify_batch(&event, batch_size).await
    }

    /// Notifies up to `min(available seats, batch_size)` of the oldest waiting
    /// entries. Only successfully delivered entries move to `notified`; the
    /// rest stay `waiting` and are picked up again by the next batch.
    pub async fn notify_batch(&self, event: &Event, batch_size: i64) -> AppResult<NotifyOutcome> {
        let available = self
            .store
            .count_seats(event.id, Some(SeatStatus::Available))
            .await?;
        if available == 0 {
            return Err(DomainError::NoCapacity.into());
        }

        let limit = available.min(batch_size);
        let entries = self.store.oldest_waiting(event.id, limit).await?;

        let mut outcome = NotifyOutcome::default();
        for entry in &entries {
            match self.notifier.notify(entry, event).await {
                Ok(()) => {
                    if self.store.mark_waitlist_notified(entry.id, Utc::now()).await? {
                        outcome.notified += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(entry_id = %entry.id, event_id = %event.id, error = %e, "Waitlist notification failed");
                    outcome.failed += 1;
                }
            }
        }

        tracing::info!(
            event_id = %event.id,
            available,
            notified = outcome.notified,
            failed = outcome.failed,
            "Waitlist batch processed"
        );
        Ok(outcome)
    }

    /// Best-effort batch after capacity was freed. Never fails the caller.
    pub async fn notify_after_release(&self, event_id: Uuid) {
        let event = match self.store.find_event(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(event_id = %event_id, error = %e, "Auto-notify skipped");
                return;
            }
        };
        match self.notify_batch(&event, self.default_batch_size).await {
            Ok(_) | Err(AppError::Domain(DomainError::NoCapacity)) => {}
            Err(e) => tracing::warn!(event_id = %event_id, error = %e, "Auto-notify failed"),
        }
    }
}
