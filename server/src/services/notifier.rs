//! Delivery of "seats are available" messages to waitlisted attendees.
//!
//! Email transport lives outside this service; [`LogNotifier`] records the
//! message so an outbound relay can pick it up from the logs.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Event, WaitlistEntry};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no reachable address for waitlist entry {0}")]
    NoRecipient(uuid::Uuid),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait WaitlistNotifier: Send + Sync {
    async fn notify(&self, entry: &WaitlistEntry, event: &Event) -> Result<(), NotifyError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl WaitlistNotifier for LogNotifier {
    async fn notify(&self, entry: &WaitlistEntry, event: &Event) -> Result<(), NotifyError> {
        let recipient = entry
            .email
            .clone()
            .or_else(|| entry.attendee_id.map(|id| id.to_string()))
            .ok_or(NotifyError::NoRecipient(entry.id))?;

        tracing::info!(
            entry_id = %entry.id,
            event_id = %event.id,
            event_name = %event.name,
            recipient = %recipient,
            "Waitlist notification: seats are available"
        );
        Ok(())
    }
}
