use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "waitlist_status", rename_all = "lowercase")]
pub enum WaitlistStatus {
    Waiting,
    Notified,
    Converted,
}

impl WaitlistStatus {
    /// Waiting and notified entries block a second join for the same person.
    pub fn is_active(&self) -> bool {
        matches!(self, WaitlistStatus::Waiting | WaitlistStatus::Notified)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistEntry {
    pub id: Uuid,
    pub event_id: Uuid,
    pub ticket_type_id: Option<Uuid>,
    pub attendee_id: Option<Uuid>,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Identity used for duplicate detection: the user id, or the lowercased
    /// email for guests.
    pub attendee_key: String,
    pub status: WaitlistStatus,
    pub joined_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
    /// Insertion sequence, breaks `joined_at` ties.
    pub position: i64,
}
