use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Past,
    Cancelled,
}

/// Denormalized copy of a ticket type, embedded in the event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketCategory {
    pub ticket_type_id: Uuid,
    pub category: String,
    pub price: Decimal,
}

/// One seating section and the ticket type its seats are sold under.
///
/// `ticket_type_id` is `None` once the assigned ticket type has been deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAssignment {
    pub section: String,
    pub ticket_type_id: Option<Uuid>,
}

/// How a client refers to a ticket category when laying out sections.
///
/// Event creation only knows category names, later edits usually carry ids.
/// Either form is resolved against the event's ticket types before anything
/// is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryRef {
    Name(String),
    Id(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub status: EventStatus,
    pub ticket_categories: Json<Vec<TicketCategory>>,
    pub seating_layout: Json<Vec<SectionAssignment>>,
    pub promo_code_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Sections whose seats are sold under the given ticket type.
    pub fn sections_for(&self, ticket_type_id: Uuid) -> Vec<String> {
        self.seating_layout
            .iter()
            .filter(|s| s.ticket_type_id == Some(ticket_type_id))
            .map(|s| s.section.clone())
            .collect()
    }
}
