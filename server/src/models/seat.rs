use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "seat_status", rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Reserved,
    Occupied,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: Uuid,
    pub event_id: Uuid,
    pub seat_number: String,
    pub section: String,
    pub status: SeatStatus,
    pub ticket_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
