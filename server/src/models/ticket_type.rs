use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::event::TicketCategory;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketType {
    pub id: Uuid,
    pub event_id: Uuid,
    pub category: String,
    pub price: Decimal,
    pub max_tickets_per_category: Option<i32>,
    /// Non-cancelled tickets issued under this type. Only moved by the
    /// store's atomic claim/release primitives.
    pub tickets_sold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketType {
    /// Remaining capacity, or `None` when the category is unlimited.
    pub fn remaining(&self) -> Option<i64> {
        self.max_tickets_per_category
            .map(|max| (i64::from(max) - i64::from(self.tickets_sold)).max(0))
    }
}

impl From<&TicketType> for TicketCategory {
    fn from(ticket_type: &TicketType) -> Self {
        TicketCategory {
            ticket_type_id: ticket_type.id,
            category: ticket_type.category.clone(),
            price: ticket_type.price,
        }
    }
}
