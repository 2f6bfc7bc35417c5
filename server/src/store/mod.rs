//! Persistence boundary.
//!
//! Every collection is reached through [`Store`]. Operations that consume or
//! return capacity (seats, ticket-type counters, promo usage, waitlist state)
//! are expressed as compare-and-set primitives so two concurrent requests can
//! never both succeed against the same unit. Implementations must make each
//! primitive atomic on its own; multi-entity writes that must land together
//! (`insert_booking`, `apply_cascade`) are single calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Booking, Event, EventStatus, PaymentStatus, PromoCode, Role, Seat, SeatStatus, Ticket,
    TicketStatus, TicketType, User, WaitlistEntry, WaitlistStatus,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness rule was violated. Carries the entity name.
    #[error("duplicate {0}")]
    Duplicate(&'static str),

    /// Transient failure; the write may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub organizer_id: Option<Uuid>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct SeatFilter {
    pub event_id: Option<Uuid>,
    pub status: Option<SeatStatus>,
    pub section: Option<String>,
}

/// `event_ids: Some(vec![])` matches nothing.
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub attendee_id: Option<Uuid>,
    pub event_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub booking_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub ticket_type_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct WaitlistFilter {
    pub event_id: Option<Uuid>,
    pub attendee_key: Option<String>,
    pub status: Option<WaitlistStatus>,
}

/// A resolved set of deletions produced by a cascade policy.
///
/// Each event id removes the event together with everything it owns:
/// ticket types, seats, promo codes, bookings, tickets and waitlist entries.
/// User ids are removed after their events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadePlan {
    pub event_ids: Vec<Uuid>,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub events: u64,
    pub ticket_types: u64,
    pub seats: u64,
    pub promo_codes: u64,
    pub bookings: u64,
    pub tickets: u64,
    pub waitlist_entries: u64,
    pub users: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- users --------------------------------------------------------------
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>>;

    // -- events -------------------------------------------------------------
    async fn insert_event(&self, event: &Event) -> StoreResult<()>;
    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>>;
    /// Replaces the mutable fields of an event. `organizer_id` is never written.
    async fn update_event(&self, event: &Event) -> StoreResult<bool>;
    async fn event_ids_for_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Uuid>>;
    /// Rewrites only the embedded ticket categories from the event's ticket
    /// types, and clears `unassign` from the seating layout when given.
    async fn refresh_event_categories(&self, event_id: Uuid, unassign: Option<Uuid>)
        -> StoreResult<bool>;

    // -- ticket types -------------------------------------------------------
    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> StoreResult<()>;
    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>>;
    async fn list_ticket_types(&self, event_id: Option<Uuid>) -> StoreResult<Vec<TicketType>>;
    /// Writes category, price and cap. Returns `None` when the row is gone or
    /// the new cap is below `tickets_sold`.
    async fn update_ticket_type(&self, ticket_type: &TicketType)
        -> StoreResult<Option<TicketType>>;
    /// Deletes only when no ticket references the type.
    async fn delete_ticket_type_if_unsold(&self, id: Uuid) -> StoreResult<bool>;
    /// `tickets_sold += quantity` if the cap allows it.
    async fn try_claim_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool>;
    async fn release_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()>;

    // -- seats --------------------------------------------------------------
    /// All-or-nothing; fails with `Duplicate("seat")` if any seat number
    /// already exists for the event.
    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()>;
    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>>;
    async fn list_seats(&self, filter: &SeatFilter) -> StoreResult<Vec<Seat>>;
    async fn count_seats(&self, event_id: Uuid, status: Option<SeatStatus>) -> StoreResult<i64>;
    /// Unconditional status write. Moving to `available` clears `ticket_id`.
    async fn set_seat_status(
        &self,
        id: Uuid,
        status: SeatStatus,
        ticket_id: Option<Uuid>,
    ) -> StoreResult<Option<Seat>>;
    /// Deletes unless the seat is occupied.
    async fn delete_seat_unless_occupied(&self, id: Uuid) -> StoreResult<bool>;
    /// `available -> reserved` for one seat of the given event.
    async fn try_reserve_seat(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        ticket_id: Uuid,
    ) -> StoreResult<bool>;
    /// Reserves one available seat per ticket id, restricted to `sections`
    /// when non-empty. Reserves nothing and returns `None` if there are not
    /// enough seats.
    async fn reserve_available_seats(
        &self,
        event_id: Uuid,
        sections: &[String],
        ticket_ids: &[Uuid],
    ) -> StoreResult<Option<Vec<Seat>>>;
    /// Moves every seat held by one of `ticket_ids` to `status`.
    async fn update_seats_for_tickets(
        &self,
        ticket_ids: &[Uuid],
        status: SeatStatus,
    ) -> StoreResult<u64>;

    // -- promo codes --------------------------------------------------------
    async fn insert_promo_code(&self, promo: &PromoCode) -> StoreResult<()>;
    async fn find_promo_code(&self, event_id: Uuid, code: &str) -> StoreResult<Option<PromoCode>>;
    async fn find_promo_code_by_id(&self, id: Uuid) -> StoreResult<Option<PromoCode>>;
    async fn list_promo_codes(&self, event_id: Uuid) -> StoreResult<Vec<PromoCode>>;
    async fn delete_promo_code(&self, id: Uuid) -> StoreResult<bool>;
    /// `current_uses += 1` if under `max_uses` and not expired at `now`.
    async fn try_increment_promo_usage(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool>;
    async fn release_promo_usage(&self, id: Uuid) -> StoreResult<()>;

    // -- bookings & tickets -------------------------------------------------
    /// Inserts the booking and its tickets as one unit.
    async fn insert_booking(&self, booking: &Booking, tickets: &[Ticket]) -> StoreResult<()>;
    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;
    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>>;
    /// Moves the booking from `from` to `to`; `None` if it was not in `from`.
    async fn transition_booking(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> StoreResult<Option<Booking>>;
    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>>;
    async fn set_ticket_status_for_booking(
        &self,
        booking_id: Uuid,
        status: TicketStatus,
    ) -> StoreResult<u64>;

    // -- waitlist -----------------------------------------------------------
    /// Fails with `Duplicate("waitlist entry")` when the same attendee already
    /// has an active entry for the event. Returns the entry with its
    /// assigned position.
    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> StoreResult<WaitlistEntry>;
    /// Ordered by `joined_at`, then `position`.
    async fn list_waitlist(&self, filter: &WaitlistFilter) -> StoreResult<Vec<WaitlistEntry>>;
    async fn oldest_waiting(&self, event_id: Uuid, limit: i64) -> StoreResult<Vec<WaitlistEntry>>;
    /// Removes the attendee's active entry. With `entry_id` set, only that
    /// exact entry is removed.
    async fn delete_waitlist_entry(
        &self,
        event_id: Uuid,
        attendee_key: &str,
        entry_id: Option<Uuid>,
    ) -> StoreResult<bool>;
    /// `waiting -> notified`.
    async fn mark_waitlist_notified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;
    /// Active entries of the attendee for the event become `converted`.
    async fn mark_waitlist_converted(&self, event_id: Uuid, attendee_key: &str)
        -> StoreResult<u64>;

    // -- cascades -----------------------------------------------------------
    async fn apply_cascade(&self, plan: &CascadePlan) -> StoreResult<CascadeReport>;
}
