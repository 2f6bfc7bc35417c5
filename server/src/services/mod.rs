//! Core rules: seat and ticket-type inventory, promo codes, the booking
//! orchestrator, the waitlist, and the event/organizer management built on
//! top of them. Every operation takes the caller's [`AuthContext`]
//! explicitly.
//!
//! [`AuthContext`]: crate::auth::AuthContext

use std::sync::Arc;

use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Event, PaymentStatus};
use crate::store::Store;
use crate::utils::error::{AppError, AppResult};

pub mod booking;
pub mod cascade;
pub mod events;
pub mod inventory;
pub mod notifier;
pub mod organizers;
pub mod promo;
pub mod retry;
pub mod waitlist;

pub use booking::BookingOrchestrator;
pub use cascade::CascadePolicy;
pub use events::EventService;
pub use inventory::Inventory;
pub use notifier::{LogNotifier, NotifyError, WaitlistNotifier};
pub use organizers::OrganizerService;
pub use promo::PromoValidator;
pub use waitlist::WaitlistManager;

/// Rule violations raised by the core. Each maps onto the HTTP taxonomy via
/// [`DomainError::status_code`].
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event {0} not found")]
    EventNotFound(Uuid),

    #[error("Ticket type {0} not found for this event")]
    TicketTypeNotFound(Uuid),

    #[error("Seat {0} not found")]
    SeatNotFound(Uuid),

    #[error("Booking {0} not found")]
    BookingNotFound(Uuid),

    #[error("Promo code '{0}' not found for this event")]
    PromoNotFound(String),

    #[error("No waitlist entry found for this event")]
    WaitlistEntryNotFound,

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Seat number '{0}' already exists for this event")]
    DuplicateSeat(String),

    #[error("Promo code '{0}' already exists for this event")]
    DuplicateCode(String),

    #[error("Already on the waitlist for this event")]
    AlreadyOnWaitlist,

    #[error("A {0} with the same identity already exists")]
    Conflict(&'static str),

    #[error("Cannot delete an occupied seat")]
    SeatOccupied,

    #[error("Cannot delete a ticket type with sold tickets")]
    HasSoldTickets,

    #[error("Promo code '{0}' has expired")]
    PromoExpired(String),

    #[error("Promo code '{0}' has reached its maximum uses")]
    MaxUsesReached(String),

    #[error("Percentage discounts must be greater than 0 and at most 100, fixed discounts greater than 0")]
    InvalidDiscountRange,

    #[error("Quantity must be greater than zero")]
    InvalidQuantity,

    #[error("At most {0} tickets can be booked at once")]
    TooManyTickets(i32),

    #[error("Not enough capacity: {0}")]
    CapacityExceeded(String),

    #[error("No seats are available for waitlist notification")]
    NoCapacity,

    #[error("Cannot move booking from {from:?} to {to:?}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

impl DomainError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DomainError::EventNotFound(_)
            | DomainError::TicketTypeNotFound(_)
            | DomainError::SeatNotFound(_)
            | DomainError::BookingNotFound(_)
            | DomainError::PromoNotFound(_)
            | DomainError::WaitlistEntryNotFound
            | DomainError::UserNotFound(_) => StatusCode::NOT_FOUND,
            DomainError::DuplicateSeat(_)
            | DomainError::DuplicateCode(_)
            | DomainError::AlreadyOnWaitlist
            | DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::SeatOccupied
            | DomainError::HasSoldTickets
            | DomainError::PromoExpired(_)
            | DomainError::MaxUsesReached(_)
            | DomainError::InvalidDiscountRange
            | DomainError::InvalidQuantity
            | DomainError::TooManyTickets(_)
            | DomainError::CapacityExceeded(_)
            | DomainError::NoCapacity
            | DomainError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DomainError::EventNotFound(_) => "EVENT_NOT_FOUND",
            DomainError::TicketTypeNotFound(_) => "TICKET_TYPE_NOT_FOUND",
            DomainError::SeatNotFound(_) => "SEAT_NOT_FOUND",
            DomainError::BookingNotFound(_) => "BOOKING_NOT_FOUND",
            DomainError::PromoNotFound(_) => "PROMO_NOT_FOUND",
            DomainError::WaitlistEntryNotFound => "WAITLIST_ENTRY_NOT_FOUND",
            DomainError::UserNotFound(_) => "USER_NOT_FOUND",
            DomainError::DuplicateSeat(_) => "DUPLICATE_SEAT",
            DomainError::DuplicateCode(_) => "DUPLICATE_CODE",
            DomainError::AlreadyOnWaitlist => "ALREADY_ON_WAITLIST",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::SeatOccupied => "SEAT_OCCUPIED",
            DomainError::HasSoldTickets => "HAS_SOLD_TICKETS",
            DomainError::PromoExpired(_) => "PROMO_EXPIRED",
            DomainError::MaxUsesReached(_) => "MAX_USES_REACHED",
            DomainError::InvalidDiscountRange => "INVALID_DISCOUNT_RANGE",
            DomainError::InvalidQuantity => "INVALID_QUANTITY",
            DomainError::TooManyTickets(_) => "TOO_MANY_TICKETS",
            DomainError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            DomainError::NoCapacity => "NO_CAPACITY",
            DomainError::InvalidTransition { .. } => "INVALID_TRANSITION",
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            DomainError::InvalidTransition { from, to } => Some(format!(
                "allowed: pending -> completed, pending -> cancelled, completed -> cancelled; got {from:?} -> {to:?}"
            )),
            _ => None,
        }
    }
}

/// Loads an event or fails with `EventNotFound`.
pub(crate) async fn load_event(store: &dyn Store, event_id: Uuid) -> AppResult<Event> {
    store
        .find_event(event_id)
        .await?
        .ok_or(AppError::Domain(DomainError::EventNotFound(event_id)))
}

/// All services, wired against one store.
pub struct Services {
    pub events: EventService,
    pub inventory: Inventory,
    pub promos: PromoValidator,
    pub bookings: BookingOrchestrator,
    pub waitlist: Arc<WaitlistManager>,
    pub organizers: OrganizerService,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn WaitlistNotifier>,
        config: &Config,
    ) -> Self {
        let waitlist = Arc::new(WaitlistManager::new(
            store.clone(),
            notifier,
            config.waitlist_batch_size,
        ));
        let auto_notify = config.waitlist_auto_notify.then(|| waitlist.clone());

        let promos = PromoValidator::new(store.clone(), config.retry);
        let inventory = Inventory::new(store.clone(), config.retry, auto_notify.clone());
        let bookings = BookingOrchestrator::new(
            store.clone(),
            promos.clone(),
            config.retry,
            config.max_tickets_per_booking,
            auto_notify,
        );

        Self {
            events: EventService::new(store.clone(), promos.clone()),
            inventory,
            promos,
            bookings,
            waitlist,
            organizers: OrganizerService::new(store),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the service tests.

    use chrono::{NaiveDate, NaiveTime, Utc};
    use rust_decimal::Decimal;
    use sqlx::types::Json;
    use uuid::Uuid;

    use crate::auth::AuthContext;
    use crate::models::{Event, EventStatus, Role, Seat, SeatStatus, TicketType};
    use crate::store::{MemoryStore, Store};

    pub fn organizer() -> AuthContext {
        AuthContext::new(Uuid::new_v4(), Role::Organizer)
    }

    pub fn attendee() -> AuthContext {
        AuthContext::new(Uuid::new_v4(), Role::Attendee)
    }

    pub fn admin() -> AuthContext {
        AuthContext::new(Uuid::new_v4(), Role::Admin)
    }

    pub async fn seed_event(store: &MemoryStore, organizer_id: Uuid) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id,
            name: "Harbour Lights".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            description: None,
            poster_url: None,
            status: EventStatus::Upcoming,
            ticket_categories: Json(Vec::new()),
            seating_layout: Json(Vec::new()),
            promo_code_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        store.insert_event(&event).await.unwrap();
        event
    }

    pub async fn seed_ticket_type(
        store: &MemoryStore,
        event_id: Uuid,
        price: i64,
        max: Option<i32>,
    ) -> TicketType {
        let now = Utc::now();
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            event_id,
            category: "General".to_string(),
            price: Decimal::from(price),
            max_tickets_per_category: max,
            tickets_sold: 0,
            created_at: now,
            updated_at: now,
        };
        store.insert_ticket_type(&ticket_type).await.unwrap();
        ticket_type
    }

    pub async fn seed_seats(store: &MemoryStore, event_id: Uuid, numbers: &[&str]) -> Vec<Seat> {
        let now = Utc::now();
        let seats: Vec<Seat> = numbers
            .iter()
            .map(|n| Seat {
                id: Uuid::new_v4(),
                event_id,
                seat_number: n.to_string(),
                section: "A".to_string(),
                status: SeatStatus::Available,
                ticket_id: None,
                created_at: now,
                updated_at: now,
            })
            .collect();
        store.insert_seats(&seats).await.unwrap();
        seats
    }
}
