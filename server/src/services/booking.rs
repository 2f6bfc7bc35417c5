//! Booking orchestration.
//!
//! Creating a booking claims ticket-type capacity, reserves seats, redeems the
//! promo code and finally writes the booking with its tickets. Every step is
//! an atomic conditional write in the store; if a later step fails, the
//! earlier claims are handed back before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::promo::{compute_discount, PromoQuote};
use super::retry::{with_backoff, RetryPolicy};
use super::{load_event, DomainError, PromoValidator, WaitlistManager};
use crate::auth::AuthContext;
use crate::models::{
    Booking, Event, EventStatus, PaymentStatus, Role, SeatStatus, Ticket, TicketLine,
    TicketStatus, TicketType,
};
use crate::store::{BookingFilter, Store, TicketFilter};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingItem {
    pub ticket_type_id: Uuid,
    pub quantity: i32,
    /// Explicit seats; when empty and the event is seated, seats are picked
    /// from the sections assigned to the ticket type.
    #[serde(default)]
    pub seat_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub event_id: Uuid,
    pub items: Vec<BookingItem>,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingReceipt {
    pub booking: Booking,
    pub tickets: Vec<Ticket>,
}

struct Line {
    ticket_type: TicketType,
    quantity: i32,
    seat_ids: Vec<Uuid>,
}

/// What a booking attempt has claimed so far.
#[derive(Default)]
struct Allocation {
    capacity: Vec<(Uuid, i32)>,
    seated_tickets: Vec<Uuid>,
    promo_code_id: Option<Uuid>,
}

pub struct BookingOrchestrator {
    store: Arc<dyn Store>,
    promos: PromoValidator,
    retry: RetryPolicy,
    max_tickets: i32,
    auto_notify: Option<Arc<WaitlistManager>>,
}

impl BookingOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        promos: PromoValidator,
        retry: RetryPolicy,
        max_tickets: i32,
        auto_notify: Option<Arc<WaitlistManager>>,
    ) -> Self {
        Self {
            store,
            promos,
            retry,
            max_tickets,
            auto_notify,
        }
    }

    pub async fn create(&self, ctx: &AuthContext, input: CreateBooking) -> AppResult<BookingReceipt> {
        ctx.require_role(&[Role::Attendee, Role::Admin])?;
        if input.items.is_empty() {
            return Err(AppError::ValidationError("items must not be empty".into()));
        }

        let event = load_event(self.store.as_ref(), input.event_id).await?;
        if event.status != EventStatus::Upcoming {
            return Err(AppError::ValidationError(format!(
                "Event {} is not open for booking",
                event.id
            )));
        }

        let lines = self.resolve_lines(&event, input.items).await?;
        let subtotal: Decimal = lines
            .iter()
            .map(|l| l.ticket_type.price * Decimal::from(l.quantity))
            .sum();

        let quote: Option<PromoQuote> = match input.promo_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                Some(self.promos.validate(event.id, code, Utc::now()).await?)
            }
            _ => None,
        };
        let discount = quote.as_ref().map_or(Decimal::ZERO, |q| {
            compute_discount(subtotal, q.discount_type, q.discount_value)
        });

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            event_id: event.id,
            attendee_id: ctx.user_id,
            ticket_details: Json(
                lines
                    .iter()
                    .map(|l| TicketLine {
                        ticket_type_id: l.ticket_type.id,
                        category: l.ticket_type.category.clone(),
                        price: l.ticket_type.price,
                        quantity: l.quantity,
                    })
                    .collect(),
            ),
            subtotal,
            discount_amount: discount,
            total_amount: subtotal - discount,
            promo_code_id: quote.as_ref().map(|q| q.promo_code_id),
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        let mut allocation = Allocation::default();
        match self.allocate(&event, &lines, &booking, &mut allocation).await {
            Ok(tickets) => {
                tracing::info!(
                    booking_id = %booking.id,
                    event_id = %event.id,
                    attendee_id = %ctx.user_id,
                    tickets = tickets.len(),
                    total = %booking.total_amount,
                    "Booking created"
                );
                Ok(BookingReceipt { booking, tickets })
            }
            Err(err) => {
                self.compensate(&allocation).await;
                Err(err)
            }
        }
    }

    async fn resolve_lines(&self, event: &Event, items: Vec<BookingItem>) -> AppResult<Vec<Line>> {
        let mut lines = Vec::with_capacity(items.len());
        let mut total: i64 = 0;
        for item in items {
            if item.quantity <= 0 {
                return Err(DomainError::InvalidQuantity.into());
            }
            total += i64::from(item.quantity);
            if total > i64::from(self.max_tickets) {
                return Err(DomainError::TooManyTickets(self.max_tickets).into());
            }
            if !item.seat_ids.is_empty() && item.seat_ids.len() != item.quantity as usize {
                return Err(AppError::ValidationError(format!(
                    "{} seats given for a quantity of {}",
                    item.seat_ids.len(),
                    item.quantity
                )));
            }
            let ticket_type = self
                .store
                .find_ticket_type(item.ticket_type_id)
                .await?
                .filter(|t| t.event_id == event.id)
                .ok_or(DomainError::TicketTypeNotFound(item.ticket_type_id))?;
            lines.push(Line {
                ticket_type,
                quantity: item.quantity,
                seat_ids: item.seat_ids,
            });
        }
        Ok(lines)
    }

    /// Claims everything the booking needs, recording each claim in
    /// `allocation` as it succeeds.
    async fn allocate(
        &self,
        event: &Event,
        lines: &[Line],
        booking: &Booking,
        allocation: &mut Allocation,
    ) -> AppResult<Vec<Ticket>> {
        let store = self.store.as_ref();

        for line in lines {
            let (id, quantity) = (line.ticket_type.id, line.quantity);
            let claimed = with_backoff(&self.retry, "ticket_types.claim", move || {
                store.try_claim_ticket_capacity(id, quantity)
            })
            .await?;
            if !claimed {
                let left = store
                    .find_ticket_type(id)
                    .await?
                    .and_then(|t| t.remaining())
                    .unwrap_or(0);
                return Err(DomainError::CapacityExceeded(format!(
                    "{} '{}' tickets left, {} requested",
                    left, line.ticket_type.category, quantity
                ))
                .into());
            }
            allocation.capacity.push((id, quantity));
        }

        let seated = store.count_seats(event.id, None).await? > 0;
        let mut tickets = Vec::new();
        for line in lines {
            let mut line_tickets: Vec<Ticket> = (0..line.quantity)
                .map(|_| Ticket {
                    id: Uuid::new_v4(),
                    booking_id: booking.id,
                    event_id: event.id,
                    ticket_type_id: line.ticket_type.id,
                    attendee_id: booking.attendee_id,
                    seat_id: None,
                    status: TicketStatus::Reserved,
                    created_at: booking.created_at,
                })
                .collect();

            if !line.seat_ids.is_empty() {
                self.reserve_chosen_seats(event, line, &mut line_tickets, allocation)
                    .await?;
            } else if seated {
                let sections = event.sections_for(line.ticket_type.id);
                let ticket_ids: Vec<Uuid> = line_tickets.iter().map(|t| t.id).collect();
                let (sections, ids) = (&sections, &ticket_ids);
                let picked = with_backoff(&self.retry, "seats.reserve_available", move || {
                    store.reserve_available_seats(event.id, sections, ids)
                })
                .await?
                .ok_or_else(|| {
                    DomainError::CapacityExceeded(format!(
                        "not enough available seats for '{}'",
                        line.ticket_type.category
                    ))
                })?;
                allocation.seated_tickets.extend(ticket_ids.iter().copied());
                for seat in picked {
                    if let Some(ticket) = line_tickets.iter_mut().find(|t| Some(t.id) == seat.ticket_id) {
                        ticket.seat_id = Some(seat.id);
                    }
                }
            }
            tickets.extend(line_tickets);
        }

        if let Some(promo_code_id) = booking.promo_code_id {
            self.promos.redeem(promo_code_id).await?;
            allocation.promo_code_id = Some(promo_code_id);
        }

        let batch = &tickets;
        with_backoff(&self.retry, "bookings.insert", move || {
            store.insert_booking(booking, batch)
        })
        .await?;
        Ok(tickets)
    }

    async fn reserve_chosen_seats(
        &self,
        event: &Event,
        line: &Line,
        tickets: &mut [Ticket],
        allocation: &mut Allocation,
    ) -> AppResult<()> {
        let store = self.store.as_ref();
        let sections = event.sections_for(line.ticket_type.id);
        let mut seen = HashSet::new();

        for (seat_id, ticket) in line.seat_ids.iter().copied().zip(tickets.iter_mut()) {
            if !seen.insert(seat_id) {
                return Err(AppError::ValidationError(format!("seat {seat_id} requested twice")));
            }
            let seat = store
                .find_seat(seat_id)
                .await?
                .filter(|s| s.event_id == event.id)
                .ok_or(DomainError::SeatNotFound(seat_id))?;
            if !sections.is_empty() && !sections.contains(&seat.section) {
                return Err(AppError::ValidationError(format!(
                    "seat {} is not in a section sold as '{}'",
                    seat.seat_number, line.ticket_type.category
                )));
            }

            let (event_id, ticket_id) = (event.id, ticket.id);
            let reserved = with_backoff(&self.retry, "seats.reserve", move || {
                store.try_reserve_seat(seat_id, event_id, ticket_id)
            })
            .await?;
            if !reserved {
                return Err(DomainError::CapacityExceeded(format!(
                    "seat {} is no longer available",
                    seat.seat_number
                ))
                .into());
            }
            allocation.seated_tickets.push(ticket_id);
            ticket.seat_id = Some(seat_id);
        }
        Ok(())
    }

    /// Hands back whatever a failed attempt had claimed. Failures are logged
    /// and do not mask the original error.
    async fn compensate(&self, allocation: &Allocation) {
        let store = self.store.as_ref();

        for &(id, quantity) in &allocation.capacity {
            if let Err(e) = with_backoff(&self.retry, "ticket_types.release", move || {
                store.release_ticket_capacity(id, quantity)
            })
            .await
            {
                tracing::error!(ticket_type_id = %id, quantity, error = %e, "Failed to release ticket capacity");
            }
        }

        if !allocation.seated_tickets.is_empty() {
            let ids = &allocation.seated_tickets;
            if let Err(e) = with_backoff(&self.retry, "seats.release", move || {
                store.update_seats_for_tickets(ids, SeatStatus::Available)
            })
            .await
            {
                tracing::error!(error = %e, "Failed to release reserved seats");
            }
        }

        if let Some(promo_code_id) = allocation.promo_code_id {
            if let Err(e) = self.promos.release(promo_code_id).await {
                tracing::error!(promo_code_id = %promo_code_id, error = %e, "Failed to release promo usage");
            }
        }

        tracing::warn!(
            capacity_claims = allocation.capacity.len(),
            seats = allocation.seated_tickets.len(),
            promo = allocation.promo_code_id.is_some(),
            "Booking rolled back"
        );
    }

    /// Attendees see their own bookings, organizers the bookings of their
    /// events, admins everything.
    pub async fn list(&self, ctx: &AuthContext, event_id: Option<Uuid>) -> AppResult<Vec<Booking>> {
        let filter = match ctx.role {
            Role::Admin => BookingFilter {
                attendee_id: None,
                event_ids: event_id.map(|id| vec![id]),
            },
            Role::Attendee => BookingFilter {
                attendee_id: Some(ctx.user_id),
                event_ids: event_id.map(|id| vec![id]),
            },
            Role::Organizer => {
                let event_ids = match event_id {
                    Some(id) => {
                        let event = load_event(self.store.as_ref(), id).await?;
                        ctx.require_event_manager(event.organizer_id)?;
                        vec![id]
                    }
                    None => self.store.event_ids_for_organizer(ctx.user_id).await?,
                };
                BookingFilter {
                    attendee_id: None,
                    event_ids: Some(event_ids),
                }
            }
        };
        Ok(self.store.list_bookings(&filter).await?)
    }

    pub async fn get(&self, ctx: &AuthContext, booking_id: Uuid) -> AppResult<BookingReceipt> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or(DomainError::BookingNotFound(booking_id))?;
        if booking.attendee_id != ctx.user_id {
            let event = load_event(self.store.as_ref(), booking.event_id).await?;
            ctx.require_event_manager(event.organizer_id)?;
        }
        let tickets = self
            .store
            .list_tickets(&TicketFilter {
                booking_id: Some(booking_id),
                ..Default::default()
            })
            .await?;
        Ok(BookingReceipt { booking, tickets })
    }

    /// Moves a booking along `pending -> completed -> cancelled` (or straight
    /// from pending to cancelled) and applies the inventory side effects.
    pub async fn update_status(
        &self,
        ctx: &AuthContext,
        booking_id: Uuid,
        to: PaymentStatus,
    ) -> AppResult<Booking> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or(DomainError::BookingNotFound(booking_id))?;
        let event = load_event(self.store.as_ref(), booking.event_id).await?;

        let is_manager = ctx.require_event_manager(event.organizer_id).is_ok();
        if !is_manager && booking.attendee_id != ctx.user_id {
            return Err(AppError::Forbidden("not your booking".into()));
        }

        let from = booking.payment_status;
        match (from, to) {
            (PaymentStatus::Pending, PaymentStatus::Completed)
            | (PaymentStatus::Pending, PaymentStatus::Cancelled) => {}
            (PaymentStatus::Completed, PaymentStatus::Cancelled) if is_manager => {}
            (PaymentStatus::Completed, PaymentStatus::Cancelled) => {
                return Err(AppError::Forbidden(
                    "only organizers and admins may cancel a completed booking".into(),
                ))
            }
            _ => return Err(DomainError::InvalidTransition { from, to }.into()),
        }

        let store = self.store.as_ref();
        let updated = with_backoff(&self.retry, "bookings.transition", move || {
            store.transition_booking(booking_id, from, to)
        })
        .await?
        .ok_or(DomainError::InvalidTransition { from, to })?;

        let ticket_ids: Vec<Uuid> = self
            .store
            .list_tickets(&TicketFilter {
                booking_id: Some(booking_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|t| t.id)
            .collect();

        match to {
            PaymentStatus::Completed => self.confirm(&updated, &ticket_ids).await?,
            PaymentStatus::Cancelled => self.cancel(&updated, &ticket_ids).await?,
            PaymentStatus::Pending => {}
        }

        tracing::info!(booking_id = %booking_id, ?from, ?to, "Booking status updated");
        Ok(updated)
    }

    async fn confirm(&self, booking: &Booking, ticket_ids: &[Uuid]) -> AppResult<()> {
        let store = self.store.as_ref();
        let booking_id = booking.id;
        with_backoff(&self.retry, "tickets.confirm", move || {
            store.set_ticket_status_for_booking(booking_id, TicketStatus::Confirmed)
        })
        .await?;
        with_backoff(&self.retry, "seats.occupy", move || {
            store.update_seats_for_tickets(ticket_ids, SeatStatus::Occupied)
        })
        .await?;

        let converted = self
            .store
            .mark_waitlist_converted(booking.event_id, &booking.attendee_id.to_string())
            .await?;
        if converted > 0 {
            tracing::info!(booking_id = %booking.id, event_id = %booking.event_id, "Waitlist entry converted");
        }
        Ok(())
    }

    async fn cancel(&self, booking: &Booking, ticket_ids: &[Uuid]) -> AppResult<()> {
        let store = self.store.as_ref();
        let booking_id = booking.id;
        with_backoff(&self.retry, "tickets.cancel", move || {
            store.set_ticket_status_for_booking(booking_id, TicketStatus::Cancelled)
        })
        .await?;
        let freed = with_backoff(&self.retry, "seats.release", move || {
            store.update_seats_for_tickets(ticket_ids, SeatStatus::Available)
        })
        .await?;

        for line in booking.ticket_details.iter() {
            let (id, quantity) = (line.ticket_type_id, line.quantity);
            with_backoff(&self.retry, "ticket_types.release", move || {
                store.release_ticket_capacity(id, quantity)
            })
            .await?;
        }
        if let Some(promo_code_id) = booking.promo_code_id {
            self.promos.release(promo_code_id).await?;
        }

        if freed > 0 {
            if let Some(waitlist) = &self.auto_notify {
                waitlist.notify_after_release(booking.event_id).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscountType, SectionAssignment, WaitlistStatus};
    use crate::services::promo::PromoCodeInput;
    use crate::services::test_support::{attendee, organizer, seed_event, seed_seats, seed_ticket_type};
    use crate::services::waitlist::{JoinWaitlist, WaitlistIdentity};
    use crate::services::LogNotifier;
    use crate::store::{MemoryStore, SeatFilter};
    use assert_matches::assert_matches;

    struct Fixture {
        store: Arc<MemoryStore>,
        bookings: Arc<BookingOrchestrator>,
        promos: PromoValidator,
        owner: AuthContext,
        event: Event,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = organizer();
        let event = seed_event(&store, owner.user_id).await;
        let promos = PromoValidator::new(store.clone(), RetryPolicy::default());
        let bookings = Arc::new(BookingOrchestrator::new(
            store.clone(),
            promos.clone(),
            RetryPolicy::default(),
            10,
            None,
        ));
        Fixture {
            store,
            bookings,
            promos,
            owner,
            event,
        }
    }

    fn order(event_id: Uuid, ticket_type_id: Uuid, quantity: i32) -> CreateBooking {
        CreateBooking {
            event_id,
            items: vec![BookingItem {
                ticket_type_id,
                quantity,
                seat_ids: Vec::new(),
            }],
            promo_code: None,
        }
    }

    async fn sold(store: &MemoryStore, ticket_type_id: Uuid) -> i32 {
        store
            .find_ticket_type(ticket_type_id)
            .await
            .unwrap()
            .unwrap()
            .tickets_sold
    }

    #[tokio::test]
    async fn test_booking_applies_percentage_promo() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 25, None).await;
        let promo = f
            .promos
            .insert_for_event(
                f.event.id,
                &PromoCodeInput {
                    code: "save10".to_string(),
                    discount_type: DiscountType::Percentage,
                    discount_value: Decimal::from(10),
                    max_uses: Some(5),
                    expiry_date: None,
                },
            )
            .await
            .unwrap();

        let mut request = order(f.event.id, general.id, 2);
        request.promo_code = Some("SAVE10".to_string());
        let receipt = f.bookings.create(&attendee(), request).await.unwrap();

        assert_eq!(receipt.booking.subtotal, Decimal::from(50));
        assert_eq!(receipt.booking.discount_amount, Decimal::from(5));
        assert_eq!(receipt.booking.total_amount, Decimal::from(45));
        assert_eq!(receipt.booking.payment_status, PaymentStatus::Pending);
        assert_eq!(receipt.tickets.len(), 2);

        let stored = f.store.find_promo_code_by_id(promo.id).await.unwrap().unwrap();
        assert_eq!(stored.current_uses, 1);
    }

    #[tokio::test]
    async fn test_category_cap_is_enforced_without_partial_claims() {
        let f = fixture().await;
        let vip = seed_ticket_type(&f.store, f.event.id, 100, Some(2)).await;

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, vip.id, 3))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::CapacityExceeded(_)));
        assert_eq!(sold(&f.store, vip.id).await, 0);

        f.bookings
            .create(&attendee(), order(f.event.id, vip.id, 2))
            .await
            .unwrap();
        assert_eq!(sold(&f.store, vip.id).await, 2);
    }

    #[tokio::test]
    async fn test_oversized_quantities_are_rejected_before_claiming() {
        let f = fixture().await;
        let vip = seed_ticket_type(&f.store, f.event.id, 100, Some(10)).await;
        let open = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        f.bookings
            .create(&attendee(), order(f.event.id, vip.id, 1))
            .await
            .unwrap();

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, vip.id, i32::MAX))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::TooManyTickets(10)));

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, open.id, i32::MAX))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::TooManyTickets(10)));

        let mut split = order(f.event.id, open.id, 6);
        split.items.push(BookingItem {
            ticket_type_id: open.id,
            quantity: 5,
            seat_ids: Vec::new(),
        });
        let err = f.bookings.create(&attendee(), split).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::TooManyTickets(10)));

        assert_eq!(sold(&f.store, vip.id).await, 1);
        assert_eq!(sold(&f.store, open.id).await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_for_one_seat() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        let seat = seed_seats(&f.store, f.event.id, &["A1"]).await.remove(0);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let bookings = f.bookings.clone();
            let mut request = order(f.event.id, general.id, 1);
            request.items[0].seat_ids = vec![seat.id];
            handles.push(tokio::spawn(async move {
                bookings.create(&attendee(), request).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => {
                    assert_eq!(receipt.tickets[0].seat_id, Some(seat.id));
                    succeeded += 1;
                }
                Err(err) => {
                    assert_matches!(err, AppError::Domain(DomainError::CapacityExceeded(_)))
                }
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(sold(&f.store, general.id).await, 1);

        let seat = f.store.find_seat(seat.id).await.unwrap().unwrap();
        assert_eq!(seat.status, SeatStatus::Reserved);
    }

    #[tokio::test]
    async fn test_auto_pick_respects_assigned_sections() {
        let f = fixture().await;
        let vip = seed_ticket_type(&f.store, f.event.id, 90, None).await;
        seed_seats(&f.store, f.event.id, &["A1", "A2"]).await;
        let mut event = f.event.clone();
        event.seating_layout = Json(vec![SectionAssignment {
            section: "A".to_string(),
            ticket_type_id: Some(vip.id),
        }]);
        f.store.update_event(&event).await.unwrap();

        let receipt = f
            .bookings
            .create(&attendee(), order(f.event.id, vip.id, 2))
            .await
            .unwrap();
        assert!(receipt.tickets.iter().all(|t| t.seat_id.is_some()));

        let left = f
            .store
            .count_seats(f.event.id, Some(SeatStatus::Available))
            .await
            .unwrap();
        assert_eq!(left, 0);
    }

    #[tokio::test]
    async fn test_seat_shortage_rolls_back_capacity() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, Some(10)).await;
        seed_seats(&f.store, f.event.id, &["A1"]).await;

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, general.id, 2))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::CapacityExceeded(_)));
        assert_eq!(sold(&f.store, general.id).await, 0);
        assert!(f.store.list_bookings(&BookingFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_seat_reservation_releases_earlier_seats() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        let seats = seed_seats(&f.store, f.event.id, &["A1", "A2"]).await;
        f.store
            .set_seat_status(seats[1].id, SeatStatus::Occupied, None)
            .await
            .unwrap();

        let mut request = order(f.event.id, general.id, 2);
        request.items[0].seat_ids = vec![seats[0].id, seats[1].id];
        let err = f.bookings.create(&attendee(), request).await.unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::CapacityExceeded(_)));

        let first = f.store.find_seat(seats[0].id).await.unwrap().unwrap();
        assert_eq!(first.status, SeatStatus::Available);
        assert_eq!(first.ticket_id, None);
    }

    #[tokio::test]
    async fn test_rejects_bad_items() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, general.id, 0))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::InvalidQuantity));

        let err = f
            .bookings
            .create(&attendee(), order(f.event.id, Uuid::new_v4(), 1))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Domain(DomainError::TicketTypeNotFound(_)));

        let mut request = order(f.event.id, general.id, 2);
        request.items[0].seat_ids = vec![Uuid::new_v4()];
        let err = f.bookings.create(&attendee(), request).await.unwrap_err();
        assert_matches!(err, AppError::ValidationError(_));

        let err = f
            .bookings
            .create(&f.owner, order(f.event.id, general.id, 1))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));
    }

    #[tokio::test]
    async fn test_complete_confirms_tickets_and_converts_waitlist_entry() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        seed_seats(&f.store, f.event.id, &["A1"]).await;
        let fan = attendee();
        let waitlist = WaitlistManager::new(f.store.clone(), Arc::new(LogNotifier), 5);
        waitlist
            .join(
                WaitlistIdentity::User(fan),
                JoinWaitlist {
                    event_id: f.event.id,
                    ticket_type_id: None,
                    email: None,
                    name: None,
                },
            )
            .await
            .unwrap();

        let receipt = f
            .bookings
            .create(&fan, order(f.event.id, general.id, 1))
            .await
            .unwrap();
        let booking = f
            .bookings
            .update_status(&fan, receipt.booking.id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Completed);

        let receipt = f.bookings.get(&fan, booking.id).await.unwrap();
        assert!(receipt.tickets.iter().all(|t| t.status == TicketStatus::Confirmed));
        let occupied = f
            .store
            .list_seats(&SeatFilter {
                event_id: Some(f.event.id),
                status: Some(SeatStatus::Occupied),
                section: None,
            })
            .await
            .unwrap();
        assert_eq!(occupied.len(), 1);

        let entries = waitlist.list(&fan, Some(f.event.id)).await.unwrap();
        assert_eq!(entries[0].status, WaitlistStatus::Converted);
    }

    #[tokio::test]
    async fn test_cancel_releases_seats_capacity_and_promo() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, Some(5)).await;
        seed_seats(&f.store, f.event.id, &["A1", "A2"]).await;
        let promo = f
            .promos
            .insert_for_event(
                f.event.id,
                &PromoCodeInput {
                    code: "FIVE".to_string(),
                    discount_type: DiscountType::Fixed,
                    discount_value: Decimal::from(5),
                    max_uses: Some(1),
                    expiry_date: None,
                },
            )
            .await
            .unwrap();
        let fan = attendee();

        let mut request = order(f.event.id, general.id, 2);
        request.promo_code = Some("five".to_string());
        let receipt = f.bookings.create(&fan, request).await.unwrap();
        assert_eq!(receipt.booking.total_amount, Decimal::from(35));

        f.bookings
            .update_status(&fan, receipt.booking.id, PaymentStatus::Cancelled)
            .await
            .unwrap();

        assert_eq!(sold(&f.store, general.id).await, 0);
        let available = f
            .store
            .count_seats(f.event.id, Some(SeatStatus::Available))
            .await
            .unwrap();
        assert_eq!(available, 2);
        let promo = f.store.find_promo_code_by_id(promo.id).await.unwrap().unwrap();
        assert_eq!(promo.current_uses, 0);
    }

    #[tokio::test]
    async fn test_only_managers_cancel_completed_bookings() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        let fan = attendee();
        let receipt = f
            .bookings
            .create(&fan, order(f.event.id, general.id, 1))
            .await
            .unwrap();
        let id = receipt.booking.id;
        f.bookings
            .update_status(&fan, id, PaymentStatus::Completed)
            .await
            .unwrap();

        let err = f
            .bookings
            .update_status(&fan, id, PaymentStatus::Cancelled)
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));

        f.bookings
            .update_status(&f.owner, id, PaymentStatus::Cancelled)
            .await
            .unwrap();

        let err = f
            .bookings
            .update_status(&f.owner, id, PaymentStatus::Completed)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            AppError::Domain(DomainError::InvalidTransition {
                from: PaymentStatus::Cancelled,
                to: PaymentStatus::Completed
            })
        );
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_role() {
        let f = fixture().await;
        let general = seed_ticket_type(&f.store, f.event.id, 20, None).await;
        let other_event = seed_event(&f.store, Uuid::new_v4()).await;
        let other_type = seed_ticket_type(&f.store, other_event.id, 20, None).await;
        let fan = attendee();

        f.bookings
            .create(&fan, order(f.event.id, general.id, 1))
            .await
            .unwrap();
        f.bookings
            .create(&attendee(), order(other_event.id, other_type.id, 1))
            .await
            .unwrap();

        assert_eq!(f.bookings.list(&fan, None).await.unwrap().len(), 1);
        assert_eq!(f.bookings.list(&f.owner, None).await.unwrap().len(), 1);

        let err = f
            .bookings
            .list(&f.owner, Some(other_event.id))
            .await
            .unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));

        let stranger = attendee();
        let booking_id = f.bookings.list(&fan, None).await.unwrap()[0].id;
        let err = f.bookings.get(&stranger, booking_id).await.unwrap_err();
        assert_matches!(err, AppError::Forbidden(_));
    }
}
