//! Seat and ticket-type inventory.
//!
//! Availability checks are read-only. Capacity is only ever consumed through
//! the store's compare-and-set primitives, which the booking orchestrator
//! drives; this module owns the organizer-facing setup and maintenance side.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::retry::{with_backoff, RetryPolicy};
use super::{load_event, DomainError, WaitlistManager};
use crate::auth::AuthContext;
use crate::models::{Event, Seat, SeatStatus, TicketCategory, TicketType};
use crate::store::{SeatFilter, Store, StoreError};
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTicketType {
    pub event_id: Uuid,
    pub category: String,
    pub price: Decimal,
    pub max_tickets_per_category: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeChanges {
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub max_tickets_per_category: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSeats {
    pub event_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub section: String,
    pub status: Option<SeatStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub available: bool,
    /// `None` when neither seats nor a category cap limit the ticket type.
    pub remaining: Option<i64>,
}

pub(crate) fn check_ticket_type_fields(category: &str, price: Decimal, max: Option<i32>) -> AppResult<()> {
    if category.trim().is_empty() {
        return Err(AppError::ValidationError("category must not be empty".into()));
    }
    if price < Decimal::ZERO {
        return Err(AppError::ValidationError("price must not be negative".into()));
    }
    if max.is_some_and(|m| m < 0) {
        return Err(AppError::ValidationError(
            "maxTicketsPerCategory must not be negative".into(),
        ));
    }
    Ok(())
}

pub(crate) fn categories_of(ticket_types: &[TicketType]) -> Vec<TicketCategory> {
    ticket_types.iter().map(TicketCategory::from).collect()
}

pub struct Inventory {
    store: Arc<dyn Store>,
    retry: RetryPolicy,
    auto_notify: Option<Arc<WaitlistManager>>,
}

impl Inventory {
    pub fn new(
        store: Arc<dyn Store>,
        retry: RetryPolicy,
        auto_notify: Option<Arc<WaitlistManager>>,
    ) -> Self {
        Self {
            store,
            retry,
            auto_notify,
        }
    }

    /// Whether `quantity` tickets of the type could be sold right now.
    ///
    /// When the event has seats, only available seats in the sections
    /// assigned to the ticket type count (all sections if none are
    /// assigned); the category cap applies on top.
    pub async fn check_availability(
        &self,
        event_id: Uuid,
        ticket_type_id: Uuid,
        quantity: i64,
    ) -> AppResult<Availability> {
        let event = load_event(self.store.as_ref(), event_id).await?;
        let ticket_type = self
            .store
            .find_ticket_type(ticket_type_id)
            .await?
            .filter(|t| t.event_id == event_id)
            .ok_or(DomainError::TicketTypeNotFound(ticket_type_id))?;

        let seat_remaining = self.available_seats_for(&event, ticket_type_id).await?;
        let remaining = match (seat_remaining, ticket_type.remaining()) {
            (Some(seats), Some(cap)) => Some(seats.min(cap)),
            (seats, cap) => seats.or(cap),
        };

        Ok(Availability {
            available: quantity > 0 && remaining.map_or(true, |r| r >= quantity),
            remaining,
        })
    }

    /// Available seats usable by the ticket type, or `None` if the event
    /// has no seats at all.
    async fn available_seats_for(&self, event: &Event, ticket_type_id: Uuid) -> AppResult<Option<i64>> {
        if self.store.count_seats(event.id, None).await? == 0 {
            return Ok(None);
        }
        let sections = event.sections_for(ticket_type_id);
        let seats = self
            .store
            .list_seats(&SeatFilter {
                event_id: Some(event.id),
                status: Some(SeatStatus::Available),
                section: None,
            })
            .await?;
        let count = seats
            .iter()
            .filter(|s| sections.is_empty() || sections.contains(&s.section))
            .count();
        Ok(Some(count as i64))
    }

    // -- ticket types -------------------------------------------------------

    pub async fn create_ticket_type(
        &self,
        ctx: &AuthContext,
        input: NewTicketType,
    ) -> AppResult<TicketType> {
        check_ticket_type_fields(&input.category, input.price, input.max_tickets_per_category)?;
        let event = load_event(self.store.as_ref(), input.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        let now = Utc::now();
        let ticket_type = TicketType {
            id: Uuid::new_v4(),
            event_id: event.id,
            category: input.category.trim().to_string(),
            price: input.price,
            max_tickets_per_category: input.max_tickets_per_category,
            tickets_sold: 0,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_ticket_type(&ticket_type).await?;
        self.sync_event_categories(event.id, None).await?;

        tracing::info!(ticket_type_id = %ticket_type.id, event_id = %ticket_type.event_id, "Ticket type created");
        Ok(ticket_type)
    }

    pub async fn list_ticket_types(&self, event_id: Option<Uuid>) -> AppResult<Vec<TicketType>> {
        Ok(self.store.list_ticket_types(event_id).await?)
    }

    pub async fn update_ticket_type(
        &self,
        ctx: &AuthContext,
        ticket_type_id: Uuid,
        changes: TicketTypeChanges,
    ) -> AppResult<TicketType> {
        let mut ticket_type = self
            .store
            .find_ticket_type(ticket_type_id)
            .await?
            .ok_or(DomainError::TicketTypeNotFound(ticket_type_id))?;
        let event = load_event(self.store.as_ref(), ticket_type.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        if let Some(category) = changes.category {
            ticket_type.category = category.trim().to_string();
        }
        if let Some(price) = changes.price {
            ticket_type.price = price;
        }
        if let Some(max) = changes.max_tickets_per_category {
            ticket_type.max_tickets_per_category = Some(max);
        }
        check_ticket_type_fields(
            &ticket_type.category,
            ticket_type.price,
            ticket_type.max_tickets_per_category,
        )?;
        ticket_type.updated_at = Utc::now();

        let updated = match self.store.update_ticket_type(&ticket_type).await? {
            Some(updated) => updated,
            None => {
                // Either deleted meanwhile or the cap is now below what was sold.
                let current = self
                    .store
                    .find_ticket_type(ticket_type_id)
                    .await?
                    .ok_or(DomainError::TicketTypeNotFound(ticket_type_id))?;
                return Err(AppError::ValidationError(format!(
                    "maxTicketsPerCategory cannot be below the {} tickets already sold",
                    current.tickets_sold
                )));
            }
        };
        self.sync_event_categories(event.id, None).await?;

        tracing::info!(ticket_type_id = %ticket_type_id, "Ticket type updated");
        Ok(updated)
    }

    /// Deletes a ticket type nobody holds tickets for, and unassigns it from
    /// the event's seating layout.
    pub async fn delete_ticket_type(&self, ctx: &AuthContext, ticket_type_id: Uuid) -> AppResult<()> {
        let ticket_type = self
            .store
            .find_ticket_type(ticket_type_id)
            .await?
            .ok_or(DomainError::TicketTypeNotFound(ticket_type_id))?;
        let event = load_event(self.store.as_ref(), ticket_type.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        if !self.store.delete_ticket_type_if_unsold(ticket_type_id).await? {
            return Err(DomainError::HasSoldTickets.into());
        }
        self.sync_event_categories(event.id, Some(ticket_type_id)).await?;

        tracing::info!(ticket_type_id = %ticket_type_id, event_id = %event.id, "Ticket type deleted");
        Ok(())
    }

    /// Rebuilds the event's embedded category list from its ticket types,
    /// optionally unassigning a deleted type from the seating layout.
    async fn sync_event_categories(&self, event_id: Uuid, unassign: Option<Uuid>) -> AppResult<()> {
        self.store
            .refresh_event_categories(event_id, unassign)
            .await?;
        Ok(())
    }

    // -- seats --------------------------------------------------------------

    /// Bulk-creates seats. Nothing is inserted if any seat number repeats,
    /// within the request or against existing seats of the event.
    pub async fn create_seats(&self, ctx: &AuthContext, input: NewSeats) -> AppResult<Vec<Seat>> {
        let section = input.section.trim().to_string();
        if section.is_empty() {
            return Err(AppError::ValidationError("section must not be empty".into()));
        }
        if input.seat_numbers.is_empty() {
            return Err(AppError::ValidationError("seatNumbers must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for number in &input.seat_numbers {
            let number = number.trim();
            if number.is_empty() {
                return Err(AppError::ValidationError("seat numbers must not be empty".into()));
            }
            if !seen.insert(number) {
                return Err(DomainError::DuplicateSeat(number.to_string()).into());
            }
        }

        let event = load_event(self.store.as_ref(), input.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        let now = Utc::now();
        let status = input.status.unwrap_or(SeatStatus::Available);
        let seats: Vec<Seat> = input
            .seat_numbers
            .iter()
            .map(|number| Seat {
                id: Uuid::new_v4(),
                event_id: event.id,
                seat_number: number.trim().to_string(),
                section: section.clone(),
                status,
                ticket_id: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let store = self.store.as_ref();
        let batch = &seats;
        match with_backoff(&self.retry, "seats.insert", move || store.insert_seats(batch)).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                return Err(DomainError::DuplicateSeat(self.clashing_seat(&seats).await?).into())
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(event_id = %event.id, section = %section, count = seats.len(), "Seats created");
        Ok(seats)
    }

    /// First requested seat number that already exists for the event.
    async fn clashing_seat(&self, requested: &[Seat]) -> AppResult<String> {
        let Some(event_id) = requested.first().map(|s| s.event_id) else {
            return Ok(String::new());
        };
        let existing: HashSet<String> = self
            .store
            .list_seats(&SeatFilter {
                event_id: Some(event_id),
                ..Default::default()
            })
            .await?
            .into_iter()
            .map(|s| s.seat_number)
            .collect();
        Ok(requested
            .iter()
            .map(|s| s.seat_number.clone())
            .find(|number| existing.contains(number))
            .unwrap_or_else(|| {
                requested
                    .iter()
                    .map(|s| s.seat_number.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }))
    }

    pub async fn list_seats(&self, filter: SeatFilter) -> AppResult<Vec<Seat>> {
        Ok(self.store.list_seats(&filter).await?)
    }

    /// Organizer/admin override of a seat's status. Moving a seat to
    /// `available` clears its ticket link.
    pub async fn update_seat_status(
        &self,
        ctx: &AuthContext,
        seat_id: Uuid,
        status: SeatStatus,
        ticket_id: Option<Uuid>,
    ) -> AppResult<Seat> {
        let seat = self
            .store
            .find_seat(seat_id)
            .await?
            .ok_or(DomainError::SeatNotFound(seat_id))?;
        let event = load_event(self.store.as_ref(), seat.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        let store = self.store.as_ref();
        let updated = with_backoff(&self.retry, "seats.set_status", move || {
            store.set_seat_status(seat_id, status, ticket_id)
        })
        .await?
        .ok_or(DomainError::SeatNotFound(seat_id))?;

        tracing::info!(
            seat_id = %seat_id,
            from = ?seat.status,
            to = ?updated.status,
            "Seat status updated"
        );

        if seat.status != SeatStatus::Available && updated.status == SeatStatus::Available {
            self.seat_released(event.id).await;
        }
        Ok(updated)
    }

    pub async fn delete_seat(&self, ctx: &AuthContext, seat_id: Uuid) -> AppResult<()> {
        let seat = self
            .store
            .find_seat(seat_id)
            .await?
            .ok_or(DomainError::SeatNotFound(seat_id))?;
        let event = load_event(self.store.as_ref(), seat.event_id).await?;
        ctx.require_event_manager(event.organizer_id)?;

        if !self.store.delete_seat_unless_occupied(seat_id).await? {
            return Err(DomainError::SeatOccupied.into());
        }
        tracing::info!(seat_id = %seat_id, event_id = %event.id, "Seat deleted");
        Ok(())
    }

    async fn seat_released(&self, event_id: Uuid) {
        if let Some(waitlist) = &self.auto_notify {
            waitlist.notify_after_release(event_id).await;
        }
    }
}
