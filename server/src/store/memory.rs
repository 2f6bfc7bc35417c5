//! In-process [`Store`] used when no `DATABASE_URL` is configured and by the
//! test suite. A single lock guards every collection, so each primitive is
//! atomic with respect to all others.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    BookingFilter, CascadePlan, CascadeReport, EventFilter, SeatFilter, Store, StoreError,
    StoreResult, TicketFilter, WaitlistFilter,
};
use crate::models::{
    Booking, Event, PaymentStatus, PromoCode, Role, Seat, SeatStatus, Ticket, TicketCategory,
    TicketStatus, TicketType, User, WaitlistEntry, WaitlistStatus,
};

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    ticket_types: HashMap<Uuid, TicketType>,
    seats: HashMap<Uuid, Seat>,
    promo_codes: HashMap<Uuid, PromoCode>,
    bookings: HashMap<Uuid, Booking>,
    tickets: HashMap<Uuid, Ticket>,
    waitlist: HashMap<Uuid, WaitlistEntry>,
    next_position: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut db = self.inner.write().await;
        let email = user.email.to_lowercase();
        if db.users.values().any(|u| u.email.to_lowercase() == email) {
            return Err(StoreError::Duplicate("user"));
        }
        db.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let db = self.inner.read().await;
        let users = db
            .users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        Ok(sorted_by(users, |u| u.created_at))
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.inner.write().await.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.inner.read().await.events.get(&id).cloned())
    }

    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let db = self.inner.read().await;
        let events = db
            .events
            .values()
            .filter(|e| filter.organizer_id.map_or(true, |id| e.organizer_id == id))
            .filter(|e| filter.status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        Ok(sorted_by(events, |e| (e.date, e.time, e.created_at)))
    }

    async fn update_event(&self, event: &Event) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        let Some(existing) = db.events.get_mut(&event.id) else {
            return Ok(false);
        };
        let organizer_id = existing.organizer_id;
        let created_at = existing.created_at;
        *existing = event.clone();
        existing.organizer_id = organizer_id;
        existing.created_at = created_at;
        Ok(true)
    }

    async fn refresh_event_categories(
        &self,
        event_id: Uuid,
        unassign: Option<Uuid>,
    ) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        let types: Vec<TicketType> = db
            .ticket_types
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        let categories: Vec<TicketCategory> = sorted_by(types, |t| t.created_at)
            .iter()
            .map(TicketCategory::from)
            .collect();

        let Some(event) = db.events.get_mut(&event_id) else {
            return Ok(false);
        };
        event.ticket_categories = Json(categories);
        if let Some(ticket_type_id) = unassign {
            for section in event.seating_layout.iter_mut() {
                if section.ticket_type_id == Some(ticket_type_id) {
                    section.ticket_type_id = None;
                }
            }
        }
        event.updated_at = Utc::now();
        Ok(true)
    }

    async fn event_ids_for_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let db = self.inner.read().await;
        Ok(db
            .events
            .values()
            .filter(|e| e.organizer_id == organizer_id)
            .map(|e| e.id)
            .collect())
    }

    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .ticket_types
            .insert(ticket_type.id, ticket_type.clone());
        Ok(())
    }

    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        Ok(self.inner.read().await.ticket_types.get(&id).cloned())
    }

    async fn list_ticket_types(&self, event_id: Option<Uuid>) -> StoreResult<Vec<TicketType>> {
        let db = self.inner.read().await;
        let types = db
            .ticket_types
            .values()
            .filter(|t| event_id.map_or(true, |id| t.event_id == id))
            .cloned()
            .collect();
        Ok(sorted_by(types, |t| t.created_at))
    }

    async fn update_ticket_type(
        &self,
        ticket_type: &TicketType,
    ) -> StoreResult<Option<TicketType>> {
        let mut db = self.inner.write().await;
        let Some(existing) = db.ticket_types.get_mut(&ticket_type.id) else {
            return Ok(None);
        };
        if ticket_type
            .max_tickets_per_category
            .is_some_and(|max| existing.tickets_sold > max)
        {
            return Ok(None);
        }
        existing.category = ticket_type.category.clone();
        existing.price = ticket_type.price;
        existing.max_tickets_per_category = ticket_type.max_tickets_per_category;
        existing.updated_at = ticket_type.updated_at;
        Ok(Some(existing.clone()))
    }

    async fn delete_ticket_type_if_unsold(&self, id: Uuid) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        if db.tickets.values().any(|t| t.ticket_type_id == id) {
            return Ok(false);
        }
        Ok(db.ticket_types.remove(&id).is_some())
    }

    async fn try_claim_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        let Some(tt) = db.ticket_types.get_mut(&id) else {
            return Ok(false);
        };
        let Some(sold) = tt.tickets_sold.checked_add(quantity) else {
            return Ok(false);
        };
        if tt.max_tickets_per_category.is_some_and(|max| sold > max) {
            return Ok(false);
        }
        tt.tickets_sold = sold;
        Ok(true)
    }

    async fn release_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        if let Some(tt) = self.inner.write().await.ticket_types.get_mut(&id) {
            tt.tickets_sold = (tt.tickets_sold - quantity).max(0);
        }
        Ok(())
    }

    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()> {
        let mut db = self.inner.write().await;
        let mut seen: HashSet<(Uuid, String)> = db
            .seats
            .values()
            .map(|s| (s.event_id, s.seat_number.clone()))
            .collect();
        for seat in seats {
            if !seen.insert((seat.event_id, seat.seat_number.clone())) {
                return Err(StoreError::Duplicate("seat"));
            }
        }
        for seat in seats {
            db.seats.insert(seat.id, seat.clone());
        }
        Ok(())
    }

    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>> {
        Ok(self.inner.read().await.seats.get(&id).cloned())
    }

    async fn list_seats(&self, filter: &SeatFilter) -> StoreResult<Vec<Seat>> {
        let db = self.inner.read().await;
        let seats = db
            .seats
            .values()
            .filter(|s| filter.event_id.map_or(true, |id| s.event_id == id))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| filter.section.as_ref().map_or(true, |sec| &s.section == sec))
            .cloned()
            .collect();
        Ok(sorted_by(seats, |s| (s.section.clone(), s.seat_number.clone())))
    }

    async fn count_seats(&self, event_id: Uuid, status: Option<SeatStatus>) -> StoreResult<i64> {
        let db = self.inner.read().await;
        let count = db
            .seats
            .values()
            .filter(|s| s.event_id == event_id && status.map_or(true, |st| s.status == st))
            .count();
        Ok(count as i64)
    }

    async fn set_seat_status(
        &self,
        id: Uuid,
        status: SeatStatus,
        ticket_id: Option<Uuid>,
    ) -> StoreResult<Option<Seat>> {
        let mut db = self.inner.write().await;
        let Some(seat) = db.seats.get_mut(&id) else {
            return Ok(None);
        };
        seat.status = status;
        seat.ticket_id = match status {
            SeatStatus::Available => None,
            _ => ticket_id.or(seat.ticket_id),
        };
        seat.updated_at = Utc::now();
        Ok(Some(seat.clone()))
    }

    async fn delete_seat_unless_occupied(&self, id: Uuid) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        match db.seats.get(&id) {
            Some(seat) if seat.status != SeatStatus::Occupied => {
                db.seats.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_reserve_seat(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        ticket_id: Uuid,
    ) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        match db.seats.get_mut(&seat_id) {
            Some(seat) if seat.event_id == event_id && seat.status == SeatStatus::Available => {
                seat.status = SeatStatus::Reserved;
                seat.ticket_id = Some(ticket_id);
                seat.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reserve_available_seats(
        &self,
        event_id: Uuid,
        sections: &[String],
        ticket_ids: &[Uuid],
    ) -> StoreResult<Option<Vec<Seat>>> {
        let mut db = self.inner.write().await;
        let mut candidates: Vec<(String, String, Uuid)> = db
            .seats
            .values()
            .filter(|s| s.event_id == event_id && s.status == SeatStatus::Available)
            .filter(|s| sections.is_empty() || sections.contains(&s.section))
            .map(|s| (s.section.clone(), s.seat_number.clone(), s.id))
            .collect();
        if candidates.len() < ticket_ids.len() {
            return Ok(None);
        }
        candidates.sort();

        let now = Utc::now();
        let mut reserved = Vec::with_capacity(ticket_ids.len());
        for ((_, _, seat_id), ticket_id) in candidates.into_iter().zip(ticket_ids) {
            if let Some(seat) = db.seats.get_mut(&seat_id) {
                seat.status = SeatStatus::Reserved;
                seat.ticket_id = Some(*ticket_id);
                seat.updated_at = now;
                reserved.push(seat.clone());
            }
        }
        Ok(Some(reserved))
    }

    async fn update_seats_for_tickets(
        &self,
        ticket_ids: &[Uuid],
        status: SeatStatus,
    ) -> StoreResult<u64> {
        let mut db = self.inner.write().await;
        let now = Utc::now();
        let mut changed = 0;
        for seat in db.seats.values_mut() {
            if seat.ticket_id.is_some_and(|t| ticket_ids.contains(&t)) {
                seat.status = status;
                if status == SeatStatus::Available {
                    seat.ticket_id = None;
                }
                seat.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert_promo_code(&self, promo: &PromoCode) -> StoreResult<()> {
        let mut db = self.inner.write().await;
        if db
            .promo_codes
            .values()
            .any(|p| p.event_id == promo.event_id && p.code == promo.code)
        {
            return Err(StoreError::Duplicate("promo code"));
        }
        db.promo_codes.insert(promo.id, promo.clone());
        if let Some(event) = db.events.get_mut(&promo.event_id) {
            if !event.promo_code_ids.contains(&promo.id) {
                event.promo_code_ids.push(promo.id);
            }
        }
        Ok(())
    }

    async fn find_promo_code(&self, event_id: Uuid, code: &str) -> StoreResult<Option<PromoCode>> {
        let db = self.inner.read().await;
        Ok(db
            .promo_codes
            .values()
            .find(|p| p.event_id == event_id && p.code == code)
            .cloned())
    }

    async fn find_promo_code_by_id(&self, id: Uuid) -> StoreResult<Option<PromoCode>> {
        Ok(self.inner.read().await.promo_codes.get(&id).cloned())
    }

    async fn list_promo_codes(&self, event_id: Uuid) -> StoreResult<Vec<PromoCode>> {
        let db = self.inner.read().await;
        let promos = db
            .promo_codes
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        Ok(sorted_by(promos, |p| p.created_at))
    }

    async fn delete_promo_code(&self, id: Uuid) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        let Some(promo) = db.promo_codes.remove(&id) else {
            return Ok(false);
        };
        if let Some(event) = db.events.get_mut(&promo.event_id) {
            event.promo_code_ids.retain(|p| *p != id);
        }
        Ok(true)
    }

    async fn try_increment_promo_usage(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        match db.promo_codes.get_mut(&id) {
            Some(promo) if !promo.is_exhausted() && !promo.is_expired(now) => {
                promo.current_uses += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_promo_usage(&self, id: Uuid) -> StoreResult<()> {
        if let Some(promo) = self.inner.write().await.promo_codes.get_mut(&id) {
            promo.current_uses = (promo.current_uses - 1).max(0);
        }
        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking, tickets: &[Ticket]) -> StoreResult<()> {
        let mut db = self.inner.write().await;
        db.bookings.insert(booking.id, booking.clone());
        for ticket in tickets {
            db.tickets.insert(ticket.id, ticket.clone());
        }
        Ok(())
    }

    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.inner.read().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let db = self.inner.read().await;
        let bookings = db
            .bookings
            .values()
            .filter(|b| filter.attendee_id.map_or(true, |id| b.attendee_id == id))
            .filter(|b| {
                filter
                    .event_ids
                    .as_ref()
                    .map_or(true, |ids| ids.contains(&b.event_id))
            })
            .cloned()
            .collect();
        Ok(sorted_by(bookings, |b| b.created_at))
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> StoreResult<Option<Booking>> {
        let mut db = self.inner.write().await;
        match db.bookings.get_mut(&id) {
            Some(booking) if booking.payment_status == from => {
                booking.payment_status = to;
                booking.updated_at = Utc::now();
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let db = self.inner.read().await;
        let tickets = db
            .tickets
            .values()
            .filter(|t| filter.booking_id.map_or(true, |id| t.booking_id == id))
            .filter(|t| filter.event_id.map_or(true, |id| t.event_id == id))
            .filter(|t| filter.ticket_type_id.map_or(true, |id| t.ticket_type_id == id))
            .cloned()
            .collect();
        Ok(sorted_by(tickets, |t| (t.created_at, t.id)))
    }

    async fn set_ticket_status_for_booking(
        &self,
        booking_id: Uuid,
        status: TicketStatus,
    ) -> StoreResult<u64> {
        let mut db = self.inner.write().await;
        let mut changed = 0;
        for ticket in db.tickets.values_mut().filter(|t| t.booking_id == booking_id) {
            ticket.status = status;
            changed += 1;
        }
        Ok(changed)
    }

    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> StoreResult<WaitlistEntry> {
        let mut db = self.inner.write().await;
        if db.waitlist.values().any(|w| {
            w.event_id == entry.event_id
                && w.attendee_key == entry.attendee_key
                && w.status.is_active()
        }) {
            return Err(StoreError::Duplicate("waitlist entry"));
        }
        db.next_position += 1;
        let mut stored = entry.clone();
        stored.position = db.next_position;
        db.waitlist.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn list_waitlist(&self, filter: &WaitlistFilter) -> StoreResult<Vec<WaitlistEntry>> {
        let db = self.inner.read().await;
        let entries = db
            .waitlist
            .values()
            .filter(|w| filter.event_id.map_or(true, |id| w.event_id == id))
            .filter(|w| {
                filter
                    .attendee_key
                    .as_ref()
                    .map_or(true, |key| &w.attendee_key == key)
            })
            .filter(|w| filter.status.map_or(true, |s| w.status == s))
            .cloned()
            .collect();
        Ok(sorted_by(entries, |w| (w.joined_at, w.position)))
    }

    async fn oldest_waiting(&self, event_id: Uuid, limit: i64) -> StoreResult<Vec<WaitlistEntry>> {
        let filter = WaitlistFilter {
            event_id: Some(event_id),
            status: Some(WaitlistStatus::Waiting),
            ..Default::default()
        };
        let mut entries = self.list_waitlist(&filter).await?;
        entries.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(entries)
    }

    async fn delete_waitlist_entry(
        &self,
        event_id: Uuid,
        attendee_key: &str,
        entry_id: Option<Uuid>,
    ) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        let before = db.waitlist.len();
        db.waitlist.retain(|id, w| {
            !(w.event_id == event_id
                && w.attendee_key == attendee_key
                && w.status.is_active()
                && entry_id.map_or(true, |wanted| wanted == *id))
        });
        Ok(db.waitlist.len() < before)
    }

    async fn mark_waitlist_notified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut db = self.inner.write().await;
        match db.waitlist.get_mut(&id) {
            Some(entry) if entry.status == WaitlistStatus::Waiting => {
                entry.status = WaitlistStatus::Notified;
                entry.notified_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_waitlist_converted(
        &self,
        event_id: Uuid,
        attendee_key: &str,
    ) -> StoreResult<u64> {
        let mut db = self.inner.write().await;
        let mut changed = 0;
        for entry in db.waitlist.values_mut() {
            if entry.event_id == event_id
                && entry.attendee_key == attendee_key
                && entry.status.is_active()
            {
                entry.status = WaitlistStatus::Converted;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn apply_cascade(&self, plan: &CascadePlan) -> StoreResult<CascadeReport> {
        let mut db = self.inner.write().await;
        let mut report = CascadeReport::default();
        let events: HashSet<Uuid> = plan.event_ids.iter().copied().collect();

        fn purge<T>(map: &mut HashMap<Uuid, T>, keep: impl Fn(&T) -> bool) -> u64 {
            let before = map.len();
            map.retain(|_, v| keep(v));
            (before - map.len()) as u64
        }

        report.tickets = purge(&mut db.tickets, |t| !events.contains(&t.event_id));
        report.bookings = purge(&mut db.bookings, |b| !events.contains(&b.event_id));
        report.waitlist_entries = purge(&mut db.waitlist, |w| !events.contains(&w.event_id));
        report.promo_codes = purge(&mut db.promo_codes, |p| !events.contains(&p.event_id));
        report.seats = purge(&mut db.seats, |s| !events.contains(&s.event_id));
        report.ticket_types = purge(&mut db.ticket_types, |t| !events.contains(&t.event_id));
        report.events = purge(&mut db.events, |e| !events.contains(&e.id));
        report.users = purge(&mut db.users, |u| !plan.user_ids.contains(&u.id));
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_event, seed_ticket_type};

    #[tokio::test]
    async fn test_capacity_claim_never_overflows() {
        let store = MemoryStore::new();
        let event = seed_event(&store, Uuid::new_v4()).await;
        let capped = seed_ticket_type(&store, event.id, 10, Some(10)).await;
        let open = seed_ticket_type(&store, event.id, 10, None).await;

        assert!(store.try_claim_ticket_capacity(capped.id, 1).await.unwrap());
        assert!(!store.try_claim_ticket_capacity(capped.id, i32::MAX).await.unwrap());
        assert!(store.try_claim_ticket_capacity(open.id, 1).await.unwrap());
        assert!(!store.try_claim_ticket_capacity(open.id, i32::MAX).await.unwrap());

        let capped = store.find_ticket_type(capped.id).await.unwrap().unwrap();
        let open = store.find_ticket_type(open.id).await.unwrap().unwrap();
        assert_eq!(capped.tickets_sold, 1);
        assert_eq!(open.tickets_sold, 1);
    }
}
