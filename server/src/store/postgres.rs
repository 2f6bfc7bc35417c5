//! PostgreSQL-backed [`Store`].
//!
//! Capacity primitives are single conditional `UPDATE` statements; the only
//! multi-statement operations (automatic seat picking, booking insertion,
//! cascades) run inside a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    BookingFilter, CascadePlan, CascadeReport, EventFilter, SeatFilter, Store, StoreError,
    StoreResult, TicketFilter, WaitlistFilter,
};
use crate::models::{
    Booking, Event, PaymentStatus, PromoCode, Role, Seat, SeatStatus, Ticket, TicketStatus,
    TicketType, User, WaitlistEntry, WaitlistStatus,
};

const USER_COLUMNS: &str = "id, name, email, role, created_at, updated_at";

const EVENT_COLUMNS: &str = "\
    id, organizer_id, name, date, time, description, poster_url, status, \
    ticket_categories, seating_layout, promo_code_ids, created_at, updated_at";

const TICKET_TYPE_COLUMNS: &str = "\
    id, event_id, category, price, max_tickets_per_category, tickets_sold, \
    created_at, updated_at";

const SEAT_COLUMNS: &str =
    "id, event_id, seat_number, section, status, ticket_id, created_at, updated_at";

const PROMO_COLUMNS: &str = "\
    id, event_id, code, discount_type, discount_value, max_uses, current_uses, \
    expiry_date, created_at";

const BOOKING_COLUMNS: &str = "\
    id, event_id, attendee_id, ticket_details, subtotal, discount_amount, \
    total_amount, promo_code_id, payment_status, created_at, updated_at";

const TICKET_COLUMNS: &str =
    "id, booking_id, event_id, ticket_type_id, attendee_id, seat_id, status, created_at";

const WAITLIST_COLUMNS: &str = "\
    id, event_id, ticket_type_id, attendee_id, email, name, attendee_key, status, \
    joined_at, notified_at, position";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505: unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let entity = match db_err.constraint() {
                    Some("uq_seats_event_seat_number") => Some("seat"),
                    Some("uq_promo_codes_event_code") => Some("promo code"),
                    Some("uq_waitlist_active_entry") => Some("waitlist entry"),
                    Some("uq_users_email") => Some("user"),
                    _ => None,
                };
                if let Some(entity) = entity {
                    return StoreError::Duplicate(entity);
                }
            }
        }

        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self, role: Option<Role>) -> StoreResult<Vec<User>> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::user_role IS NULL OR role = $1) \
             ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(role)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO events (id, organizer_id, name, date, time, description, poster_url, \
             status, ticket_categories, seating_layout, promo_code_ids, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.name)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.description)
        .bind(&event.poster_url)
        .bind(event.status)
        .bind(&event.ticket_categories)
        .bind(&event.seating_layout)
        .bind(&event.promo_code_ids)
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        Ok(sqlx::query_as::<_, Event>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE ($1::uuid IS NULL OR organizer_id = $1) \
               AND ($2::event_status IS NULL OR status = $2) \
             ORDER BY date, time, created_at"
        );
        Ok(sqlx::query_as::<_, Event>(&query)
            .bind(filter.organizer_id)
            .bind(filter.status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_event(&self, event: &Event) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET name = $2, date = $3, time = $4, description = $5, \
             poster_url = $6, status = $7, ticket_categories = $8, seating_layout = $9, \
             promo_code_ids = $10, updated_at = $11 \
             WHERE id = $1",
        )
        .bind(event.id)
        .bind(&event.name)
        .bind(event.date)
        .bind(event.time)
        .bind(&event.description)
        .bind(&event.poster_url)
        .bind(event.status)
        .bind(&event.ticket_categories)
        .bind(&event.seating_layout)
        .bind(&event.promo_code_ids)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refresh_event_categories(
        &self,
        event_id: Uuid,
        unassign: Option<Uuid>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET \
               ticket_categories = COALESCE(( \
                 SELECT jsonb_agg(jsonb_build_object( \
                          'ticketTypeId', t.id, 'category', t.category, 'price', t.price::text) \
                        ORDER BY t.created_at) \
                 FROM ticket_types t WHERE t.event_id = $1), '[]'::jsonb), \
               seating_layout = CASE WHEN $2::uuid IS NULL THEN seating_layout ELSE COALESCE(( \
                 SELECT jsonb_agg(CASE WHEN s.value->>'ticketTypeId' = $2::text \
                                       THEN jsonb_set(s.value, '{ticketTypeId}', 'null'::jsonb) \
                                       ELSE s.value END \
                                  ORDER BY s.ordinality) \
                 FROM jsonb_array_elements(seating_layout) WITH ORDINALITY AS s(value, ordinality)), \
                 '[]'::jsonb) END, \
               updated_at = now() \
             WHERE id = $1",
        )
        .bind(event_id)
        .bind(unassign)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn event_ids_for_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM events WHERE organizer_id = $1")
                .bind(organizer_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    async fn insert_ticket_type(&self, ticket_type: &TicketType) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ticket_types (id, event_id, category, price, max_tickets_per_category, \
             tickets_sold, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(ticket_type.id)
        .bind(ticket_type.event_id)
        .bind(&ticket_type.category)
        .bind(ticket_type.price)
        .bind(ticket_type.max_tickets_per_category)
        .bind(ticket_type.tickets_sold)
        .bind(ticket_type.created_at)
        .bind(ticket_type.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_ticket_type(&self, id: Uuid) -> StoreResult<Option<TicketType>> {
        let query = format!("SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE id = $1");
        Ok(sqlx::query_as::<_, TicketType>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_ticket_types(&self, event_id: Option<Uuid>) -> StoreResult<Vec<TicketType>> {
        let query = format!(
            "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types \
             WHERE ($1::uuid IS NULL OR event_id = $1) \
             ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, TicketType>(&query)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_ticket_type(
        &self,
        ticket_type: &TicketType,
    ) -> StoreResult<Option<TicketType>> {
        let query = format!(
            "UPDATE ticket_types SET category = $2, price = $3, \
             max_tickets_per_category = $4, updated_at = $5 \
             WHERE id = $1 AND ($4::int IS NULL OR tickets_sold <= $4) \
             RETURNING {TICKET_TYPE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, TicketType>(&query)
            .bind(ticket_type.id)
            .bind(&ticket_type.category)
            .bind(ticket_type.price)
            .bind(ticket_type.max_tickets_per_category)
            .bind(ticket_type.updated_at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_ticket_type_if_unsold(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM ticket_types WHERE id = $1 \
             AND NOT EXISTS (SELECT 1 FROM tickets WHERE ticket_type_id = $1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_claim_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE ticket_types SET tickets_sold = tickets_sold + $2 \
             WHERE id = $1 \
               AND tickets_sold::bigint + $2 \
                   <= COALESCE(max_tickets_per_category, 2147483647)",
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_ticket_capacity(&self, id: Uuid, quantity: i32) -> StoreResult<()> {
        sqlx::query(
            "UPDATE ticket_types SET tickets_sold = GREATEST(tickets_sold - $2, 0) WHERE id = $1",
        )
        .bind(id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_seats(&self, seats: &[Seat]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for seat in seats {
            sqlx::query(
                "INSERT INTO seats (id, event_id, seat_number, section, status, ticket_id, \
                 created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(seat.id)
            .bind(seat.event_id)
            .bind(&seat.seat_number)
            .bind(&seat.section)
            .bind(seat.status)
            .bind(seat.ticket_id)
            .bind(seat.created_at)
            .bind(seat.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_seat(&self, id: Uuid) -> StoreResult<Option<Seat>> {
        let query = format!("SELECT {SEAT_COLUMNS} FROM seats WHERE id = $1");
        Ok(sqlx::query_as::<_, Seat>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_seats(&self, filter: &SeatFilter) -> StoreResult<Vec<Seat>> {
        let query = format!(
            "SELECT {SEAT_COLUMNS} FROM seats \
             WHERE ($1::uuid IS NULL OR event_id = $1) \
               AND ($2::seat_status IS NULL OR status = $2) \
               AND ($3::text IS NULL OR section = $3) \
             ORDER BY section, seat_number"
        );
        Ok(sqlx::query_as::<_, Seat>(&query)
            .bind(filter.event_id)
            .bind(filter.status)
            .bind(&filter.section)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_seats(&self, event_id: Uuid, status: Option<SeatStatus>) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM seats \
             WHERE event_id = $1 AND ($2::seat_status IS NULL OR status = $2)",
        )
        .bind(event_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_seat_status(
        &self,
        id: Uuid,
        status: SeatStatus,
        ticket_id: Option<Uuid>,
    ) -> StoreResult<Option<Seat>> {
        let query = format!(
            "UPDATE seats SET status = $2, \
             ticket_id = CASE WHEN $2 = 'available'::seat_status THEN NULL \
                              ELSE COALESCE($3, ticket_id) END, \
             updated_at = now() \
             WHERE id = $1 \
             RETURNING {SEAT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Seat>(&query)
            .bind(id)
            .bind(status)
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_seat_unless_occupied(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM seats WHERE id = $1 AND status <> 'occupied'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn try_reserve_seat(
        &self,
        seat_id: Uuid,
        event_id: Uuid,
        ticket_id: Uuid,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE seats SET status = 'reserved', ticket_id = $3, updated_at = now() \
             WHERE id = $1 AND event_id = $2 AND status = 'available'",
        )
        .bind(seat_id)
        .bind(event_id)
        .bind(ticket_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reserve_available_seats(
        &self,
        event_id: Uuid,
        sections: &[String],
        ticket_ids: &[Uuid],
    ) -> StoreResult<Option<Vec<Seat>>> {
        let mut tx = self.pool.begin().await?;

        let seat_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM seats \
             WHERE event_id = $1 AND status = 'available' \
               AND (cardinality($2::text[]) = 0 OR section = ANY($2)) \
             ORDER BY section, seat_number \
             LIMIT $3 \
             FOR UPDATE SKIP LOCKED",
        )
        .bind(event_id)
        .bind(sections)
        .bind(ticket_ids.len() as i64)
        .fetch_all(&mut *tx)
        .await?;

        if seat_ids.len() < ticket_ids.len() {
            tx.rollback().await?;
            return Ok(None);
        }

        let query = format!(
            "UPDATE seats SET status = 'reserved', ticket_id = $2, updated_at = now() \
             WHERE id = $1 RETURNING {SEAT_COLUMNS}"
        );
        let mut reserved = Vec::with_capacity(ticket_ids.len());
        for (seat_id, ticket_id) in seat_ids.iter().zip(ticket_ids) {
            let seat = sqlx::query_as::<_, Seat>(&query)
                .bind(seat_id)
                .bind(ticket_id)
                .fetch_one(&mut *tx)
                .await?;
            reserved.push(seat);
        }
        tx.commit().await?;
        Ok(Some(reserved))
    }

    async fn update_seats_for_tickets(
        &self,
        ticket_ids: &[Uuid],
        status: SeatStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE seats SET status = $2, \
             ticket_id = CASE WHEN $2 = 'available'::seat_status THEN NULL ELSE ticket_id END, \
             updated_at = now() \
             WHERE ticket_id = ANY($1)",
        )
        .bind(ticket_ids)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_promo_code(&self, promo: &PromoCode) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO promo_codes (id, event_id, code, discount_type, discount_value, \
             max_uses, current_uses, expiry_date, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(promo.id)
        .bind(promo.event_id)
        .bind(&promo.code)
        .bind(promo.discount_type)
        .bind(promo.discount_value)
        .bind(promo.max_uses)
        .bind(promo.current_uses)
        .bind(promo.expiry_date)
        .bind(promo.created_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE events SET promo_code_ids = array_append(promo_code_ids, $2) \
             WHERE id = $1 AND NOT ($2 = ANY(promo_code_ids))",
        )
        .bind(promo.event_id)
        .bind(promo.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_promo_code(&self, event_id: Uuid, code: &str) -> StoreResult<Option<PromoCode>> {
        let query =
            format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE event_id = $1 AND code = $2");
        Ok(sqlx::query_as::<_, PromoCode>(&query)
            .bind(event_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_promo_code_by_id(&self, id: Uuid) -> StoreResult<Option<PromoCode>> {
        let query = format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE id = $1");
        Ok(sqlx::query_as::<_, PromoCode>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_promo_codes(&self, event_id: Uuid) -> StoreResult<Vec<PromoCode>> {
        let query = format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE event_id = $1 ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, PromoCode>(&query)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_promo_code(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let event_id =
            sqlx::query_scalar::<_, Uuid>("DELETE FROM promo_codes WHERE id = $1 RETURNING event_id")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(event_id) = event_id else {
            tx.rollback().await?;
            return Ok(false);
        };
        sqlx::query("UPDATE events SET promo_code_ids = array_remove(promo_code_ids, $2) WHERE id = $1")
            .bind(event_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn try_increment_promo_usage(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE promo_codes SET current_uses = current_uses + 1 \
             WHERE id = $1 \
               AND (max_uses IS NULL OR current_uses < max_uses) \
               AND (expiry_date IS NULL OR expiry_date > $2)",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_promo_usage(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE promo_codes SET current_uses = GREATEST(current_uses - 1, 0) WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_booking(&self, booking: &Booking, tickets: &[Ticket]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO bookings (id, event_id, attendee_id, ticket_details, subtotal, \
             discount_amount, total_amount, promo_code_id, payment_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(booking.id)
        .bind(booking.event_id)
        .bind(booking.attendee_id)
        .bind(&booking.ticket_details)
        .bind(booking.subtotal)
        .bind(booking.discount_amount)
        .bind(booking.total_amount)
        .bind(booking.promo_code_id)
        .bind(booking.payment_status)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        for ticket in tickets {
            sqlx::query(
                "INSERT INTO tickets (id, booking_id, event_id, ticket_type_id, attendee_id, \
                 seat_id, status, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(ticket.id)
            .bind(ticket.booking_id)
            .bind(ticket.event_id)
            .bind(ticket.ticket_type_id)
            .bind(ticket.attendee_id)
            .bind(ticket.seat_id)
            .bind(ticket.status)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        Ok(sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let query = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ($1::uuid IS NULL OR attendee_id = $1) \
               AND ($2::uuid[] IS NULL OR event_id = ANY($2)) \
             ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, Booking>(&query)
            .bind(filter.attendee_id)
            .bind(&filter.event_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn transition_booking(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> StoreResult<Option<Booking>> {
        let query = format!(
            "UPDATE bookings SET payment_status = $3, updated_at = now() \
             WHERE id = $1 AND payment_status = $2 \
             RETURNING {BOOKING_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Booking>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> StoreResult<Vec<Ticket>> {
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets \
             WHERE ($1::uuid IS NULL OR booking_id = $1) \
               AND ($2::uuid IS NULL OR event_id = $2) \
               AND ($3::uuid IS NULL OR ticket_type_id = $3) \
             ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, Ticket>(&query)
            .bind(filter.booking_id)
            .bind(filter.event_id)
            .bind(filter.ticket_type_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn set_ticket_status_for_booking(
        &self,
        booking_id: Uuid,
        status: TicketStatus,
    ) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE tickets SET status = $2 WHERE booking_id = $1")
            .bind(booking_id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_waitlist_entry(&self, entry: &WaitlistEntry) -> StoreResult<WaitlistEntry> {
        let query = format!(
            "INSERT INTO waitlist (id, event_id, ticket_type_id, attendee_id, email, name, \
             attendee_key, status, joined_at, notified_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {WAITLIST_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, WaitlistEntry>(&query)
            .bind(entry.id)
            .bind(entry.event_id)
            .bind(entry.ticket_type_id)
            .bind(entry.attendee_id)
            .bind(&entry.email)
            .bind(&entry.name)
            .bind(&entry.attendee_key)
            .bind(entry.status)
            .bind(entry.joined_at)
            .bind(entry.notified_at)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_waitlist(&self, filter: &WaitlistFilter) -> StoreResult<Vec<WaitlistEntry>> {
        let query = format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist \
             WHERE ($1::uuid IS NULL OR event_id = $1) \
               AND ($2::text IS NULL OR attendee_key = $2) \
               AND ($3::waitlist_status IS NULL OR status = $3) \
             ORDER BY joined_at, position"
        );
        Ok(sqlx::query_as::<_, WaitlistEntry>(&query)
            .bind(filter.event_id)
            .bind(&filter.attendee_key)
            .bind(filter.status)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn oldest_waiting(&self, event_id: Uuid, limit: i64) -> StoreResult<Vec<WaitlistEntry>> {
        let query = format!(
            "SELECT {WAITLIST_COLUMNS} FROM waitlist \
             WHERE event_id = $1 AND status = $2 \
             ORDER BY joined_at, position \
             LIMIT $3"
        );
        Ok(sqlx::query_as::<_, WaitlistEntry>(&query)
            .bind(event_id)
            .bind(WaitlistStatus::Waiting)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_waitlist_entry(
        &self,
        event_id: Uuid,
        attendee_key: &str,
        entry_id: Option<Uuid>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM waitlist \
             WHERE event_id = $1 AND attendee_key = $2 AND status IN ('waiting', 'notified') \
               AND ($3::uuid IS NULL OR id = $3)",
        )
        .bind(event_id)
        .bind(attendee_key)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_waitlist_notified(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE waitlist SET status = 'notified', notified_at = $2 \
             WHERE id = $1 AND status = 'waiting'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_waitlist_converted(
        &self,
        event_id: Uuid,
        attendee_key: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE waitlist SET status = 'converted' \
             WHERE event_id = $1 AND attendee_key = $2 AND status IN ('waiting', 'notified')",
        )
        .bind(event_id)
        .bind(attendee_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn apply_cascade(&self, plan: &CascadePlan) -> StoreResult<CascadeReport> {
        let mut tx = self.pool.begin().await?;
        let events = &plan.event_ids;
        let mut report = CascadeReport::default();

        // Children first, so a failure part-way leaves no orphans once rolled back.
        for (table, counter) in [
            ("tickets", &mut report.tickets),
            ("bookings", &mut report.bookings),
            ("waitlist", &mut report.waitlist_entries),
            ("promo_codes", &mut report.promo_codes),
            ("seats", &mut report.seats),
            ("ticket_types", &mut report.ticket_types),
        ] {
            let query = format!("DELETE FROM {table} WHERE event_id = ANY($1)");
            *counter = sqlx::query(&query)
                .bind(events)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        report.events = sqlx::query("DELETE FROM events WHERE id = ANY($1)")
            .bind(events)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        report.users = sqlx::query("DELETE FROM users WHERE id = ANY($1)")
            .bind(&plan.user_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(report)
    }
}
