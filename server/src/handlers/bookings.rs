use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::models::PaymentStatus;
use crate::services::booking::CreateBooking;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListParams {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingStatusChange {
    pub payment_status: PaymentStatus,
}

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<CreateBooking>,
) -> AppResult<Response> {
    let receipt = state.services.bookings.create(&ctx, input).await?;
    Ok(created(receipt, "Booking created"))
}

/// GET /api/bookings?eventId=
pub async fn list_bookings(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(params): Query<BookingListParams>,
) -> AppResult<Response> {
    let bookings = state.services.bookings.list(&ctx, params.event_id).await?;
    Ok(success(bookings, "Bookings retrieved"))
}

/// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let receipt = state.services.bookings.get(&ctx, id).await?;
    Ok(success(receipt, "Booking retrieved"))
}

/// PUT /api/bookings/:id/status
pub async fn update_booking_status(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(change): Json<BookingStatusChange>,
) -> AppResult<Response> {
    let booking = state
        .services
        .bookings
        .update_status(&ctx, id, change.payment_status)
        .await?;
    Ok(success(booking, "Booking status updated"))
}
