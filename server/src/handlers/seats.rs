use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::models::SeatStatus;
use crate::services::inventory::NewSeats;
use crate::state::AppState;
use crate::store::SeatFilter;
use crate::utils::error::AppResult;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatListParams {
    pub event_id: Option<Uuid>,
    pub status: Option<SeatStatus>,
    pub section: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatStatusChange {
    pub status: SeatStatus,
    pub ticket_id: Option<Uuid>,
}

/// POST /api/seats
pub async fn create_seats(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<NewSeats>,
) -> AppResult<Response> {
    let seats = state.services.inventory.create_seats(&ctx, input).await?;
    Ok(created(seats, "Seats created"))
}

/// GET /api/seats?eventId=&status=&section=
pub async fn list_seats(
    State(state): State<AppState>,
    Query(params): Query<SeatListParams>,
) -> AppResult<Response> {
    let seats = state
        .services
        .inventory
        .list_seats(SeatFilter {
            event_id: params.event_id,
            status: params.status,
            section: params.section,
        })
        .await?;
    Ok(success(seats, "Seats retrieved"))
}

/// PUT /api/seats/:id
pub async fn update_seat(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(change): Json<SeatStatusChange>,
) -> AppResult<Response> {
    let seat = state
        .services
        .inventory
        .update_seat_status(&ctx, id, change.status, change.ticket_id)
        .await?;
    Ok(success(seat, "Seat updated"))
}

/// DELETE /api/seats/:id
pub async fn delete_seat(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    state.services.inventory.delete_seat(&ctx, id).await?;
    Ok(empty_success("Seat deleted"))
}
