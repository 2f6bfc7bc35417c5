use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::services::inventory::{NewTicketType, TicketTypeChanges};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketTypeListParams {
    pub event_id: Option<Uuid>,
}

/// POST /api/ticket-types
pub async fn create_ticket_type(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<NewTicketType>,
) -> AppResult<Response> {
    let ticket_type = state.services.inventory.create_ticket_type(&ctx, input).await?;
    Ok(created(ticket_type, "Ticket type created"))
}

/// GET /api/ticket-types?eventId=
pub async fn list_ticket_types(
    State(state): State<AppState>,
    Query(params): Query<TicketTypeListParams>,
) -> AppResult<Response> {
    let ticket_types = state.services.inventory.list_ticket_types(params.event_id).await?;
    Ok(success(ticket_types, "Ticket types retrieved"))
}

/// PUT /api/ticket-types/:id
pub async fn update_ticket_type(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(changes): Json<TicketTypeChanges>,
) -> AppResult<Response> {
    let ticket_type = state
        .services
        .inventory
        .update_ticket_type(&ctx, id, changes)
        .await?;
    Ok(success(ticket_type, "Ticket type updated"))
}

/// DELETE /api/ticket-types/:id
pub async fn delete_ticket_type(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    state.services.inventory.delete_ticket_type(&ctx, id).await?;
    Ok(empty_success("Ticket type deleted"))
}
