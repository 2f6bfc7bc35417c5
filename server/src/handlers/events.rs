//! Event handlers. Reads are public; writes require the owning organizer or
//! an admin.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::models::{Event, EventStatus};
use crate::services::events::{CreateEvent, UpdateEvent};
use crate::state::AppState;
use crate::store::EventFilter;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListParams {
    pub organizer_id: Option<Uuid>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityParams {
    pub ticket_type_id: Uuid,
    #[serde(default = "one")]
    pub quantity: i64,
}

fn one() -> i64 {
    1
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EventCreated {
    event_id: Uuid,
    event: Event,
}

/// POST /api/events
pub async fn create_event(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<CreateEvent>,
) -> AppResult<Response> {
    let event = state.services.events.create(&ctx, input).await?;
    Ok(created(
        EventCreated {
            event_id: event.id,
            event,
        },
        "Event created",
    ))
}

/// GET /api/events?organizerId=&status=
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventListParams>,
) -> AppResult<Response> {
    let events = state
        .services
        .events
        .list(EventFilter {
            organizer_id: params.organizer_id,
            status: params.status,
        })
        .await?;
    Ok(success(events, "Events retrieved"))
}

/// GET /api/events/:id
pub async fn get_event(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Response> {
    let event = state.services.events.get(id).await?;
    Ok(success(event, "Event retrieved"))
}

/// PUT /api/events/:id
pub async fn update_event(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Json(changes): Json<UpdateEvent>,
) -> AppResult<Response> {
    let event = state.services.events.update(&ctx, id, changes).await?;
    Ok(success(event, "Event updated"))
}

/// DELETE /api/events/:id
pub async fn delete_event(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let report = state.services.events.delete(&ctx, id).await?;
    Ok(success(report, "Event deleted"))
}

/// GET /api/events/:id/availability?ticketTypeId=&quantity=
pub async fn check_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<AvailabilityParams>,
) -> AppResult<Response> {
    let availability = state
        .services
        .inventory
        .check_availability(id, params.ticket_type_id, params.quantity)
        .await?;
    Ok(success(availability, "Availability checked"))
}
