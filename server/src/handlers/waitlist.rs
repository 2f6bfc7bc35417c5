//! Waitlist handlers. Joining and leaving work for guests identified by
//! email as well as signed-in attendees.

use axum::extract::{Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthContext, MaybeAuth};
use crate::services::waitlist::{JoinWaitlist, WaitlistIdentity};
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistListParams {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveParams {
    pub event_id: Uuid,
    pub email: Option<String>,
    /// Required for guests: the id returned when they joined.
    pub entry_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub event_id: Uuid,
    pub batch_size: Option<i64>,
}

/// POST /api/waitlist
pub async fn join_waitlist(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Json(input): Json<JoinWaitlist>,
) -> AppResult<Response> {
    let identity = WaitlistIdentity::resolve(auth, input.email.clone(), input.name.clone())?;
    let entry = state.services.waitlist.join(identity, input).await?;
    Ok(created(entry, "Joined waitlist"))
}

/// GET /api/waitlist?eventId=
pub async fn list_waitlist(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(params): Query<WaitlistListParams>,
) -> AppResult<Response> {
    let entries = state.services.waitlist.list(&ctx, params.event_id).await?;
    Ok(success(entries, "Waitlist retrieved"))
}

/// DELETE /api/waitlist?eventId=&email=&entryId=
pub async fn leave_waitlist(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Query(params): Query<LeaveParams>,
) -> AppResult<Response> {
    let identity = WaitlistIdentity::resolve(auth, params.email, None)?;
    state
        .services
        .waitlist
        .leave(&identity, params.event_id, params.entry_id)
        .await?;
    Ok(empty_success("Left waitlist"))
}

/// POST /api/waitlist/notify
pub async fn notify_waitlist(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(request): Json<NotifyRequest>,
) -> AppResult<Response> {
    let outcome = state
        .services
        .waitlist
        .notify_batch_as(&ctx, request.event_id, request.batch_size)
        .await?;
    Ok(success(outcome, "Waitlist notified"))
}
