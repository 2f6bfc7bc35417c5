//! Admin-only organizer management.

use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::services::organizers::NewOrganizer;
use crate::state::AppState;
use crate::utils::error::AppResult;
use crate::utils::response::{created, success};

/// GET /api/organizers
pub async fn list_organizers(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let organizers = state.services.organizers.list(&ctx).await?;
    Ok(success(organizers, "Organizers retrieved"))
}

/// POST /api/organizers
pub async fn create_organizer(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<NewOrganizer>,
) -> AppResult<Response> {
    let organizer = state.services.organizers.create(&ctx, input).await?;
    Ok(created(organizer, "Organizer created"))
}

/// DELETE /api/organizers/:id
pub async fn delete_organizer(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let report = state.services.organizers.delete(&ctx, id).await?;
    Ok(success(report, "Organizer deleted"))
}
