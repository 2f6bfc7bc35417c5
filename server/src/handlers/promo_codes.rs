//! Promo code handlers. `GET` with a `code` validates it for checkout and
//! is open to anyone; without one it lists the event's codes for managers.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{AuthContext, MaybeAuth};
use crate::services::promo::NewPromoCode;
use crate::state::AppState;
use crate::utils::error::{AppError, AppResult};
use crate::utils::response::{created, empty_success, success};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoParams {
    pub event_id: Uuid,
    pub code: Option<String>,
}

/// POST /api/promo-codes
pub async fn create_promo_code(
    State(state): State<AppState>,
    ctx: AuthContext,
    Json(input): Json<NewPromoCode>,
) -> AppResult<Response> {
    let promo = state.services.promos.create(&ctx, input).await?;
    Ok(created(promo, "Promo code created"))
}

/// GET /api/promo-codes?eventId=&code=
pub async fn get_promo_codes(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Query(params): Query<PromoParams>,
) -> AppResult<Response> {
    if let Some(code) = params.code {
        let quote = state
            .services
            .promos
            .validate(params.event_id, &code, Utc::now())
            .await?;
        return Ok(success(quote, "Promo code is valid"));
    }

    let ctx = auth.ok_or_else(|| AppError::AuthError("Missing or malformed bearer token".into()))?;
    let promos = state.services.promos.list(&ctx, params.event_id).await?;
    Ok(success(promos, "Promo codes retrieved"))
}

/// DELETE /api/promo-codes/:id
pub async fn delete_promo_code(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    state.services.promos.delete(&ctx, id).await?;
    Ok(empty_success("Promo code deleted"))
}
