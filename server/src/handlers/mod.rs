use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod bookings;
pub mod events;
pub mod organizers;
pub mod promo_codes;
pub mod seats;
pub mod ticket_types;
pub mod waitlist;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "pace-api",
    };

    success(payload, "Health check successful")
}
