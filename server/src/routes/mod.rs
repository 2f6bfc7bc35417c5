use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    bookings, events, health_check, organizers, promo_codes, seats, ticket_types, waitlist,
};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let include_hsts = state.config.include_hsts;
    let cors = create_cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(include_hsts))
        .layer(cors)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(events::create_event).get(events::list_events))
        .route(
            "/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/events/:id/availability", get(events::check_availability))
        .route(
            "/ticket-types",
            post(ticket_types::create_ticket_type).get(ticket_types::list_ticket_types),
        )
        .route(
            "/ticket-types/:id",
            put(ticket_types::update_ticket_type).delete(ticket_types::delete_ticket_type),
        )
        .route("/seats", post(seats::create_seats).get(seats::list_seats))
        .route("/seats/:id", put(seats::update_seat).delete(seats::delete_seat))
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route("/bookings/:id", get(bookings::get_booking))
        .route("/bookings/:id/status", put(bookings::update_booking_status))
        .route(
            "/promo-codes",
            post(promo_codes::create_promo_code).get(promo_codes::get_promo_codes),
        )
        .route("/promo-codes/:id", delete(promo_codes::delete_promo_code))
        .route(
            "/waitlist",
            post(waitlist::join_waitlist)
                .get(waitlist::list_waitlist)
                .delete(waitlist::leave_waitlist),
        )
        .route("/waitlist/notify", post(waitlist::notify_waitlist))
        .route(
            "/organizers",
            get(organizers::list_organizers).post(organizers::create_organizer),
        )
        .route("/organizers/:id", delete(organizers::delete_organizer))
}
