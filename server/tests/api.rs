use std::str::FromStr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pace_server::auth::issue_token;
use pace_server::config::Config;
use pace_server::models::Role;
use pace_server::routes::create_routes;
use pace_server::services::LogNotifier;
use pace_server::state::AppState;
use pace_server::store::MemoryStore;

struct TestApp {
    router: Router,
    secret: String,
}

impl TestApp {
    fn new() -> Self {
        let config = Config::for_tests();
        let secret = config.jwt_secret.clone();
        let state = AppState::new(config, Arc::new(MemoryStore::new()), Arc::new(LogNotifier));
        Self {
            router: create_routes(state),
            secret,
        }
    }

    fn token(&self, role: Role) -> String {
        issue_token(Uuid::new_v4(), role, &self.secret).unwrap()
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Creates an event with one "General" category at `price` and returns
    /// `(event_id, ticket_type_id)`.
    async fn create_event(&self, organizer: &str, price: u32) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/events",
                Some(organizer),
                Some(json!({
                    "name": "Dockside Sessions",
                    "date": "2031-08-09",
                    "time": "20:00:00",
                    "ticketCategories": [
                        { "category": "General", "price": price, "maxTicketsPerCategory": 100 }
                    ],
                    "seatingLayout": [
                        { "section": "Floor", "category": { "name": "general" } }
                    ],
                    "promoCodes": [
                        { "code": "save10", "discountType": "percentage", "discountValue": 10, "maxUses": 5 }
                    ]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let event_id = body["data"]["eventId"].as_str().unwrap().to_string();
        let ticket_type_id = body["data"]["event"]["ticketCategories"][0]["ticketTypeId"]
            .as_str()
            .unwrap()
            .to_string();
        (event_id, ticket_type_id)
    }

    async fn create_seats(&self, organizer: &str, event_id: &str, numbers: &[&str]) -> Vec<String> {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/seats",
                Some(organizer),
                Some(json!({ "eventId": event_id, "seatNumbers": numbers, "section": "Floor" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap().to_string())
            .collect()
    }
}

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

#[tokio::test]
async fn test_health_check_carries_security_headers() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["service"], "pace-api");
}

#[tokio::test]
async fn test_event_writes_require_organizer() {
    let app = TestApp::new();
    let event = json!({ "name": "x", "date": "2031-01-01", "time": "10:00:00" });

    let (status, body) = app
        .send(Method::POST, "/api/events", None, Some(event.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTH_ERROR");

    let attendee = app.token(Role::Attendee);
    let (status, body) = app
        .send(Method::POST, "/api/events", Some(&attendee), Some(event))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app
        .send(Method::POST, "/api/events", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_event_is_publicly_readable_and_owner_only_writable() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, _) = app.create_event(&owner, 30).await;

    let (status, body) = app
        .send(Method::GET, &format!("/api/events/{event_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["seatingLayout"][0]["section"], "Floor");
    assert_eq!(body["data"]["promoCodeIds"].as_array().unwrap().len(), 1);

    let rival = app.token(Role::Organizer);
    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/api/events/{event_id}"),
            Some(&rival),
            Some(json!({ "name": "Hijacked" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::DELETE, &format!("/api/events/{event_id}"), Some(&owner), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["events"], 1);
    assert_eq!(body["data"]["promoCodes"], 1);

    let (status, body) = app
        .send(Method::GET, &format!("/api/events/{event_id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "EVENT_NOT_FOUND");
}

#[tokio::test]
async fn test_booking_with_promo_code() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, ticket_type_id) = app.create_event(&owner, 25).await;

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/promo-codes?eventId={event_id}&code=Save10"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["code"], "SAVE10");

    let attendee = app.token(Role::Attendee);
    let (status, body) = app
        .send(
            Method::POST,
            "/api/bookings",
            Some(&attendee),
            Some(json!({
                "eventId": event_id,
                "items": [{ "ticketTypeId": ticket_type_id, "quantity": 2 }],
                "promoCode": "SAVE10"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let booking = &body["data"]["booking"];
    assert_eq!(decimal(&booking["subtotal"]), Decimal::from(50));
    assert_eq!(decimal(&booking["discountAmount"]), Decimal::from(5));
    assert_eq!(decimal(&booking["totalAmount"]), Decimal::from(45));
    assert_eq!(booking["paymentStatus"], "pending");
    assert_eq!(body["data"]["tickets"].as_array().unwrap().len(), 2);

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/promo-codes?eventId={event_id}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["currentUses"], 1);
}

#[tokio::test]
async fn test_unknown_promo_code_is_not_found() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, _) = app.create_event(&owner, 25).await;

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/api/promo-codes?eventId={event_id}&code=NOPE"),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PROMO_NOT_FOUND");
}

#[tokio::test]
async fn test_huge_booking_quantity_is_rejected() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, ticket_type_id) = app.create_event(&owner, 25).await;
    let buyer = app.token(Role::Attendee);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/bookings",
            Some(&buyer),
            Some(json!({
                "eventId": event_id,
                "items": [{ "ticketTypeId": ticket_type_id, "quantity": i32::MAX }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOO_MANY_TICKETS");
}

#[tokio::test]
async fn test_two_buyers_race_for_one_seat() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, ticket_type_id) = app.create_event(&owner, 20).await;
    let seat_id = app.create_seats(&owner, &event_id, &["F1"]).await.remove(0);

    let order = json!({
        "eventId": event_id,
        "items": [{ "ticketTypeId": ticket_type_id, "quantity": 1, "seatIds": [seat_id] }]
    });
    let (first, second) = (app.token(Role::Attendee), app.token(Role::Attendee));
    let (a, b) = tokio::join!(
        app.send(Method::POST, "/api/bookings", Some(&first), Some(order.clone())),
        app.send(Method::POST, "/api/bookings", Some(&second), Some(order.clone())),
    );

    let statuses = [a.0, b.0];
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CREATED).count(),
        1,
        "{a:?} {b:?}"
    );
    let loser = if a.0 == StatusCode::CREATED { b.1 } else { a.1 };
    assert_eq!(loser["code"], "CAPACITY_EXCEEDED");

    let (_, body) = app
        .send(
            Method::GET,
            &format!("/api/events/{event_id}/availability?ticketTypeId={ticket_type_id}"),
            None,
            None,
        )
        .await;
    assert_eq!(body["data"]["available"], false);
    assert_eq!(body["data"]["remaining"], 0);
}

#[tokio::test]
async fn test_booking_status_lifecycle() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, ticket_type_id) = app.create_event(&owner, 20).await;
    app.create_seats(&owner, &event_id, &["F1"]).await;

    let attendee = app.token(Role::Attendee);
    let (_, body) = app
        .send(
            Method::POST,
            "/api/bookings",
            Some(&attendee),
            Some(json!({
                "eventId": event_id,
                "items": [{ "ticketTypeId": ticket_type_id, "quantity": 1 }]
            })),
        )
        .await;
    let booking_id = body["data"]["booking"]["id"].as_str().unwrap().to_string();
    let status_uri = format!("/api/bookings/{booking_id}/status");

    let (status, body) = app
        .send(
            Method::PUT,
            &status_uri,
            Some(&attendee),
            Some(json!({ "paymentStatus": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = app
        .send(Method::GET, &format!("/api/seats?eventId={event_id}"), None, None)
        .await;
    assert_eq!(body["data"][0]["status"], "occupied");

    let (status, _) = app
        .send(
            Method::PUT,
            &status_uri,
            Some(&attendee),
            Some(json!({ "paymentStatus": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::PUT,
            &status_uri,
            Some(&owner),
            Some(json!({ "paymentStatus": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::PUT,
            &status_uri,
            Some(&owner),
            Some(json!({ "paymentStatus": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (_, body) = app
        .send(Method::GET, &format!("/api/seats?eventId={event_id}"), None, None)
        .await;
    assert_eq!(body["data"][0]["status"], "available");
}

#[tokio::test]
async fn test_waitlist_join_notify_and_leave() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, _) = app.create_event(&owner, 20).await;
    let join = json!({ "eventId": event_id, "email": "fan@example.com", "name": "Fan" });

    let (status, body) = app
        .send(Method::POST, "/api/waitlist", None, Some(join.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "waiting");
    let entry_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::POST, "/api/waitlist", None, Some(join)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ALREADY_ON_WAITLIST");

    let notify = json!({ "eventId": event_id });
    let (status, body) = app
        .send(Method::POST, "/api/waitlist/notify", Some(&owner), Some(notify.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "NO_CAPACITY");

    let attendee = app.token(Role::Attendee);
    let (status, _) = app
        .send(Method::POST, "/api/waitlist/notify", Some(&attendee), Some(notify.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.create_seats(&owner, &event_id, &["F1", "F2"]).await;
    let (status, body) = app
        .send(Method::POST, "/api/waitlist/notify", Some(&owner), Some(notify))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["notified"], 1);

    let (_, body) = app
        .send(
            Method::GET,
            &format!("/api/waitlist?eventId={event_id}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(body["data"][0]["status"], "notified");

    let bare = format!("/api/waitlist?eventId={event_id}&email=fan@example.com");
    let (status, _) = app.send(Method::DELETE, &bare, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let guessed = format!("{bare}&entryId={}", Uuid::new_v4());
    let (status, _) = app.send(Method::DELETE, &guessed, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = app
        .send(
            Method::GET,
            &format!("/api/waitlist?eventId={event_id}"),
            Some(&owner),
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let leave = format!("{bare}&entryId={entry_id}");
    let (status, _) = app.send(Method::DELETE, &leave, None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = app.send(Method::DELETE, &leave, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "WAITLIST_ENTRY_NOT_FOUND");
}

#[tokio::test]
async fn test_duplicate_seats_are_rejected() {
    let app = TestApp::new();
    let owner = app.token(Role::Organizer);
    let (event_id, _) = app.create_event(&owner, 20).await;
    app.create_seats(&owner, &event_id, &["F1"]).await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/seats",
            Some(&owner),
            Some(json!({ "eventId": event_id, "seatNumbers": ["F2", "F1"], "section": "Floor" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_SEAT");

    let (_, body) = app
        .send(Method::GET, &format!("/api/seats?eventId={event_id}"), None, None)
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_manages_organizers() {
    let app = TestApp::new();
    let admin = app.token(Role::Admin);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/organizers",
            Some(&admin),
            Some(json!({ "name": "Lena Ortiz", "email": "lena@venue.io" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let organizer_id = body["data"]["id"].as_str().unwrap().to_string();

    let organizer = app.token(Role::Organizer);
    let (status, _) = app
        .send(Method::GET, "/api/organizers", Some(&organizer), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Method::DELETE,
            &format!("/api/organizers/{organizer_id}"),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"], 1);
}
