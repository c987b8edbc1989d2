use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use transita_api::bookings::Claims;
use transita_api::state::AuthConfig;
use transita_api::{app, AppState};
use transita_booking::{BookingCoordinator, SettlementProcessor};
use transita_core::{Coupon, TicketStore, Trip};
use transita_store::MemoryStore;

const TEST_SECRET: &str = "integration-test-secret";

struct TestApp {
    router: axum::Router,
    store: Arc<MemoryStore>,
    trip_id: Uuid,
    coupon_id: Uuid,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());

    let trip = Trip::new(
        "CDMX-GDL".to_string(),
        Utc::now() + Duration::days(3),
        40,
        10_000,
        2_000,
    );
    let trip_id = trip.id;
    store.insert_trip(trip);

    let coupon = Coupon::percentage("DIEZ".to_string(), 10);
    let coupon_id = coupon.id;
    store.insert_coupon(coupon);

    let dyn_store: Arc<dyn TicketStore> = store.clone();
    let (outbox_tx, _outbox_rx) = tokio::sync::mpsc::channel(16);

    let state = AppState {
        store: dyn_store.clone(),
        booking: Arc::new(BookingCoordinator::new(dyn_store.clone())),
        settlement: Arc::new(SettlementProcessor::new(dyn_store, outbox_tx)),
        auth: AuthConfig {
            secret: TEST_SECRET.to_string(),
            expiration: 3600,
        },
    };

    TestApp {
        router: app(state),
        store,
        trip_id,
        coupon_id,
    }
}

fn buyer_token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: "buyer".to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(router: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn book_ticket(app: &TestApp) -> Value {
    let mut req = json_post(
        "/v1/bookings",
        json!({
            "trip_id": app.trip_id,
            "passenger_name": "Ana Torres",
            "seat": "07B",
            "boarding_stop": "Terminal Norte"
        }),
    );
    req.headers_mut().insert(
        "authorization",
        format!("Bearer {}", buyer_token("buyer-1")).parse().unwrap(),
    );

    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_quote_with_coupon() {
    let app = test_app();
    let uri = format!("/v1/quote?trip_id={}&coupon_id={}", app.trip_id, app.coupon_id);
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_fare_cents"], 10_000);
    assert_eq!(body["discount_cents"], 1_000);
    assert_eq!(body["subtotal_cents"], 11_000);
    assert_eq!(body["vat_cents"], 1_760);
    assert_eq!(body["total_cents"], 12_760);
}

#[tokio::test]
async fn test_quote_unknown_trip_is_404() {
    let app = test_app();
    let uri = format!("/v1/quote?trip_id={}", Uuid::new_v4());
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();

    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_requires_token() {
    let app = test_app();
    let req = json_post(
        "/v1/bookings",
        json!({
            "trip_id": app.trip_id,
            "passenger_name": "Ana Torres"
        }),
    );

    let (status, _) = send(&app.router, req).await;
    // Missing Authorization header is rejected before the handler runs
    assert_ne!(status, StatusCode::CREATED);
    assert!(status.is_client_error());
}

#[tokio::test]
async fn test_booking_creates_pending_ticket() {
    let app = test_app();
    let body = book_ticket(&app).await;

    assert_eq!(body["status"], "PENDING_PAYMENT");
    assert!(body["ticket_code"].as_str().unwrap().starts_with("TKT-"));
    assert!(body["payment_code"].as_str().unwrap().starts_with("PAY-"));
    assert_eq!(body["qr_payload"].as_str().unwrap().len(), 64);
    assert_eq!(body["breakdown"]["total_cents"], 13_920);

    let trip = app.store.get_trip(app.trip_id).await.unwrap().unwrap();
    assert_eq!(trip.seats_available, 39);
}

#[tokio::test]
async fn test_confirmation_settles_payment() {
    let app = test_app();
    let booking = book_ticket(&app).await;
    let payment_code = booking["payment_code"].as_str().unwrap().to_string();
    let ticket_code = booking["ticket_code"].as_str().unwrap().to_string();

    let req = json_post(
        "/v1/payments/confirmation",
        json!({
            "payment_code": payment_code,
            "transaction_id": "txn-987",
            "approved": true,
            "amount_cents": 13_920,
            "provider": "gateway-x"
        }),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "CAPTURED");
    assert_eq!(body["tickets"][0]["ticket_code"], ticket_code);
    assert_eq!(body["tickets"][0]["status"], "PAID");

    let trip = app.store.get_trip(app.trip_id).await.unwrap().unwrap();
    assert_eq!(trip.seats_sold, 1);

    // Second delivery of the same confirmation: no further mutation.
    let req = json_post(
        "/v1/payments/confirmation",
        json!({
            "payment_code": payment_code,
            "transaction_id": "txn-987",
            "approved": true
        }),
    );
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let trip = app.store.get_trip(app.trip_id).await.unwrap().unwrap();
    assert_eq!(trip.seats_sold, 1);
}

#[tokio::test]
async fn test_rejection_releases_seat() {
    let app = test_app();
    let booking = book_ticket(&app).await;
    let payment_code = booking["payment_code"].as_str().unwrap();

    let req = json_post(
        "/v1/payments/confirmation",
        json!({
            "payment_code": payment_code,
            "transaction_id": "txn-111",
            "approved": false
        }),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "REJECTED");
    assert_eq!(body["tickets"][0]["status"], "PENDING_PAYMENT");

    let trip = app.store.get_trip(app.trip_id).await.unwrap().unwrap();
    assert_eq!(trip.seats_available, 40);
    assert_eq!(trip.seats_sold, 0);
}

#[tokio::test]
async fn test_simulate_approves_payment() {
    let app = test_app();
    let booking = book_ticket(&app).await;
    let payment_code = booking["payment_code"].as_str().unwrap();

    let req = json_post(
        "/v1/payments/simulate",
        json!({ "payment_code": payment_code }),
    );
    let (status, body) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_status"], "CAPTURED");
}

#[tokio::test]
async fn test_unknown_payment_is_404() {
    let app = test_app();
    let req = json_post(
        "/v1/payments/confirmation",
        json!({
            "payment_code": "PAY-20990101-NADIE0",
            "transaction_id": "txn-404",
            "approved": true
        }),
    );
    let (status, _) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
