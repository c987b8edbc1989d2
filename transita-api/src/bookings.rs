use axum::{extract::State, http::StatusCode, Json};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use transita_booking::{BookingReceipt, BookingRequest};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub trip_id: Uuid,
    pub passenger_name: String,
    pub seat: Option<String>,
    pub boarding_stop: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub payment_method: Option<String>,
}

/// POST /v1/bookings
/// Atomically create one ticket and its pending payment for the
/// authenticated buyer.
pub async fn create_booking(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), AppError> {
    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

    let claims = token_data.claims;

    let receipt = state
        .booking
        .book(BookingRequest {
            buyer_id: claims.sub,
            trip_id: req.trip_id,
            passenger_name: req.passenger_name,
            seat: req.seat,
            boarding_stop: req.boarding_stop,
            coupon_id: req.coupon_id,
            payment_method: req.payment_method,
        })
        .await?;

    info!(ticket_code = %receipt.ticket_code, "booking created");

    Ok((StatusCode::CREATED, Json(receipt)))
}
