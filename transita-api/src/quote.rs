use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use transita_catalog::PriceBreakdown;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    pub trip_id: Uuid,
    pub coupon_id: Option<Uuid>,
}

/// GET /v1/quote?trip_id=&coupon_id=
/// Price breakdown with full validation, no side effects.
pub async fn get_quote(
    State(state): State<AppState>,
    Query(params): Query<QuoteParams>,
) -> Result<Json<PriceBreakdown>, AppError> {
    let breakdown = state
        .booking
        .quote(params.trip_id, params.coupon_id)
        .await?;
    Ok(Json(breakdown))
}
