use axum::{extract::State, Json};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use transita_booking::{SettlementRequest, SettlementResult};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConfirmationRequest {
    pub payment_code: String,
    pub transaction_id: String,
    pub approved: bool,
    pub amount_cents: Option<i64>,
    pub provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimulateRequest {
    pub payment_code: String,
}

/// POST /v1/payments/confirmation
/// External provider callback; unauthenticated, delivered at least once.
pub async fn confirm_payment(
    State(state): State<AppState>,
    Json(req): Json<ConfirmationRequest>,
) -> Result<Json<SettlementResult>, AppError> {
    info!(
        payment_code = %req.payment_code,
        transaction_id = %req.transaction_id,
        approved = req.approved,
        "payment confirmation received"
    );

    let result = state
        .settlement
        .settle(SettlementRequest {
            payment_code: req.payment_code,
            external_ref: req.transaction_id,
            approved: req.approved,
            confirmed_amount_cents: req.amount_cents,
            provider: req.provider.unwrap_or_else(|| "unknown".to_string()),
        })
        .await?;

    Ok(Json(result))
}

/// POST /v1/payments/simulate
/// Test aid: settles the payment with a synthetic approved outcome.
pub async fn simulate_payment(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<Json<SettlementResult>, AppError> {
    let result = state
        .settlement
        .settle(SettlementRequest {
            payment_code: req.payment_code,
            external_ref: format!("SIM-{}", Uuid::new_v4().simple()),
            approved: true,
            confirmed_amount_cents: None,
            provider: "simulator".to_string(),
        })
        .await?;

    Ok(Json(result))
}
