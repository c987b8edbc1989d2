use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use transita_core::{
    Notification, PaymentStatus, SettlementOutcome, StoreError, TicketStatus, TicketStore,
};

#[derive(Debug, Clone, Deserialize)]
pub struct SettlementRequest {
    pub payment_code: String,
    pub external_ref: String,
    pub approved: bool,
    pub confirmed_amount_cents: Option<i64>,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketOutcome {
    pub ticket_code: String,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub payment_code: String,
    pub payment_status: PaymentStatus,
    pub tickets: Vec<TicketOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Unknown payment code: {0}")]
    UnknownPayment(String),

    #[error("Payment already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Settlement storage failure: {0}")]
    Store(String),
}

/// Consumes an external payment-confirmation event and finalizes the
/// payment exactly once. Confirmation delivery is at-least-once, so the
/// processor is safe to call repeatedly with the same payment code: every
/// call after the first is rejected without touching state.
pub struct SettlementProcessor {
    store: Arc<dyn TicketStore>,
    outbox: mpsc::Sender<Notification>,
}

impl SettlementProcessor {
    pub fn new(store: Arc<dyn TicketStore>, outbox: mpsc::Sender<Notification>) -> Self {
        Self { store, outbox }
    }

    pub async fn settle(&self, req: SettlementRequest) -> Result<SettlementResult, SettlementError> {
        let payment = self
            .store
            .get_payment_by_code(&req.payment_code)
            .await
            .map_err(|e| SettlementError::Store(e.to_string()))?
            .ok_or_else(|| SettlementError::UnknownPayment(req.payment_code.clone()))?;

        // Idempotency guard. The store re-checks inside the transaction,
        // which covers two deliveries racing past this read.
        if payment.status != PaymentStatus::Pending {
            return Err(SettlementError::AlreadyProcessed(req.payment_code));
        }

        if let Some(confirmed) = req.confirmed_amount_cents {
            if confirmed != payment.amount_cents {
                // Accepted business decision: a mismatch is logged for
                // reconciliation but does not block settlement.
                warn!(
                    payment_code = %req.payment_code,
                    recorded_cents = payment.amount_cents,
                    confirmed_cents = confirmed,
                    "settlement amount mismatch"
                );
            }
        }

        let outcome = if req.approved {
            SettlementOutcome::Approved
        } else {
            SettlementOutcome::Rejected
        };

        let record = self
            .store
            .apply_settlement(payment.id, outcome, &req.external_ref, &req.provider)
            .await
            .map_err(|err| match err {
                StoreError::PaymentNotPending(_) => {
                    SettlementError::AlreadyProcessed(req.payment_code.clone())
                }
                other => {
                    error!(
                        payment_code = %req.payment_code,
                        external_ref = %req.external_ref,
                        "settlement failed, payment left pending: {}",
                        other
                    );
                    SettlementError::Store(other.to_string())
                }
            })?;

        info!(
            payment_code = %record.payment.payment_code,
            status = record.payment.status.as_str(),
            tickets = record.tickets.len(),
            "payment settled"
        );

        if outcome == SettlementOutcome::Approved {
            for ticket in &record.tickets {
                let notification = Notification {
                    recipient: ticket.buyer_id.clone(),
                    title: "Purchase confirmed".to_string(),
                    message: format!(
                        "Your ticket {} is confirmed. Show the QR code when boarding.",
                        ticket.ticket_code
                    ),
                    metadata: serde_json::json!({
                        "ticket_code": ticket.ticket_code,
                        "payment_code": record.payment.payment_code,
                        "trip_id": ticket.trip_id,
                    }),
                };
                // Fire and forget: the settlement already committed and a
                // full outbox must not undo it.
                if let Err(e) = self.outbox.try_send(notification) {
                    warn!(
                        ticket_code = %ticket.ticket_code,
                        "failed to queue purchase notification: {}",
                        e
                    );
                }
            }
        }

        Ok(SettlementResult {
            payment_code: record.payment.payment_code,
            payment_status: record.payment.status,
            tickets: record
                .tickets
                .iter()
                .map(|t| TicketOutcome {
                    ticket_code: t.ticket_code.clone(),
                    status: t.status,
                })
                .collect(),
        })
    }
}
