use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Coupon, ManifestEntry, Payment, PaymentTicketLink, Ticket, Trip};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Trip not found: {0}")]
    TripNotFound(Uuid),

    #[error("No seats left on trip {0}")]
    SeatsExhausted(Uuid),

    #[error("Coupon usage limit reached: {0}")]
    CouponExhausted(Uuid),

    #[error("Payment {0} is not pending")]
    PaymentNotPending(Uuid),

    #[error("Uniqueness violation: {0}")]
    Duplicate(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// The full unit of work committed by a booking: tickets, the pending
/// payment covering them, the link rows, and the coupon whose usage
/// counter must be bumped. Either everything lands or nothing does.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub tickets: Vec<Ticket>,
    pub payment: Payment,
    pub links: Vec<PaymentTicketLink>,
    pub coupon_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Approved,
    Rejected,
}

/// Post-settlement snapshot: the finalized payment and its tickets as
/// they look after the transaction committed.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub payment: Payment,
    pub tickets: Vec<Ticket>,
}

/// Data access boundary for the booking and settlement flows.
///
/// Entities reference each other by id only; lookups and every
/// multi-row mutation go through this trait. `commit_booking` and
/// `apply_settlement` are atomic: a failure inside either leaves no
/// partial state behind.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError>;

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError>;

    async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, StoreError>;

    async fn get_payment_by_code(&self, code: &str) -> Result<Option<Payment>, StoreError>;

    async fn tickets_for_payment(&self, payment_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn manifest_entry_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<ManifestEntry>, StoreError>;

    /// Commit one booking atomically. Decrements `seats_available` by one
    /// per ticket with a conditional update, so the last seat can only be
    /// taken once; increments the coupon usage counter under the same
    /// discipline. Fails with `SeatsExhausted` / `CouponExhausted` when a
    /// concurrent booking won the race.
    async fn commit_booking(&self, booking: &NewBooking) -> Result<(), StoreError>;

    /// Finalize a pending payment exactly once. The implementation must
    /// guard the status flip on the payment still being `Pending` inside
    /// the same transaction, so duplicate deliveries collapse to a single
    /// transition. Approved: tickets become `Paid`, `seats_sold` grows,
    /// one manifest entry appears per ticket. Rejected: the reserved seat
    /// is released back to `seats_available`; ticket status is untouched.
    async fn apply_settlement(
        &self,
        payment_id: Uuid,
        outcome: SettlementOutcome,
        external_ref: &str,
        provider: &str,
    ) -> Result<SettlementRecord, StoreError>;
}
