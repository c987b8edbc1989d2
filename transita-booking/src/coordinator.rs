use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use transita_catalog::{PriceBreakdown, PricingCalculator, PricingError};
use transita_core::{
    NewBooking, Payment, PaymentStatus, PaymentTicketLink, StoreError, Ticket, TicketStatus,
    TicketStore,
};

use crate::codes;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub buyer_id: String,
    pub trip_id: Uuid,
    pub passenger_name: String,
    pub seat: Option<String>,
    pub boarding_stop: Option<String>,
    pub coupon_id: Option<Uuid>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub ticket_code: String,
    pub payment_code: String,
    pub qr_payload: String,
    pub status: TicketStatus,
    pub breakdown: PriceBreakdown,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error("Booking storage failure: {0}")]
    Store(String),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        // Conflicts surfaced by the conditional updates map back to the
        // same validation errors the pre-check produces, so a caller that
        // lost a race sees the same answer as one that never had a seat.
        match err {
            StoreError::TripNotFound(_) => BookingError::Pricing(PricingError::TripNotFound),
            StoreError::SeatsExhausted(_) => BookingError::Pricing(PricingError::NoSeatsAvailable),
            StoreError::CouponExhausted(_) => {
                BookingError::Pricing(PricingError::CouponUsageExceeded)
            }
            other => BookingError::Store(other.to_string()),
        }
    }
}

/// Orchestrates quote validation, code generation and the atomic
/// ticket-plus-payment commit.
pub struct BookingCoordinator {
    store: Arc<dyn TicketStore>,
}

impl BookingCoordinator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    /// Price quote with full validation and no side effects.
    pub async fn quote(
        &self,
        trip_id: Uuid,
        coupon_id: Option<Uuid>,
    ) -> Result<PriceBreakdown, BookingError> {
        let trip = self
            .store
            .get_trip(trip_id)
            .await?
            .ok_or(PricingError::TripNotFound)?;

        let coupon = match coupon_id {
            Some(id) => Some(
                self.store
                    .get_coupon(id)
                    .await?
                    .ok_or(PricingError::CouponNotFound)?,
            ),
            None => None,
        };

        Ok(PricingCalculator::quote(&trip, coupon.as_ref(), Utc::now())?)
    }

    /// Create one ticket and its pending payment atomically. The quote is
    /// recomputed here; a stale quote never books.
    pub async fn book(&self, req: BookingRequest) -> Result<BookingReceipt, BookingError> {
        let trip = self
            .store
            .get_trip(req.trip_id)
            .await?
            .ok_or(PricingError::TripNotFound)?;

        let coupon = match req.coupon_id {
            Some(id) => Some(
                self.store
                    .get_coupon(id)
                    .await?
                    .ok_or(PricingError::CouponNotFound)?,
            ),
            None => None,
        };

        let now = Utc::now();
        let breakdown = PricingCalculator::quote(&trip, coupon.as_ref(), now)?;

        let ticket_code = codes::ticket_code(now);
        let qr_payload = codes::qr_payload(&ticket_code, now);
        let payment_code = codes::payment_code(now);

        let ticket = Ticket {
            id: Uuid::new_v4(),
            trip_id: trip.id,
            buyer_id: req.buyer_id.clone(),
            passenger_name: req.passenger_name,
            seat: req.seat,
            boarding_stop: req.boarding_stop,
            ticket_code: ticket_code.clone(),
            qr_payload: qr_payload.clone(),
            base_fare_cents: breakdown.base_fare_cents,
            discount_cents: breakdown.discount_cents,
            service_charge_cents: breakdown.service_charge_cents,
            vat_cents: breakdown.vat_cents,
            total_cents: breakdown.total_cents,
            coupon_id: req.coupon_id,
            status: TicketStatus::PendingPayment,
            purchased_at: now,
            validated_at: None,
            validated_by: None,
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            buyer_id: req.buyer_id,
            payment_code: payment_code.clone(),
            amount_cents: breakdown.total_cents,
            method: req.payment_method,
            provider: None,
            external_ref: None,
            status: PaymentStatus::Pending,
            created_at: now,
            settled_at: None,
        };

        let link = PaymentTicketLink {
            payment_id: payment.id,
            ticket_id: ticket.id,
            amount_cents: breakdown.total_cents,
        };

        let booking = NewBooking {
            tickets: vec![ticket],
            payment,
            links: vec![link],
            coupon_id: req.coupon_id,
        };

        if let Err(err) = self.store.commit_booking(&booking).await {
            error!(
                trip_id = %req.trip_id,
                ticket_code = %ticket_code,
                payment_code = %payment_code,
                "booking commit failed: {}",
                err
            );
            return Err(err.into());
        }

        info!(
            trip_id = %req.trip_id,
            ticket_code = %ticket_code,
            payment_code = %payment_code,
            total_cents = breakdown.total_cents,
            "booking committed, awaiting payment"
        );

        Ok(BookingReceipt {
            ticket_code,
            payment_code,
            qr_payload,
            status: TicketStatus::PendingPayment,
            breakdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use transita_core::{Coupon, Trip};
    use transita_store::MemoryStore;

    fn seeded_store(capacity: i32) -> (Arc<MemoryStore>, Trip) {
        let store = Arc::new(MemoryStore::new());
        let trip = Trip::new(
            "CDMX-GDL".to_string(),
            Utc::now() + Duration::days(3),
            capacity,
            10_000,
            2_000,
        );
        store.insert_trip(trip.clone());
        (store, trip)
    }

    fn request(trip_id: Uuid) -> BookingRequest {
        BookingRequest {
            buyer_id: "buyer-1".to_string(),
            trip_id,
            passenger_name: "Ana Torres".to_string(),
            seat: Some("07B".to_string()),
            boarding_stop: Some("Terminal Norte".to_string()),
            coupon_id: None,
            payment_method: Some("CARD".to_string()),
        }
    }

    #[tokio::test]
    async fn test_booking_creates_ticket_payment_and_link() {
        let (store, trip) = seeded_store(40);
        let coordinator = BookingCoordinator::new(store.clone());

        let receipt = coordinator.book(request(trip.id)).await.unwrap();
        assert_eq!(receipt.status, TicketStatus::PendingPayment);
        assert_eq!(receipt.breakdown.total_cents, 13_920);

        let after = store.get_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 39);
        assert_eq!(after.seats_sold, 0);

        let ticket = store
            .get_ticket_by_code(&receipt.ticket_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ticket.status, TicketStatus::PendingPayment);
        assert_eq!(ticket.total_cents, 13_920);

        let payment = store
            .get_payment_by_code(&receipt.payment_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount_cents, 13_920);

        let linked = store.tickets_for_payment(payment.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].id, ticket.id);
    }

    #[tokio::test]
    async fn test_booking_with_coupon_increments_usage() {
        let (store, trip) = seeded_store(40);
        let mut coupon = Coupon::percentage("DIEZ".to_string(), 10);
        coupon.max_uses = Some(5);
        let coupon_id = coupon.id;
        store.insert_coupon(coupon);

        let coordinator = BookingCoordinator::new(store.clone());
        let mut req = request(trip.id);
        req.coupon_id = Some(coupon_id);

        let receipt = coordinator.book(req).await.unwrap();
        assert_eq!(receipt.breakdown.discount_cents, 1_000);
        assert_eq!(receipt.breakdown.total_cents, 12_760);

        let coupon = store.get_coupon(coupon_id).await.unwrap().unwrap();
        assert_eq!(coupon.uses, 1);
    }

    #[tokio::test]
    async fn test_unknown_trip_and_coupon() {
        let (store, trip) = seeded_store(40);
        let coordinator = BookingCoordinator::new(store);

        let mut req = request(Uuid::new_v4());
        let err = coordinator.book(req.clone()).await.unwrap_err();
        assert!(matches!(err, BookingError::Pricing(PricingError::TripNotFound)));

        req.trip_id = trip.id;
        req.coupon_id = Some(Uuid::new_v4());
        let err = coordinator.book(req).await.unwrap_err();
        assert!(matches!(err, BookingError::Pricing(PricingError::CouponNotFound)));
    }

    #[tokio::test]
    async fn test_last_seat_race_has_one_winner() {
        let (store, mut trip) = seeded_store(40);
        trip.seats_available = 1;
        trip.seats_sold = 39;
        store.insert_trip(trip.clone());

        let coordinator = Arc::new(BookingCoordinator::new(store.clone()));

        let a = tokio::spawn({
            let c = coordinator.clone();
            let req = request(trip.id);
            async move { c.book(req).await }
        });
        let b = tokio::spawn({
            let c = coordinator.clone();
            let req = request(trip.id);
            async move { c.book(req).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let losses = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(BookingError::Pricing(PricingError::NoSeatsAvailable))
                )
            })
            .count();
        assert_eq!(losses, 1);

        let after = store.get_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 0);
    }

    #[tokio::test]
    async fn test_coupon_usage_never_exceeds_max_under_races() {
        let (store, trip) = seeded_store(40);
        let mut coupon = Coupon::percentage("UNICO".to_string(), 10);
        coupon.max_uses = Some(1);
        let coupon_id = coupon.id;
        store.insert_coupon(coupon);

        let coordinator = Arc::new(BookingCoordinator::new(store.clone()));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let c = coordinator.clone();
            let mut req = request(trip.id);
            req.coupon_id = Some(coupon_id);
            handles.push(tokio::spawn(async move { c.book(req).await }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);

        let coupon = store.get_coupon(coupon_id).await.unwrap().unwrap();
        assert_eq!(coupon.uses, 1);
    }

    #[tokio::test]
    async fn test_quote_does_not_mutate() {
        let (store, trip) = seeded_store(40);
        let coordinator = BookingCoordinator::new(store.clone());

        let breakdown = coordinator.quote(trip.id, None).await.unwrap();
        assert_eq!(breakdown.total_cents, 13_920);

        let after = store.get_trip(trip.id).await.unwrap().unwrap();
        assert_eq!(after.seats_available, 40);
    }
}
