use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use transita_core::{
    Coupon, ManifestEntry, NewBooking, Payment, PaymentStatus, PaymentTicketLink,
    SettlementOutcome, SettlementRecord, StoreError, Ticket, TicketStatus, TicketStore, Trip,
};

/// In-process store backing tests and the demo profile. One mutex guards
/// the whole state, so the conditional seat/coupon checks and the
/// mutations they protect happen under a single critical section, the
/// same all-or-nothing discipline the Postgres store gets from its
/// transaction.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    trips: HashMap<Uuid, Trip>,
    coupons: HashMap<Uuid, Coupon>,
    tickets: HashMap<Uuid, Ticket>,
    payments: HashMap<Uuid, Payment>,
    links: Vec<PaymentTicketLink>,
    manifest: HashMap<Uuid, ManifestEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn insert_trip(&self, trip: Trip) {
        self.inner.lock().expect("store lock").trips.insert(trip.id, trip);
    }

    pub fn insert_coupon(&self, coupon: Coupon) {
        self.inner
            .lock()
            .expect("store lock")
            .coupons
            .insert(coupon.id, coupon);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner.lock().map_err(StoreError::backend)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError> {
        Ok(self.lock()?.trips.get(&id).cloned())
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        Ok(self.lock()?.coupons.get(&id).cloned())
    }

    async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        Ok(self
            .lock()?
            .tickets
            .values()
            .find(|t| t.ticket_code == code)
            .cloned())
    }

    async fn get_payment_by_code(&self, code: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .lock()?
            .payments
            .values()
            .find(|p| p.payment_code == code)
            .cloned())
    }

    async fn tickets_for_payment(&self, payment_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .links
            .iter()
            .filter(|l| l.payment_id == payment_id)
            .filter_map(|l| inner.tickets.get(&l.ticket_id).cloned())
            .collect())
    }

    async fn manifest_entry_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<ManifestEntry>, StoreError> {
        Ok(self.lock()?.manifest.get(&ticket_id).cloned())
    }

    async fn commit_booking(&self, booking: &NewBooking) -> Result<(), StoreError> {
        let mut inner = self.lock()?;

        // Validate everything before touching state; any failure below
        // this block leaves the store untouched.
        for ticket in &booking.tickets {
            if inner.tickets.values().any(|t| t.ticket_code == ticket.ticket_code) {
                return Err(StoreError::Duplicate(ticket.ticket_code.clone()));
            }
            if inner.tickets.values().any(|t| t.qr_payload == ticket.qr_payload) {
                return Err(StoreError::Duplicate("qr_payload".to_string()));
            }
        }
        if inner
            .payments
            .values()
            .any(|p| p.payment_code == booking.payment.payment_code)
        {
            return Err(StoreError::Duplicate(booking.payment.payment_code.clone()));
        }

        // Conditional seat check, tallied per trip for multi-ticket bookings.
        let mut taken: HashMap<Uuid, i32> = HashMap::new();
        for ticket in &booking.tickets {
            let trip = inner
                .trips
                .get(&ticket.trip_id)
                .ok_or(StoreError::TripNotFound(ticket.trip_id))?;
            let already = taken.entry(ticket.trip_id).or_insert(0);
            if !trip.sales_open || trip.seats_available - *already <= 0 {
                return Err(StoreError::SeatsExhausted(ticket.trip_id));
            }
            *already += 1;
        }

        if let Some(coupon_id) = booking.coupon_id {
            let coupon = inner
                .coupons
                .get(&coupon_id)
                .ok_or_else(|| StoreError::Backend(format!("coupon {} missing", coupon_id)))?;
            let exhausted = !coupon.active
                || coupon.max_uses.is_some_and(|max| coupon.uses >= max);
            if exhausted {
                return Err(StoreError::CouponExhausted(coupon_id));
            }
        }

        for (trip_id, count) in taken {
            if let Some(trip) = inner.trips.get_mut(&trip_id) {
                trip.seats_available -= count;
            }
        }
        if let Some(coupon_id) = booking.coupon_id {
            if let Some(coupon) = inner.coupons.get_mut(&coupon_id) {
                coupon.uses += 1;
            }
        }
        for ticket in &booking.tickets {
            inner.tickets.insert(ticket.id, ticket.clone());
        }
        inner
            .payments
            .insert(booking.payment.id, booking.payment.clone());
        inner.links.extend(booking.links.iter().cloned());

        Ok(())
    }

    async fn apply_settlement(
        &self,
        payment_id: Uuid,
        outcome: SettlementOutcome,
        external_ref: &str,
        provider: &str,
    ) -> Result<SettlementRecord, StoreError> {
        let mut inner = self.lock()?;

        let payment = inner
            .payments
            .get(&payment_id)
            .ok_or_else(|| StoreError::Backend(format!("payment {} missing", payment_id)))?;
        if payment.status != PaymentStatus::Pending {
            return Err(StoreError::PaymentNotPending(payment_id));
        }

        let ticket_ids: Vec<Uuid> = inner
            .links
            .iter()
            .filter(|l| l.payment_id == payment_id)
            .map(|l| l.ticket_id)
            .collect();

        let mut settled_tickets = Vec::with_capacity(ticket_ids.len());
        for ticket_id in ticket_ids {
            let (trip_id, entry) = {
                let ticket = inner
                    .tickets
                    .get_mut(&ticket_id)
                    .ok_or_else(|| StoreError::Backend(format!("ticket {} missing", ticket_id)))?;
                match outcome {
                    SettlementOutcome::Approved => {
                        ticket.status = TicketStatus::Paid;
                        (ticket.trip_id, Some(ManifestEntry::for_ticket(ticket)))
                    }
                    SettlementOutcome::Rejected => (ticket.trip_id, None),
                }
            };

            if let Some(trip) = inner.trips.get_mut(&trip_id) {
                match outcome {
                    SettlementOutcome::Approved => trip.seats_sold += 1,
                    SettlementOutcome::Rejected => trip.seats_available += 1,
                }
            }
            if let Some(entry) = entry {
                if inner.manifest.contains_key(&ticket_id) {
                    return Err(StoreError::Duplicate(format!("manifest for {}", ticket_id)));
                }
                inner.manifest.insert(ticket_id, entry);
            }
            settled_tickets.push(inner.tickets[&ticket_id].clone());
        }

        let payment = inner
            .payments
            .get_mut(&payment_id)
            .ok_or_else(|| StoreError::Backend(format!("payment {} missing", payment_id)))?;
        payment.status = match outcome {
            SettlementOutcome::Approved => PaymentStatus::Captured,
            SettlementOutcome::Rejected => PaymentStatus::Rejected,
        };
        payment.external_ref = Some(external_ref.to_string());
        payment.provider = Some(provider.to_string());
        payment.settled_at = Some(Utc::now());

        Ok(SettlementRecord {
            payment: payment.clone(),
            tickets: settled_tickets,
        })
    }
}
