use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use transita_core::{
    BoardingStatus, Coupon, DiscountKind, ManifestEntry, NewBooking, Payment, PaymentStatus,
    SettlementOutcome, SettlementRecord, StoreError, Ticket, TicketStatus, TicketStore, Trip,
    TripStatus,
};

/// Postgres-backed store. Seat and coupon counters are mutated with
/// single-statement conditional updates inside the booking/settlement
/// transaction, so concurrent bookings serialize on the row without an
/// application-level lock.
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(db.message().to_string())
        }
        _ => StoreError::backend(err),
    }
}

fn bad_status(entity: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unrecognized {} status: {}", entity, value))
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    route: String,
    departure_at: chrono::DateTime<chrono::Utc>,
    capacity: i32,
    seats_available: i32,
    seats_sold: i32,
    base_fare_cents: i64,
    service_charge_cents: i64,
    sales_open: bool,
    status: String,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, StoreError> {
        Ok(Trip {
            id: row.id,
            route: row.route,
            departure_at: row.departure_at,
            capacity: row.capacity,
            seats_available: row.seats_available,
            seats_sold: row.seats_sold,
            base_fare_cents: row.base_fare_cents,
            service_charge_cents: row.service_charge_cents,
            sales_open: row.sales_open,
            status: TripStatus::parse(&row.status).ok_or_else(|| bad_status("trip", &row.status))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    discount_kind: String,
    discount_value: i64,
    valid_from: Option<chrono::DateTime<chrono::Utc>>,
    valid_until: Option<chrono::DateTime<chrono::Utc>>,
    max_uses: Option<i32>,
    uses: i32,
    active: bool,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = StoreError;

    fn try_from(row: CouponRow) -> Result<Self, StoreError> {
        Ok(Coupon {
            id: row.id,
            code: row.code,
            discount_kind: DiscountKind::parse(&row.discount_kind)
                .ok_or_else(|| bad_status("coupon discount", &row.discount_kind))?,
            discount_value: row.discount_value,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            max_uses: row.max_uses,
            uses: row.uses,
            active: row.active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    trip_id: Uuid,
    buyer_id: String,
    passenger_name: String,
    seat: Option<String>,
    boarding_stop: Option<String>,
    ticket_code: String,
    qr_payload: String,
    base_fare_cents: i64,
    discount_cents: i64,
    service_charge_cents: i64,
    vat_cents: i64,
    total_cents: i64,
    coupon_id: Option<Uuid>,
    status: String,
    purchased_at: chrono::DateTime<chrono::Utc>,
    validated_at: Option<chrono::DateTime<chrono::Utc>>,
    validated_by: Option<String>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = StoreError;

    fn try_from(row: TicketRow) -> Result<Self, StoreError> {
        Ok(Ticket {
            id: row.id,
            trip_id: row.trip_id,
            buyer_id: row.buyer_id,
            passenger_name: row.passenger_name,
            seat: row.seat,
            boarding_stop: row.boarding_stop,
            ticket_code: row.ticket_code,
            qr_payload: row.qr_payload,
            base_fare_cents: row.base_fare_cents,
            discount_cents: row.discount_cents,
            service_charge_cents: row.service_charge_cents,
            vat_cents: row.vat_cents,
            total_cents: row.total_cents,
            coupon_id: row.coupon_id,
            status: TicketStatus::parse(&row.status)
                .ok_or_else(|| bad_status("ticket", &row.status))?,
            purchased_at: row.purchased_at,
            validated_at: row.validated_at,
            validated_by: row.validated_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    buyer_id: String,
    payment_code: String,
    amount_cents: i64,
    method: Option<String>,
    provider: Option<String>,
    external_ref: Option<String>,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    settled_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, StoreError> {
        Ok(Payment {
            id: row.id,
            buyer_id: row.buyer_id,
            payment_code: row.payment_code,
            amount_cents: row.amount_cents,
            method: row.method,
            provider: row.provider,
            external_ref: row.external_ref,
            status: PaymentStatus::parse(&row.status)
                .ok_or_else(|| bad_status("payment", &row.status))?,
            created_at: row.created_at,
            settled_at: row.settled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ManifestRow {
    id: Uuid,
    ticket_id: Uuid,
    passenger_name: String,
    seat: Option<String>,
    boarding_stop: Option<String>,
    boarding_status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<ManifestRow> for ManifestEntry {
    type Error = StoreError;

    fn try_from(row: ManifestRow) -> Result<Self, StoreError> {
        Ok(ManifestEntry {
            id: row.id,
            ticket_id: row.ticket_id,
            passenger_name: row.passenger_name,
            seat: row.seat,
            boarding_stop: row.boarding_stop,
            boarding_status: BoardingStatus::parse(&row.boarding_status)
                .ok_or_else(|| bad_status("boarding", &row.boarding_status))?,
            created_at: row.created_at,
        })
    }
}

const TICKET_COLUMNS: &str = "id, trip_id, buyer_id, passenger_name, seat, boarding_stop, \
     ticket_code, qr_payload, base_fare_cents, discount_cents, service_charge_cents, \
     vat_cents, total_cents, coupon_id, status, purchased_at, validated_at, validated_by";

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn get_trip(&self, id: Uuid) -> Result<Option<Trip>, StoreError> {
        let row = sqlx::query_as::<_, TripRow>(
            "SELECT id, route, departure_at, capacity, seats_available, seats_sold, \
             base_fare_cents, service_charge_cents, sales_open, status \
             FROM trips WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(Trip::try_from).transpose()
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query_as::<_, CouponRow>(
            "SELECT id, code, discount_kind, discount_value, valid_from, valid_until, \
             max_uses, uses, active FROM coupons WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(Coupon::try_from).transpose()
    }

    async fn get_ticket_by_code(&self, code: &str) -> Result<Option<Ticket>, StoreError> {
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {} FROM tickets WHERE ticket_code = $1",
            TICKET_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(Ticket::try_from).transpose()
    }

    async fn get_payment_by_code(&self, code: &str) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, buyer_id, payment_code, amount_cents, method, provider, external_ref, \
             status, created_at, settled_at FROM payments WHERE payment_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(Payment::try_from).transpose()
    }

    async fn tickets_for_payment(&self, payment_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT t.{} FROM tickets t \
             JOIN payment_tickets pt ON pt.ticket_id = t.id \
             WHERE pt.payment_id = $1",
            TICKET_COLUMNS.replace(", ", ", t.")
        ))
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(Ticket::try_from).collect()
    }

    async fn manifest_entry_for_ticket(
        &self,
        ticket_id: Uuid,
    ) -> Result<Option<ManifestEntry>, StoreError> {
        let row = sqlx::query_as::<_, ManifestRow>(
            "SELECT id, ticket_id, passenger_name, seat, boarding_stop, boarding_status, \
             created_at FROM manifest_entries WHERE ticket_id = $1",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(ManifestEntry::try_from).transpose()
    }

    async fn commit_booking(&self, booking: &NewBooking) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // One conditional decrement per ticket; losing the race for the
        // last seat shows up as zero rows touched and aborts the whole
        // transaction.
        for ticket in &booking.tickets {
            let result = sqlx::query(
                "UPDATE trips SET seats_available = seats_available - 1, updated_at = NOW() \
                 WHERE id = $1 AND sales_open AND seats_available > 0",
            )
            .bind(ticket.trip_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                let exists = sqlx::query("SELECT 1 FROM trips WHERE id = $1")
                    .bind(ticket.trip_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(StoreError::backend)?;
                return Err(match exists {
                    Some(_) => StoreError::SeatsExhausted(ticket.trip_id),
                    None => StoreError::TripNotFound(ticket.trip_id),
                });
            }
        }

        if let Some(coupon_id) = booking.coupon_id {
            let result = sqlx::query(
                "UPDATE coupons SET uses = uses + 1 \
                 WHERE id = $1 AND active AND (max_uses IS NULL OR uses < max_uses)",
            )
            .bind(coupon_id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::CouponExhausted(coupon_id));
            }
        }

        for ticket in &booking.tickets {
            sqlx::query(
                "INSERT INTO tickets (id, trip_id, buyer_id, passenger_name, seat, \
                 boarding_stop, ticket_code, qr_payload, base_fare_cents, discount_cents, \
                 service_charge_cents, vat_cents, total_cents, coupon_id, status, purchased_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            )
            .bind(ticket.id)
            .bind(ticket.trip_id)
            .bind(&ticket.buyer_id)
            .bind(&ticket.passenger_name)
            .bind(&ticket.seat)
            .bind(&ticket.boarding_stop)
            .bind(&ticket.ticket_code)
            .bind(&ticket.qr_payload)
            .bind(ticket.base_fare_cents)
            .bind(ticket.discount_cents)
            .bind(ticket.service_charge_cents)
            .bind(ticket.vat_cents)
            .bind(ticket.total_cents)
            .bind(ticket.coupon_id)
            .bind(ticket.status.as_str())
            .bind(ticket.purchased_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        let payment = &booking.payment;
        sqlx::query(
            "INSERT INTO payments (id, buyer_id, payment_code, amount_cents, method, provider, \
             external_ref, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(payment.id)
        .bind(&payment.buyer_id)
        .bind(&payment.payment_code)
        .bind(payment.amount_cents)
        .bind(&payment.method)
        .bind(&payment.provider)
        .bind(&payment.external_ref)
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for link in &booking.links {
            sqlx::query(
                "INSERT INTO payment_tickets (payment_id, ticket_id, amount_cents) \
                 VALUES ($1, $2, $3)",
            )
            .bind(link.payment_id)
            .bind(link.ticket_id)
            .bind(link.amount_cents)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(StoreError::backend)
    }

    async fn apply_settlement(
        &self,
        payment_id: Uuid,
        outcome: SettlementOutcome,
        external_ref: &str,
        provider: &str,
    ) -> Result<SettlementRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let next_status = match outcome {
            SettlementOutcome::Approved => PaymentStatus::Captured,
            SettlementOutcome::Rejected => PaymentStatus::Rejected,
        };

        // Pending-only guard inside the transaction: a duplicate delivery
        // racing this one touches zero rows and aborts here.
        let result = sqlx::query(
            "UPDATE payments SET status = $2, external_ref = $3, provider = $4, \
             settled_at = NOW() WHERE id = $1 AND status = 'PENDING'",
        )
        .bind(payment_id)
        .bind(next_status.as_str())
        .bind(external_ref)
        .bind(provider)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::PaymentNotPending(payment_id));
        }

        let ticket_rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT t.{} FROM tickets t \
             JOIN payment_tickets pt ON pt.ticket_id = t.id \
             WHERE pt.payment_id = $1 FOR UPDATE OF t",
            TICKET_COLUMNS.replace(", ", ", t.")
        ))
        .bind(payment_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        let mut tickets = Vec::with_capacity(ticket_rows.len());
        for row in ticket_rows {
            let mut ticket = Ticket::try_from(row)?;
            match outcome {
                SettlementOutcome::Approved => {
                    sqlx::query("UPDATE tickets SET status = 'PAID' WHERE id = $1")
                        .bind(ticket.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(StoreError::backend)?;

                    sqlx::query(
                        "UPDATE trips SET seats_sold = seats_sold + 1, updated_at = NOW() \
                         WHERE id = $1",
                    )
                    .bind(ticket.trip_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::backend)?;

                    // Unique index on ticket_id makes a second manifest row
                    // impossible even if the guard above were bypassed.
                    sqlx::query(
                        "INSERT INTO manifest_entries (id, ticket_id, passenger_name, seat, \
                         boarding_stop, boarding_status) VALUES ($1, $2, $3, $4, $5, $6)",
                    )
                    .bind(Uuid::new_v4())
                    .bind(ticket.id)
                    .bind(&ticket.passenger_name)
                    .bind(&ticket.seat)
                    .bind(&ticket.boarding_stop)
                    .bind(BoardingStatus::Pending.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(map_db_err)?;

                    ticket.status = TicketStatus::Paid;
                }
                SettlementOutcome::Rejected => {
                    // Compensating release of the seat reserved at booking
                    // time; the ticket itself stays PENDING_PAYMENT.
                    sqlx::query(
                        "UPDATE trips SET seats_available = seats_available + 1, \
                         updated_at = NOW() WHERE id = $1",
                    )
                    .bind(ticket.trip_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::backend)?;
                }
            }
            tickets.push(ticket);
        }

        let payment_row = sqlx::query_as::<_, PaymentRow>(
            "SELECT id, buyer_id, payment_code, amount_cents, method, provider, external_ref, \
             status, created_at, settled_at FROM payments WHERE id = $1",
        )
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;

        Ok(SettlementRecord {
            payment: Payment::try_from(payment_row)?,
            tickets,
        })
    }
}
