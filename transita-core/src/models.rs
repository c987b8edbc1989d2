use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ticket status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    PendingPayment,
    Paid,
    Validated,
    Used,
    Cancelled,
}

impl TicketStatus {
    /// All legal transitions live here; callers never compare raw codes.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (PendingPayment, Paid) | (PendingPayment, Cancelled) | (Paid, Validated) | (Validated, Used)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::PendingPayment => "PENDING_PAYMENT",
            TicketStatus::Paid => "PAID",
            TicketStatus::Validated => "VALIDATED",
            TicketStatus::Used => "USED",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING_PAYMENT" => Some(TicketStatus::PendingPayment),
            "PAID" => Some(TicketStatus::Paid),
            "VALIDATED" => Some(TicketStatus::Validated),
            "USED" => Some(TicketStatus::Used),
            "CANCELLED" => Some(TicketStatus::Cancelled),
            _ => None,
        }
    }
}

/// Payment status. Captured and Rejected are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Captured,
    Rejected,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Captured)
                | (PaymentStatus::Pending, PaymentStatus::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(PaymentStatus::Pending),
            "CAPTURED" => Some(PaymentStatus::Captured),
            "REJECTED" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Departed,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Departed => "DEPARTED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SCHEDULED" => Some(TripStatus::Scheduled),
            "DEPARTED" => Some(TripStatus::Departed),
            "CANCELLED" => Some(TripStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardingStatus {
    Pending,
    Boarded,
    NoShow,
}

impl BoardingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardingStatus::Pending => "PENDING",
            BoardingStatus::Boarded => "BOARDED",
            BoardingStatus::NoShow => "NO_SHOW",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BoardingStatus::Pending),
            "BOARDED" => Some(BoardingStatus::Boarded),
            "NO_SHOW" => Some(BoardingStatus::NoShow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Percentage,
    FixedAmount,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Percentage => "PERCENTAGE",
            DiscountKind::FixedAmount => "FIXED_AMOUNT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PERCENTAGE" => Some(DiscountKind::Percentage),
            "FIXED_AMOUNT" => Some(DiscountKind::FixedAmount),
            _ => None,
        }
    }
}

/// A scheduled departure with fixed seat capacity and fare.
///
/// The trip owns its seat counters. Invariants:
/// `seats_available + seats_sold <= capacity` and `seats_available >= 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub route: String,
    pub departure_at: DateTime<Utc>,
    pub capacity: i32,
    pub seats_available: i32,
    pub seats_sold: i32,
    pub base_fare_cents: i64,
    pub service_charge_cents: i64,
    pub sales_open: bool,
    pub status: TripStatus,
}

impl Trip {
    pub fn new(
        route: String,
        departure_at: DateTime<Utc>,
        capacity: i32,
        base_fare_cents: i64,
        service_charge_cents: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            route,
            departure_at,
            capacity,
            seats_available: capacity,
            seats_sold: 0,
            base_fare_cents,
            service_charge_cents,
            sales_open: true,
            status: TripStatus::Scheduled,
        }
    }
}

/// A purchased seat reservation for a specific trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub buyer_id: String,
    pub passenger_name: String,
    pub seat: Option<String>,
    pub boarding_stop: Option<String>,
    pub ticket_code: String,
    pub qr_payload: String,
    pub base_fare_cents: i64,
    pub discount_cents: i64,
    pub service_charge_cents: i64,
    pub vat_cents: i64,
    pub total_cents: i64,
    pub coupon_id: Option<Uuid>,
    pub status: TicketStatus,
    pub purchased_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by: Option<String>,
}

/// A monetary settlement covering one or more tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub buyer_id: String,
    pub payment_code: String,
    pub amount_cents: i64,
    pub method: Option<String>,
    pub provider: Option<String>,
    pub external_ref: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Join row between a payment and a ticket, with the amount assigned
/// to that ticket. Unique per (payment, ticket) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTicketLink {
    pub payment_id: Uuid,
    pub ticket_id: Uuid,
    pub amount_cents: i64,
}

/// A discount code with usage and validity constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub uses: i32,
    pub active: bool,
}

impl Coupon {
    pub fn percentage(code: String, percent: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            discount_kind: DiscountKind::Percentage,
            discount_value: percent,
            valid_from: None,
            valid_until: None,
            max_uses: None,
            uses: 0,
            active: true,
        }
    }

    pub fn fixed_amount(code: String, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            discount_kind: DiscountKind::FixedAmount,
            discount_value: amount_cents,
            valid_from: None,
            valid_until: None,
            max_uses: None,
            uses: 0,
            active: true,
        }
    }
}

/// The boarding record created once a ticket's payment is captured.
/// At most one entry exists per ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub passenger_name: String,
    pub seat: Option<String>,
    pub boarding_stop: Option<String>,
    pub boarding_status: BoardingStatus,
    pub created_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn for_ticket(ticket: &Ticket) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            passenger_name: ticket.passenger_name.clone(),
            seat: ticket.seat.clone(),
            boarding_stop: ticket.boarding_stop.clone(),
            boarding_status: BoardingStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
