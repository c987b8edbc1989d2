pub mod models;
pub mod notify;
pub mod repository;

pub use models::{
    BoardingStatus, Coupon, DiscountKind, ManifestEntry, Payment, PaymentStatus,
    PaymentTicketLink, Ticket, TicketStatus, Trip, TripStatus,
};
pub use notify::{Notification, NotificationDispatcher};
pub use repository::{NewBooking, SettlementOutcome, SettlementRecord, StoreError, TicketStore};
