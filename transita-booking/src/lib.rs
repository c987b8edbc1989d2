pub mod codes;
pub mod coordinator;
pub mod settlement;

pub use coordinator::{BookingCoordinator, BookingError, BookingReceipt, BookingRequest};
pub use settlement::{
    SettlementError, SettlementProcessor, SettlementRequest, SettlementResult, TicketOutcome,
};
