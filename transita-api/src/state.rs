use std::sync::Arc;

use transita_booking::{BookingCoordinator, SettlementProcessor};
use transita_core::TicketStore;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub booking: Arc<BookingCoordinator>,
    pub settlement: Arc<SettlementProcessor>,
    pub auth: AuthConfig,
}
