pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg_store;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_store::PgTicketStore;
