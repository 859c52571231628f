pub mod api;
pub mod auth;
pub mod booking;
pub mod calendar;
pub mod config;
pub mod db;
pub mod db_migrate;
pub mod error;
pub mod manager;
pub mod members;
pub mod memory_store;
pub mod models;
pub mod seat_ledger;
pub mod server;
pub mod slot_time;
pub mod slots;
pub mod state;
pub mod store;
#[cfg(test)]
pub(crate) mod testutils;
// Flat re-exports for the binary and integration tests.
pub use db::ScyllaConnector;
pub use error::Result as AppResult;
pub use error::BookingError;
pub use store::BookingStore;
