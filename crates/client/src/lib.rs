//! Family Planner Client - real-time sync layer
//!
//! This crate keeps a household dashboard in step with the server over three
//! WebSocket channels (dashboard, weather, calendar): connection lifecycle and
//! reconnects, typed message dispatch, snapshot/delta reconciliation into a
//! local store, and debounced outbound edits.

pub mod config;
pub mod logging;
pub mod requests;
pub mod session;
pub mod stores;
pub mod ws;

#[cfg(test)]
mod testing;

pub use config::{ClientConfig, ConfigError};
pub use requests::RequestCoordinator;
pub use session::HouseholdSession;
pub use stores::{HouseholdState, HouseholdStore};
