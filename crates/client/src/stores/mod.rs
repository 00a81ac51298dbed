//! Client-side state fed by the real-time channels.

pub mod household;
pub mod reconcile;

pub use household::{HouseholdState, HouseholdStore};
pub use reconcile::{apply_delta, apply_snapshot, merge_dashboard, Delta, Record};
