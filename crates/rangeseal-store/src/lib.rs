//! rangeseal-store: Reference remote store
//!
//! Holds encrypted documents and opaque index entries and answers
//! Insert / Find / PreFind. It learns which documents match a query, never
//! what was searched for.

pub mod error;
pub mod local;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;

pub use error::StoreError;
pub use local::LocalStore;
pub use server::{ServerBuilder, StoreServer};
pub use state::{InsertStats, SharedState, StoreState, StoreStats};
