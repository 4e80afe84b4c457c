//! Shared types for the support desk platform
//!
//! Domain models, DTOs and the pure scheduling/SLA logic used by the
//! desk-server and by external tooling. Row mapping for SQLite is gated
//! behind the `db` feature so lightweight consumers stay database-free.

pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};
