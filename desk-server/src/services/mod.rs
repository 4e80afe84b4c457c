//! Service Layer
//!
//! Business rules over the repositories: shift lifecycle, request routing,
//! the auto-router, the two background sweeps and the dashboard rollup.

pub mod auto_router;
pub mod dashboard;
pub mod reminder_sweep;
pub mod routing;
pub mod shifts;
pub mod status_sweep;

pub use auto_router::AutoRouter;
pub use dashboard::{DashboardService, DashboardSummary};
pub use reminder_sweep::ReminderSweep;
pub use routing::RoutingService;
pub use shifts::ShiftService;
pub use status_sweep::StatusSweep;
