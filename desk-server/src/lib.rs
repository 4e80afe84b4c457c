//! Desk Server - support desk scheduling and routing node
//!
//! # Overview
//!
//! The desk keeps two records straight and keeps them honest over time:
//!
//! - **Duty shifts** (`services::shifts`): fixed clock windows on calendar
//!   dates, staffed by one agent, driven SCHEDULED -> ACTIVE -> COMPLETED
//!   by the agent or the hourly status sweep
//! - **Support requests** (`services::routing`): tickets routed to whoever
//!   is on duty, with an explicit status machine and SLA thresholds by
//!   priority
//!
//! # Module structure
//!
//! ```text
//! desk-server/src/
//! ├── core/          # config, state, background tasks
//! ├── db/            # SQLite pool, migrations, repositories
//! ├── directory/     # read-only agent directory seam
//! ├── notify/        # fire-and-forget notification sink seam
//! ├── services/      # shifts, routing, auto-router, sweeps, dashboard
//! └── utils/         # errors, logging
//! ```

pub mod core;
pub mod db;
pub mod directory;
pub mod notify;
pub mod services;
pub mod utils;

// Re-export common types
pub use crate::core::{BackgroundTasks, Config, ServerState, TaskKind};
pub use services::{
    AutoRouter, DashboardService, ReminderSweep, RoutingService, ShiftService, StatusSweep,
};
pub use utils::{AppError, AppResult, init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
    ____            __
   / __ \___  _____/ /__
  / / / / _ \/ ___/ //_/
 / /_/ /  __(__  ) ,<
/_____/\___/____/_/|_|
    "#
    );
}
