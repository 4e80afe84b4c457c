//! Shift Status Sweep
//!
//! Periodic job keeping shift statuses honest against the wall clock:
//! today's SCHEDULED shifts whose window has opened become ACTIVE, and
//! ACTIVE shifts whose window has closed become COMPLETED. Both moves are
//! compare-and-swap updates, so an overlapping execution (or an agent
//! checking in at the same moment) results in a no-op, never a double
//! transition.

use crate::db::repository::shift as shift_repo;
use crate::utils::AppResult;
use shared::models::ShiftStatus;
use shared::util::Now;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct StatusOutcome {
    pub activated: usize,
    pub completed: usize,
}

pub struct StatusSweep {
    pool: SqlitePool,
    interval: Duration,
    shutdown: CancellationToken,
}

impl StatusSweep {
    pub fn new(pool: SqlitePool, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            pool,
            interval,
            shutdown,
        }
    }

    /// Interval loop until shutdown. Runs one pass immediately on startup
    /// so a restart catches up without waiting a full interval.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Status sweep started");

        self.sweep().await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Status sweep received shutdown signal");
                    return;
                }
            }
            self.sweep().await;
        }
    }

    async fn sweep(&self) {
        match self.run_once(Now::current()).await {
            Ok(outcome) if outcome.activated > 0 || outcome.completed > 0 => {
                tracing::info!(
                    activated = outcome.activated,
                    completed = outcome.completed,
                    "Status sweep applied transitions"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Status sweep failed");
            }
        }
    }

    /// One pass. Per-shift CAS failures count as no-ops, repository errors
    /// on one shift are logged and skipped.
    pub async fn run_once(&self, now: Now) -> AppResult<StatusOutcome> {
        let mut outcome = StatusOutcome::default();
        let today = now.local.date().format("%Y-%m-%d").to_string();

        // SCHEDULED -> ACTIVE for windows that have opened
        for shift in shift_repo::find_open_for_date(&self.pool, &today).await? {
            if shift.status != ShiftStatus::Scheduled || !shift.is_window_open(now.local) {
                continue;
            }
            match shift_repo::update_status(
                &self.pool,
                shift.id,
                ShiftStatus::Scheduled,
                ShiftStatus::Active,
                now.epoch_ms,
            )
            .await
            {
                Ok(true) => {
                    tracing::info!(shift_id = shift.id, "Shift activated by sweep");
                    outcome.activated += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(shift_id = shift.id, error = %e, "Shift activation failed, skipping");
                }
            }
        }

        // ACTIVE -> COMPLETED for windows that have closed (any date)
        for shift in shift_repo::find_active(&self.pool).await? {
            if shift.is_window_open(now.local) {
                continue;
            }
            match shift_repo::update_status(
                &self.pool,
                shift.id,
                ShiftStatus::Active,
                ShiftStatus::Completed,
                now.epoch_ms,
            )
            .await
            {
                Ok(true) => {
                    tracing::info!(shift_id = shift.id, "Shift completed by sweep");
                    outcome.completed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(shift_id = shift.id, error = %e, "Shift completion failed, skipping");
                }
            }
        }

        Ok(outcome)
    }
}
