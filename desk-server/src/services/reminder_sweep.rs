//! Shift Reminder Sweep
//!
//! Periodic job nudging agents before their shift starts: one SMS when the
//! start is 25-30 minutes out, one email when it is 5-10 minutes out. The
//! persisted per-channel flags are claimed with a conditional UPDATE before
//! anything is sent, so overlapping sweeps and restarts never double-send.
//!
//! The sweep period must stay below the 5-minute window width or a shift
//! can slide through a window between two executions.

use crate::db::repository::shift as shift_repo;
use crate::directory::AgentDirectory;
use crate::notify::{Notification, NotificationKind, NotificationSink};
use crate::utils::AppResult;
use shared::models::Shift;
use shared::util::Now;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// Reminder windows, seconds before shift start (exclusive lower, inclusive upper)
const SMS_WINDOW_SECS: (i64, i64) = (25 * 60, 30 * 60);
const EMAIL_WINDOW_SECS: (i64, i64) = (5 * 60, 10 * 60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReminderOutcome {
    pub sms_sent: usize,
    pub email_sent: usize,
}

pub struct ReminderSweep {
    pool: SqlitePool,
    directory: Arc<dyn AgentDirectory>,
    notifier: Arc<dyn NotificationSink>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ReminderSweep {
    pub fn new(
        pool: SqlitePool,
        directory: Arc<dyn AgentDirectory>,
        notifier: Arc<dyn NotificationSink>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            directory,
            notifier,
            interval,
            shutdown,
        }
    }

    /// Interval loop until shutdown.
    pub async fn run(self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Reminder sweep started");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Reminder sweep received shutdown signal");
                    return;
                }
            }

            match self.run_once(Now::current()).await {
                Ok(outcome) if outcome.sms_sent > 0 || outcome.email_sent > 0 => {
                    tracing::info!(
                        sms = outcome.sms_sent,
                        email = outcome.email_sent,
                        "Reminder sweep sent notifications"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Reminder sweep failed");
                }
            }
        }
    }

    /// One pass over today's SCHEDULED shifts. A failure on one shift is
    /// logged and the batch continues.
    pub async fn run_once(&self, now: Now) -> AppResult<ReminderOutcome> {
        let today = now.local.date().format("%Y-%m-%d").to_string();
        let candidates = shift_repo::find_reminder_candidates(&self.pool, &today).await?;

        let mut outcome = ReminderOutcome::default();
        for shift in candidates {
            match self.process_shift(&shift, now).await {
                Ok((sms, email)) => {
                    outcome.sms_sent += usize::from(sms);
                    outcome.email_sent += usize::from(email);
                }
                Err(e) => {
                    tracing::warn!(shift_id = shift.id, error = %e, "Reminder processing failed, skipping shift");
                }
            }
        }
        Ok(outcome)
    }

    async fn process_shift(&self, shift: &Shift, now: Now) -> AppResult<(bool, bool)> {
        let Some(start) = shift.start_datetime() else {
            tracing::warn!(shift_id = shift.id, date = %shift.shift_date, "Unparseable shift date");
            return Ok((false, false));
        };
        let secs_until = (start - now.local).num_seconds();

        let mut sms = false;
        if !shift.sms_notification_sent
            && secs_until > SMS_WINDOW_SECS.0
            && secs_until <= SMS_WINDOW_SECS.1
        {
            // Claim the flag first; only the winner sends
            if shift_repo::mark_sms_sent(&self.pool, shift.id, now.epoch_ms).await? {
                self.send_reminder(shift, NotificationKind::ShiftSmsReminder, secs_until)
                    .await;
                sms = true;
            }
        }

        let mut email = false;
        if !shift.email_notification_sent
            && secs_until > EMAIL_WINDOW_SECS.0
            && secs_until <= EMAIL_WINDOW_SECS.1
        {
            if shift_repo::mark_email_sent(&self.pool, shift.id, now.epoch_ms).await? {
                self.send_reminder(shift, NotificationKind::ShiftEmailReminder, secs_until)
                    .await;
                email = true;
            }
        }

        Ok((sms, email))
    }

    async fn send_reminder(&self, shift: &Shift, kind: NotificationKind, secs_until: i64) {
        let agent = self.directory.resolve(shift.assigned_agent_id).await;
        let notification = Notification {
            kind,
            payload: serde_json::json!({
                "shift_id": shift.id,
                "shift_type": shift.shift_type,
                "shift_date": shift.shift_date,
                "start_time": shift.start_time,
                "minutes_until_start": secs_until / 60,
                "agent_id": shift.assigned_agent_id,
                "agent_name": agent.as_ref().map(|a| a.name.clone()),
                "agent_phone": agent.as_ref().and_then(|a| a.phone.clone()),
                "agent_email": agent.as_ref().and_then(|a| a.email.clone()),
            }),
        };
        if let Err(e) = self.notifier.send(notification).await {
            // Flag stays set: a reminder is best-effort, not retried
            tracing::warn!(shift_id = shift.id, kind = ?kind, error = %e, "Reminder notification failed");
        }
    }
}
