//! Duty Shift Model
//!
//! A shift is a fixed clock window on a calendar date, staffed by exactly
//! one support agent. The clock windows are a fixed table keyed by
//! [`ShiftType`]; the NIGHT window wraps past midnight.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Shift type with its fixed clock window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ShiftType {
    /// 08:00 - 13:00
    Morning,
    /// 13:00 - 18:00
    Afternoon,
    /// 18:00 - 23:00
    Evening,
    /// 23:00 - 08:00 (crosses midnight)
    Night,
}

impl ShiftType {
    pub const ALL: [ShiftType; 4] = [
        ShiftType::Morning,
        ShiftType::Afternoon,
        ShiftType::Evening,
        ShiftType::Night,
    ];

    /// Fixed `(start, end)` clock window for this shift type.
    pub fn window(&self) -> (NaiveTime, NaiveTime) {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).expect("valid clock time");
        match self {
            ShiftType::Morning => (t(8, 0), t(13, 0)),
            ShiftType::Afternoon => (t(13, 0), t(18, 0)),
            ShiftType::Evening => (t(18, 0), t(23, 0)),
            ShiftType::Night => (t(23, 0), t(8, 0)),
        }
    }

    /// Whether this type's window crosses midnight.
    pub fn wraps_midnight(&self) -> bool {
        matches!(self, ShiftType::Night)
    }

    /// Whether `clock` falls inside this type's window.
    ///
    /// Non-wrapping windows use `start <= clock < end`; the NIGHT window
    /// uses `clock >= start || clock < end`.
    pub fn contains(&self, clock: NaiveTime) -> bool {
        let (start, end) = self.window();
        if self.wraps_midnight() {
            clock >= start || clock < end
        } else {
            clock >= start && clock < end
        }
    }

    /// Cyclic successor (Morning -> Afternoon -> Evening -> Night -> Morning).
    pub fn next(&self) -> ShiftType {
        match self {
            ShiftType::Morning => ShiftType::Afternoon,
            ShiftType::Afternoon => ShiftType::Evening,
            ShiftType::Evening => ShiftType::Night,
            ShiftType::Night => ShiftType::Morning,
        }
    }

    /// Window start as `HH:MM` (stored snapshot on the shift row).
    pub fn start_clock(&self) -> String {
        self.window().0.format("%H:%M").to_string()
    }

    /// Window end as `HH:MM`.
    pub fn end_clock(&self) -> String {
        self.window().1.format("%H:%M").to_string()
    }
}

/// Shift lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ShiftStatus {
    Scheduled,
    Active,
    Completed,
    Missed,
    Cancelled,
}

impl Default for ShiftStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl ShiftStatus {
    /// Statuses that occupy a `(date, type)` slot for the uniqueness check.
    /// Only MISSED and CANCELLED slots are reusable.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, ShiftStatus::Missed | ShiftStatus::Cancelled)
    }
}

/// Shift entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Shift {
    pub id: i64,
    pub shift_type: ShiftType,
    /// Calendar date the shift occurs on (`YYYY-MM-DD`)
    pub shift_date: String,
    /// Window start snapshot (`HH:MM`, derived from `shift_type`)
    pub start_time: String,
    /// Window end snapshot (`HH:MM`)
    pub end_time: String,
    pub status: ShiftStatus,
    /// External agent identity (referenced, never owned)
    pub assigned_agent_id: i64,
    /// Idempotency guard for the SMS reminder sweep
    pub sms_notification_sent: bool,
    pub sms_notification_sent_at: Option<i64>,
    /// Idempotency guard for the email reminder sweep
    pub email_notification_sent: bool,
    pub email_notification_sent_at: Option<i64>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Shift {
    /// Parsed calendar date. Stored dates are written from a `NaiveDate`
    /// so this only fails on hand-edited rows.
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.shift_date, "%Y-%m-%d").ok()
    }

    /// Local datetime at which the shift starts.
    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        Some(self.date()?.and_time(self.shift_type.window().0))
    }

    /// Whether `now` (local wall clock) falls inside this shift's window.
    ///
    /// The date must match `shift_date`; for NIGHT the early-morning tail
    /// of the same calendar date also counts as in-window.
    pub fn is_window_open(&self, now: NaiveDateTime) -> bool {
        match self.date() {
            Some(date) if date == now.date() => self.shift_type.contains(now.time()),
            _ => false,
        }
    }
}

/// Create shift payload (admin action)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftCreate {
    pub shift_type: ShiftType,
    pub shift_date: NaiveDate,
    pub assigned_agent_id: i64,
    pub notes: Option<String>,
}

/// Update shift payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ShiftStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Shift list filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub shift_type: Option<ShiftType>,
    pub status: Option<ShiftStatus>,
    pub assigned_agent_id: Option<i64>,
}
