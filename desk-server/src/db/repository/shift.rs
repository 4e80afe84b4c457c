//! Shift Repository
//!
//! One row per `(date, type)` slot. Status and reminder-flag writes are
//! conditional UPDATEs so concurrent sweeps and callers cannot double-apply
//! a transition.

use super::{RepoError, RepoResult};
use shared::models::{Shift, ShiftCreate, ShiftQuery, ShiftStatus, ShiftType, ShiftUpdate};
use shared::util::snowflake_id;
use sqlx::SqlitePool;

const COLUMNS: &str = "id, shift_type, shift_date, start_time, end_time, status, assigned_agent_id, sms_notification_sent, sms_notification_sent_at, email_notification_sent, email_notification_sent_at, notes, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Shift>> {
    let shift = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {COLUMNS} FROM shift WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(shift)
}

/// Insert a SCHEDULED shift. The clock window is derived from the type,
/// never taken from the caller. Returns Conflict when a live (non-MISSED,
/// non-CANCELLED) shift already occupies the `(date, type)` slot; the
/// partial unique index backs the same rule under races.
pub async fn create(pool: &SqlitePool, data: &ShiftCreate, now_ms: i64) -> RepoResult<Shift> {
    let date = data.shift_date.format("%Y-%m-%d").to_string();

    if slot_occupied(pool, &date, data.shift_type).await? {
        return Err(RepoError::Conflict(format!(
            "A {:?} shift already exists on {date}",
            data.shift_type
        )));
    }

    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO shift (id, shift_type, shift_date, start_time, end_time, status, assigned_agent_id, sms_notification_sent, email_notification_sent, notes, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, 'SCHEDULED', ?6, 0, 0, ?7, ?8, ?8)",
    )
    .bind(id)
    .bind(data.shift_type)
    .bind(&date)
    .bind(data.shift_type.start_clock())
    .bind(data.shift_type.end_clock())
    .bind(data.assigned_agent_id)
    .bind(&data.notes)
    .bind(now_ms)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create shift".into()))
}

async fn slot_occupied(pool: &SqlitePool, date: &str, shift_type: ShiftType) -> RepoResult<bool> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM shift WHERE shift_date = ? AND shift_type = ? AND status NOT IN ('MISSED', 'CANCELLED') LIMIT 1",
    )
    .bind(date)
    .bind(shift_type)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn find_all(pool: &SqlitePool, query: &ShiftQuery) -> RepoResult<Vec<Shift>> {
    let start = query.start_date.map(|d| d.format("%Y-%m-%d").to_string());
    let end = query.end_date.map(|d| d.format("%Y-%m-%d").to_string());
    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {COLUMNS} FROM shift WHERE (?1 IS NULL OR shift_date >= ?1) AND (?2 IS NULL OR shift_date <= ?2) AND (?3 IS NULL OR shift_type = ?3) AND (?4 IS NULL OR status = ?4) AND (?5 IS NULL OR assigned_agent_id = ?5) ORDER BY shift_date, start_time"
    ))
    .bind(start)
    .bind(end)
    .bind(query.shift_type)
    .bind(query.status)
    .bind(query.assigned_agent_id)
    .fetch_all(pool)
    .await?;
    Ok(shifts)
}

/// SCHEDULED and ACTIVE shifts on the given date, window order.
pub async fn find_open_for_date(pool: &SqlitePool, date: &str) -> RepoResult<Vec<Shift>> {
    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {COLUMNS} FROM shift WHERE shift_date = ? AND status IN ('SCHEDULED', 'ACTIVE') ORDER BY start_time"
    ))
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(shifts)
}

/// Every ACTIVE shift regardless of date (status sweep completion pass).
pub async fn find_active(pool: &SqlitePool) -> RepoResult<Vec<Shift>> {
    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {COLUMNS} FROM shift WHERE status = 'ACTIVE' ORDER BY shift_date, start_time"
    ))
    .fetch_all(pool)
    .await?;
    Ok(shifts)
}

/// SCHEDULED shifts on `date` still missing at least one reminder.
pub async fn find_reminder_candidates(pool: &SqlitePool, date: &str) -> RepoResult<Vec<Shift>> {
    let shifts = sqlx::query_as::<_, Shift>(&format!(
        "SELECT {COLUMNS} FROM shift WHERE shift_date = ? AND status = 'SCHEDULED' AND (sms_notification_sent = 0 OR email_notification_sent = 0) ORDER BY start_time"
    ))
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(shifts)
}

pub async fn count_active(pool: &SqlitePool) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shift WHERE status = 'ACTIVE'")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn update(
    pool: &SqlitePool,
    id: i64,
    data: &ShiftUpdate,
    now_ms: i64,
) -> RepoResult<Shift> {
    let rows = sqlx::query(
        "UPDATE shift SET assigned_agent_id = COALESCE(?1, assigned_agent_id), status = COALESCE(?2, status), notes = COALESCE(?3, notes), updated_at = ?4 WHERE id = ?5",
    )
    .bind(data.assigned_agent_id)
    .bind(data.status)
    .bind(&data.notes)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Shift {id} not found")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Shift {id} not found")))
}

/// Delete a shift while it is still SCHEDULED. Returns false when the row
/// is missing or already past SCHEDULED.
pub async fn delete_scheduled(pool: &SqlitePool, id: i64) -> RepoResult<bool> {
    let rows = sqlx::query("DELETE FROM shift WHERE id = ? AND status = 'SCHEDULED'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

/// Compare-and-swap status transition. Returns false when the row was not
/// in `from` anymore (lost race or repeated sweep), which callers treat as
/// a no-op or a Conflict depending on context.
pub async fn update_status(
    pool: &SqlitePool,
    id: i64,
    from: ShiftStatus,
    to: ShiftStatus,
    now_ms: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query("UPDATE shift SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4")
        .bind(to)
        .bind(now_ms)
        .bind(id)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(rows.rows_affected() > 0)
}

/// Claim the SMS reminder for a shift. The flag is the idempotency guard:
/// only the first caller gets `true` and may send.
pub async fn mark_sms_sent(pool: &SqlitePool, id: i64, now_ms: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE shift SET sms_notification_sent = 1, sms_notification_sent_at = ?1, updated_at = ?1 WHERE id = ?2 AND sms_notification_sent = 0",
    )
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Claim the email reminder for a shift (independent of the SMS flag).
pub async fn mark_email_sent(pool: &SqlitePool, id: i64, now_ms: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE shift SET email_notification_sent = 1, email_notification_sent_at = ?1, updated_at = ?1 WHERE id = ?2 AND email_notification_sent = 0",
    )
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::NaiveDate;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn morning(date: &str, agent: i64) -> ShiftCreate {
        ShiftCreate {
            shift_type: ShiftType::Morning,
            shift_date: day(date),
            assigned_agent_id: agent,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_persists_scheduled_with_derived_window() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        assert_eq!(shift.status, ShiftStatus::Scheduled);
        assert_eq!(shift.shift_date, "2026-03-10");
        assert_eq!(shift.start_time, "08:00");
        assert_eq!(shift.end_time, "13:00");
        assert!(!shift.sms_notification_sent);
        assert!(!shift.email_notification_sent);
        assert_eq!(shift.created_at, 1000);
    }

    #[tokio::test]
    async fn test_create_rejects_occupied_slot() {
        let pool = test_pool().await;
        create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        let err = create(&pool, &morning("2026-03-10", 43), 2000).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_cancelled_slot_is_reusable() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        update(
            &pool,
            shift.id,
            &ShiftUpdate {
                status: Some(ShiftStatus::Cancelled),
                ..Default::default()
            },
            2000,
        )
        .await
        .unwrap();

        // Same slot, different agent: allowed once the first shift is cancelled
        let again = create(&pool, &morning("2026-03-10", 43), 3000).await.unwrap();
        assert_eq!(again.assigned_agent_id, 43);
    }

    #[tokio::test]
    async fn test_completed_slot_still_blocks() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        update_status(&pool, shift.id, ShiftStatus::Scheduled, ShiftStatus::Active, 2000)
            .await
            .unwrap();
        update_status(&pool, shift.id, ShiftStatus::Active, ShiftStatus::Completed, 3000)
            .await
            .unwrap();
        let err = create(&pool, &morning("2026-03-10", 43), 4000).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_same_date_different_types_coexist() {
        let pool = test_pool().await;
        create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        let mut data = morning("2026-03-10", 42);
        data.shift_type = ShiftType::Night;
        let night = create(&pool, &data, 2000).await.unwrap();
        assert_eq!(night.start_time, "23:00");
        assert_eq!(night.end_time, "08:00");
    }

    #[tokio::test]
    async fn test_update_status_cas_single_winner() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();

        let first = update_status(&pool, shift.id, ShiftStatus::Scheduled, ShiftStatus::Active, 2000)
            .await
            .unwrap();
        let second = update_status(&pool, shift.id, ShiftStatus::Scheduled, ShiftStatus::Active, 2000)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let shift = find_by_id(&pool, shift.id).await.unwrap().unwrap();
        assert_eq!(shift.status, ShiftStatus::Active);
    }

    #[tokio::test]
    async fn test_reminder_flags_claimed_once_and_independent() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();

        assert!(mark_sms_sent(&pool, shift.id, 2000).await.unwrap());
        assert!(!mark_sms_sent(&pool, shift.id, 3000).await.unwrap());

        // Email flag unaffected by the SMS claim
        assert!(mark_email_sent(&pool, shift.id, 4000).await.unwrap());
        assert!(!mark_email_sent(&pool, shift.id, 5000).await.unwrap());

        let shift = find_by_id(&pool, shift.id).await.unwrap().unwrap();
        assert_eq!(shift.sms_notification_sent_at, Some(2000));
        assert_eq!(shift.email_notification_sent_at, Some(4000));
    }

    #[tokio::test]
    async fn test_reminder_candidates_exclude_fully_notified() {
        let pool = test_pool().await;
        let a = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        let mut data = morning("2026-03-10", 43);
        data.shift_type = ShiftType::Evening;
        let b = create(&pool, &data, 1000).await.unwrap();

        mark_sms_sent(&pool, a.id, 2000).await.unwrap();
        mark_email_sent(&pool, a.id, 2000).await.unwrap();

        let candidates = find_reminder_candidates(&pool, "2026-03-10").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, b.id);
    }

    #[tokio::test]
    async fn test_delete_only_while_scheduled() {
        let pool = test_pool().await;
        let shift = create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        update_status(&pool, shift.id, ShiftStatus::Scheduled, ShiftStatus::Active, 2000)
            .await
            .unwrap();
        assert!(!delete_scheduled(&pool, shift.id).await.unwrap());

        let other = create(&pool, &morning("2026-03-11", 42), 3000).await.unwrap();
        assert!(delete_scheduled(&pool, other.id).await.unwrap());
        assert!(find_by_id(&pool, other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_all_filters() {
        let pool = test_pool().await;
        create(&pool, &morning("2026-03-10", 42), 1000).await.unwrap();
        create(&pool, &morning("2026-03-11", 43), 1000).await.unwrap();
        let mut data = morning("2026-03-12", 42);
        data.shift_type = ShiftType::Night;
        create(&pool, &data, 1000).await.unwrap();

        let by_agent = find_all(
            &pool,
            &ShiftQuery {
                assigned_agent_id: Some(42),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_agent.len(), 2);

        let in_range = find_all(
            &pool,
            &ShiftQuery {
                start_date: Some(day("2026-03-11")),
                end_date: Some(day("2026-03-12")),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(in_range.len(), 2);

        let nights = find_all(
            &pool,
            &ShiftQuery {
                shift_type: Some(ShiftType::Night),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(nights.len(), 1);
    }
}
