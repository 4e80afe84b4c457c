//! Support Request Repository
//!
//! Every status-changing write is a conditional UPDATE keyed on the status
//! the caller observed, so concurrent writers cannot interleave transitions.
//! Side-effect timestamps (assigned_at / started_at / resolved_at /
//! escalated_at) are set with COALESCE and therefore only once.

use super::{RepoError, RepoResult};
use shared::models::{Priority, RequestCreate, RequestQuery, RequestStatus, SupportRequest};
use shared::util::snowflake_id;
use sqlx::SqlitePool;

const COLUMNS: &str = "id, requester_id, assigned_agent_id, shift_id, request_type, priority, status, description, resolution, escalation_reason, metadata, notes, assigned_at, started_at, resolved_at, escalated_at, created_at, updated_at";

/// Field changes applied through [`apply_update`]. `None` leaves the column
/// untouched; metadata arrives pre-merged as a JSON string.
#[derive(Debug, Default)]
pub struct RequestChanges {
    pub status: Option<RequestStatus>,
    pub priority: Option<Priority>,
    pub resolution: Option<String>,
    pub escalation_reason: Option<String>,
    pub notes: Option<String>,
    pub metadata_json: Option<String>,
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<SupportRequest>> {
    let request = sqlx::query_as::<_, SupportRequest>(&format!(
        "SELECT {COLUMNS} FROM support_request WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(request)
}

pub async fn create(
    pool: &SqlitePool,
    data: &RequestCreate,
    now_ms: i64,
) -> RepoResult<SupportRequest> {
    let metadata = serde_json::to_string(&data.metadata)
        .map_err(|e| RepoError::Validation(format!("Invalid metadata: {e}")))?;

    let id = snowflake_id();
    sqlx::query(
        "INSERT INTO support_request (id, requester_id, request_type, priority, status, description, metadata, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?6, ?7, ?7)",
    )
    .bind(id)
    .bind(data.requester_id)
    .bind(data.request_type)
    .bind(data.priority.unwrap_or_default())
    .bind(&data.description)
    .bind(metadata)
    .bind(now_ms)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create support request".into()))
}

pub async fn find_all(pool: &SqlitePool, query: &RequestQuery) -> RepoResult<Vec<SupportRequest>> {
    let requests = sqlx::query_as::<_, SupportRequest>(&format!(
        "SELECT {COLUMNS} FROM support_request WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR request_type = ?2) AND (?3 IS NULL OR priority = ?3) AND (?4 IS NULL OR assigned_agent_id = ?4) AND (?5 IS NULL OR requester_id = ?5) AND (?6 IS NULL OR created_at >= ?6) AND (?7 IS NULL OR created_at < ?7) ORDER BY created_at DESC LIMIT COALESCE(?8, -1) OFFSET COALESCE(?9, 0)"
    ))
    .bind(query.status)
    .bind(query.request_type)
    .bind(query.priority)
    .bind(query.assigned_agent_id)
    .bind(query.requester_id)
    .bind(query.created_from)
    .bind(query.created_to)
    .bind(query.limit)
    .bind(query.offset)
    .fetch_all(pool)
    .await?;
    Ok(requests)
}

/// Apply field changes, conditional on the status the caller read
/// (`expected`). Timestamps keyed to the new status are set only when still
/// unset. Returns false when the row moved on concurrently.
pub async fn apply_update(
    pool: &SqlitePool,
    id: i64,
    expected: RequestStatus,
    changes: &RequestChanges,
    now_ms: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE support_request SET \
         status = COALESCE(?1, status), \
         priority = COALESCE(?2, priority), \
         resolution = COALESCE(?3, resolution), \
         escalation_reason = COALESCE(?4, escalation_reason), \
         notes = COALESCE(?5, notes), \
         metadata = COALESCE(?6, metadata), \
         assigned_at = CASE WHEN ?1 = 'ASSIGNED' THEN COALESCE(assigned_at, ?7) ELSE assigned_at END, \
         started_at = CASE WHEN ?1 = 'IN_PROGRESS' THEN COALESCE(started_at, ?7) ELSE started_at END, \
         resolved_at = CASE WHEN ?1 = 'RESOLVED' THEN COALESCE(resolved_at, ?7) ELSE resolved_at END, \
         escalated_at = CASE WHEN ?1 = 'ESCALATED' THEN COALESCE(escalated_at, ?7) ELSE escalated_at END, \
         updated_at = ?7 \
         WHERE id = ?8 AND status = ?9",
    )
    .bind(changes.status)
    .bind(changes.priority)
    .bind(&changes.resolution)
    .bind(&changes.escalation_reason)
    .bind(&changes.notes)
    .bind(&changes.metadata_json)
    .bind(now_ms)
    .bind(id)
    .bind(expected)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Self-assignment. One statement covers the whole precondition: not
/// terminal, and either unassigned or already held by the same agent
/// (idempotent re-take). Returns false when the precondition failed; the
/// caller re-reads the row to classify the failure.
pub async fn take(pool: &SqlitePool, id: i64, agent_id: i64, now_ms: i64) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE support_request SET assigned_agent_id = ?1, status = 'IN_PROGRESS', assigned_at = COALESCE(assigned_at, ?2), started_at = COALESCE(started_at, ?2), updated_at = ?2 WHERE id = ?3 AND status NOT IN ('RESOLVED', 'CANCELLED') AND (assigned_agent_id IS NULL OR assigned_agent_id = ?1)",
    )
    .bind(agent_id)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Admin-directed assignment, conditional on the observed status.
pub async fn assign(
    pool: &SqlitePool,
    id: i64,
    agent_id: i64,
    expected: RequestStatus,
    now_ms: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE support_request SET assigned_agent_id = ?1, status = 'ASSIGNED', assigned_at = COALESCE(assigned_at, ?2), updated_at = ?2 WHERE id = ?3 AND status = ?4",
    )
    .bind(agent_id)
    .bind(now_ms)
    .bind(id)
    .bind(expected)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Auto-router claim: only a still-PENDING, unassigned request can be
/// routed, so a concurrent take or assign always wins over the router.
pub async fn route_pending(
    pool: &SqlitePool,
    id: i64,
    agent_id: i64,
    shift_id: i64,
    now_ms: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE support_request SET assigned_agent_id = ?1, shift_id = ?2, status = 'ASSIGNED', assigned_at = COALESCE(assigned_at, ?3), updated_at = ?3 WHERE id = ?4 AND status = 'PENDING' AND assigned_agent_id IS NULL",
    )
    .bind(agent_id)
    .bind(shift_id)
    .bind(now_ms)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

pub async fn count_pending(pool: &SqlitePool) -> RepoResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM support_request WHERE status = 'PENDING'")
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Requests currently awaiting work by an agent (SLA watch set).
pub async fn find_open_assigned(pool: &SqlitePool) -> RepoResult<Vec<SupportRequest>> {
    let requests = sqlx::query_as::<_, SupportRequest>(&format!(
        "SELECT {COLUMNS} FROM support_request WHERE status IN ('ASSIGNED', 'IN_PROGRESS') ORDER BY created_at"
    ))
    .fetch_all(pool)
    .await?;
    Ok(requests)
}

pub async fn count_by_status(
    pool: &SqlitePool,
    from_ms: i64,
    to_ms: i64,
) -> RepoResult<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM support_request WHERE created_at >= ? AND created_at < ? GROUP BY status",
    )
    .bind(from_ms)
    .bind(to_ms)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_by_type(
    pool: &SqlitePool,
    from_ms: i64,
    to_ms: i64,
) -> RepoResult<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT request_type, COUNT(*) FROM support_request WHERE created_at >= ? AND created_at < ? GROUP BY request_type",
    )
    .bind(from_ms)
    .bind(to_ms)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_by_priority(
    pool: &SqlitePool,
    from_ms: i64,
    to_ms: i64,
) -> RepoResult<Vec<(String, i64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT priority, COUNT(*) FROM support_request WHERE created_at >= ? AND created_at < ? GROUP BY priority",
    )
    .bind(from_ms)
    .bind(to_ms)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mean minutes from creation to first assignment; rows never assigned are
/// excluded, None when no row qualifies.
pub async fn avg_response_minutes(
    pool: &SqlitePool,
    from_ms: i64,
    to_ms: i64,
) -> RepoResult<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT AVG((assigned_at - created_at) / 60000.0) FROM support_request WHERE assigned_at IS NOT NULL AND created_at >= ? AND created_at < ?",
    )
    .bind(from_ms)
    .bind(to_ms)
    .fetch_one(pool)
    .await?;
    Ok(avg)
}

/// Mean minutes from creation to resolution over resolved rows.
pub async fn avg_resolution_minutes(
    pool: &SqlitePool,
    from_ms: i64,
    to_ms: i64,
) -> RepoResult<Option<f64>> {
    let avg: Option<f64> = sqlx::query_scalar(
        "SELECT AVG((resolved_at - created_at) / 60000.0) FROM support_request WHERE resolved_at IS NOT NULL AND created_at >= ? AND created_at < ?",
    )
    .bind(from_ms)
    .bind(to_ms)
    .fetch_one(pool)
    .await?;
    Ok(avg)
}
