//! Rolling download quota per gallery.
//!
//! Every read-modify-write runs in one IMMEDIATE transaction so concurrent
//! reservations for the same gallery serialize on the database write lock.

use crate::database::{execute_query, fetch_one, queries, with_immediate_transaction, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::QuotaStatusResponse;
use crate::utils::datetime::{format_datetime, parse_datetime};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct QuotaPolicy {
    pub window_seconds: i64,
    /// Used when the gallery has no limit of its own.
    pub default_limit: Option<i64>,
}

enum Outcome {
    Reserved(QuotaStatusResponse),
    Rejected { count: i64, limit: i64 },
}

/// Reserves `units` downloads against the gallery's quota at time `now`.
pub fn reserve_downloads(
    pool: &DbPool,
    gallery_id: i64,
    units: i64,
    policy: QuotaPolicy,
    now: DateTime<Utc>,
) -> AppResult<QuotaStatusResponse> {
    let mut conn = pool.get()?;

    // rejections commit too, so an elapsed window reset is never lost
    let outcome = with_immediate_transaction(&mut conn, |tx| {
        let (mut count, limit, mut reset_at): (i64, Option<i64>, Option<String>) =
            fetch_one(tx, queries::quota::SELECT_COUNTERS, &[&gallery_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .ok_or_else(|| AppError::NotFound(format!("Gallery {} not found", gallery_id)))?;

        if window_elapsed(reset_at.as_deref(), now) {
            execute_query(tx, queries::quota::RESET_COUNTER, &[&gallery_id])?;
            debug!("Quota window for gallery {} elapsed, counter reset", gallery_id);
            count = 0;
            reset_at = None;
        }

        let Some(limit) = limit.or(policy.default_limit) else {
            return Ok(Outcome::Reserved(QuotaStatusResponse {
                download_count: count,
                download_limit: None,
                reset_at,
            }));
        };

        if count + units > limit {
            return Ok(Outcome::Rejected { count, limit });
        }

        let window_end = format_datetime(&(now + Duration::seconds(policy.window_seconds)));
        execute_query(tx, queries::quota::RESERVE, &[&units, &window_end, &gallery_id])?;

        Ok(Outcome::Reserved(QuotaStatusResponse {
            download_count: count + units,
            download_limit: Some(limit),
            reset_at: reset_at.or(Some(window_end)),
        }))
    })?;

    match outcome {
        Outcome::Reserved(status) => Ok(status),
        Outcome::Rejected { count, limit } => Err(AppError::QuotaExceeded(format!(
            "{} of {} downloads used",
            count, limit
        ))),
    }
}

/// Clears the counter and the window; owner-only at the HTTP layer.
pub fn reset_quota(pool: &DbPool, gallery_id: i64) -> AppResult<()> {
    let mut conn = pool.get()?;
    let updated = with_immediate_transaction(&mut conn, |tx| {
        execute_query(tx, queries::quota::RESET_COUNTER, &[&gallery_id])
    })?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("Gallery {} not found", gallery_id)));
    }
    info!("Download quota reset for gallery {}", gallery_id);
    Ok(())
}

pub fn quota_status(pool: &DbPool, gallery_id: i64, policy: QuotaPolicy, now: DateTime<Utc>) -> AppResult<QuotaStatusResponse> {
    let conn = pool.get()?;
    let (count, limit, reset_at): (i64, Option<i64>, Option<String>) =
        fetch_one(&conn, queries::quota::SELECT_COUNTERS, &[&gallery_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })?
        .ok_or_else(|| AppError::NotFound(format!("Gallery {} not found", gallery_id)))?;

    if window_elapsed(reset_at.as_deref(), now) {
        return Ok(QuotaStatusResponse {
            download_count: 0,
            download_limit: limit.or(policy.default_limit),
            reset_at: None,
        });
    }
    Ok(QuotaStatusResponse {
        download_count: count,
        download_limit: limit.or(policy.default_limit),
        reset_at,
    })
}

/// Read-only check that `units` more downloads would fit, without reserving them.
///
/// Lets callers refuse before doing expensive work; the later reservation still decides.
pub fn ensure_quota_available(
    pool: &DbPool,
    gallery_id: i64,
    units: i64,
    policy: QuotaPolicy,
    now: DateTime<Utc>,
) -> AppResult<()> {
    let status = quota_status(pool, gallery_id, policy, now)?;
    match status.download_limit {
        Some(limit) if status.download_count + units > limit => Err(AppError::QuotaExceeded(format!(
            "{} of {} downloads used",
            status.download_count, limit
        ))),
        _ => Ok(()),
    }
}

fn window_elapsed(reset_at: Option<&str>, now: DateTime<Utc>) -> bool {
    match reset_at.filter(|s| !s.is_empty()) {
        Some(raw) => parse_datetime(raw).map(|at| at <= now).unwrap_or(true),
        None => false,
    }
}
