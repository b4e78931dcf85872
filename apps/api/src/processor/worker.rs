use crate::brand::load_snapshot;
use crate::database::{execute_query, fetch_one, queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{DownloadSize, Gallery, Photo, Variant};
use crate::processor::resolver::DerivativeResolver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// Pre-generation request queued after an original is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeJob {
    pub photo_id: i64,
    pub original_key: String,
    pub gallery_id: i64,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    generated: AtomicU64,
    last_completed_at: Mutex<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub queued: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
    pub generated_derivatives: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Handle for submitting jobs; cheap to clone.
#[derive(Clone)]
pub struct DerivativeQueue {
    tx: mpsc::Sender<DerivativeJob>,
    counters: Arc<Counters>,
}

impl DerivativeQueue {
    /// Never blocks. A full or closed queue drops the job; derivatives are then produced on first request.
    pub fn enqueue(&self, job: DerivativeJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Derivative queue full, dropping job for photo {}", job.photo_id);
                false
            }
            Err(TrySendError::Closed(job)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Derivative queue closed, dropping job for photo {}", job.photo_id);
                false
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        let c = &self.counters;
        WorkerStats {
            queued: c.queued.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            generated_derivatives: c.generated.load(Ordering::Relaxed),
            last_completed_at: c.last_completed_at.lock().ok().and_then(|at| *at),
        }
    }
}

/// Spawns `num_workers` consumers over a queue holding at most `capacity` jobs.
pub fn start_workers(
    pool: DbPool,
    resolver: Arc<DerivativeResolver>,
    num_workers: usize,
    capacity: usize,
) -> DerivativeQueue {
    let (tx, rx) = mpsc::channel::<DerivativeJob>(capacity.max(1));
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let counters = Arc::new(Counters::default());
    let num_workers = num_workers.max(1);

    for worker_id in 0..num_workers {
        let rx = Arc::clone(&rx);
        let pool = pool.clone();
        let resolver = Arc::clone(&resolver);
        let counters = Arc::clone(&counters);

        tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else {
                    debug!("Derivative worker {} stopping", worker_id);
                    break;
                };

                match process_job(&pool, &resolver, &job).await {
                    Ok(generated) => {
                        counters.completed.fetch_add(1, Ordering::Relaxed);
                        counters.generated.fetch_add(generated, Ordering::Relaxed);
                        if let Ok(mut at) = counters.last_completed_at.lock() {
                            *at = Some(Utc::now());
                        }
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!("Derivative job for photo {} failed: {}", job.photo_id, e);
                    }
                }
            }
        });
    }

    info!("Started {} derivative workers (queue capacity {})", num_workers, capacity);
    DerivativeQueue { tx, counters }
}

/// Renders every variant of one photo and records thumb/preview keys and dimensions.
///
/// Returns how many derivatives were newly generated.
pub async fn process_job(
    pool: &DbPool,
    resolver: &DerivativeResolver,
    job: &DerivativeJob,
) -> AppResult<u64> {
    let (photo, owner_id) = {
        let conn = pool.get()?;
        let photo = fetch_one(&conn, queries::photos::SELECT_BY_ID, &[&job.photo_id], Photo::from_row)?;
        let Some(photo) = photo else {
            debug!("Photo {} deleted before processing, skipping", job.photo_id);
            return Ok(0);
        };
        let gallery = fetch_one(&conn, queries::galleries::SELECT_BY_ID, &[&photo.gallery_id], Gallery::from_row)?
            .ok_or_else(|| AppError::NotFound(format!("Gallery {} not found", photo.gallery_id)))?;
        (photo, gallery.owner_id)
    };

    if photo.original_key != job.original_key || photo.gallery_id != job.gallery_id {
        debug!("Stale derivative job for photo {}, skipping", photo.id);
        return Ok(0);
    }

    let snapshot = load_snapshot(pool, resolver.storage().as_ref(), owner_id).await?;

    let thumb = resolver.resolve_variant(&photo, Variant::Thumb, &snapshot).await?;
    let preview = resolver.resolve_variant(&photo, Variant::Preview, &snapshot).await?;

    let mut generated = [thumb.generated, preview.generated].iter().filter(|g| **g).count() as u64;
    let mut dimensions = thumb.source_dimensions.or(preview.source_dimensions);

    for size in DownloadSize::ALL {
        match resolver
            .resolve_variant(&photo, Variant::Download(size), &snapshot)
            .await
        {
            Ok(resolved) => {
                if resolved.generated {
                    generated += 1;
                }
                dimensions = dimensions.or(resolved.source_dimensions);
            }
            Err(e) => warn!("Could not pre-generate {} for photo {}: {}", size.as_str(), photo.id, e),
        }
    }

    let (width, height) = match dimensions {
        Some((w, h)) => (Some(w), Some(h)),
        None => (None, None),
    };

    let conn = pool.get()?;
    execute_query(
        &conn,
        queries::photos::UPDATE_DERIVATIVES,
        &[&thumb.key, &preview.key, &width, &height, &photo.id],
    )?;

    info!("Derivatives ready for photo {} ({} generated)", photo.id, generated);
    Ok(generated)
}
