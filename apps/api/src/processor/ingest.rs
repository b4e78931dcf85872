use crate::constants::IMAGE_EXTENSIONS;
use crate::database::{fetch_one, insert_returning_id, queries, with_immediate_transaction, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{Gallery, Photo};
use crate::processor::artifacts::invalidate_archives;
use crate::processor::worker::{DerivativeJob, DerivativeQueue};
use crate::storage::keys::original_key;
use crate::storage::{BoxedReader, Storage};
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Lowercased extension of an upload name, if it is a supported image type.
pub fn image_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    IMAGE_EXTENSIONS.contains(ext.as_str()).then_some(ext)
}

/// Stores an uploaded original, records the photo and queues its derivatives.
///
/// The object is written before the row exists, so a crash in between leaves
/// an unreferenced original rather than a photo without one.
pub async fn ingest_original(
    pool: &DbPool,
    storage: &dyn Storage,
    queue: Option<&DerivativeQueue>,
    gallery_id: i64,
    filename: &str,
    reader: BoxedReader,
) -> AppResult<Photo> {
    let filename = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation("A filename is required".to_string()))?
        .to_string();
    let extension = image_extension(&filename)
        .ok_or_else(|| AppError::Validation(format!("Unsupported file type: {}", filename)))?;

    {
        let conn = pool.get()?;
        fetch_one(&conn, queries::galleries::SELECT_BY_ID, &[&gallery_id], Gallery::from_row)?
            .ok_or_else(|| AppError::NotFound(format!("Gallery {} not found", gallery_id)))?;
    }

    let file_id = Uuid::new_v4().simple().to_string();
    let key = original_key(gallery_id, &file_id, &extension);
    storage.save(reader, &key).await?;

    if storage.size(&key).await?.unwrap_or(0) == 0 {
        storage.delete(&key).await;
        return Err(AppError::Validation("Uploaded file is empty".to_string()));
    }

    let inserted = {
        let mut conn = pool.get()?;
        with_immediate_transaction(&mut conn, |tx| {
            let order_index: i64 =
                fetch_one(tx, queries::photos::NEXT_ORDER_INDEX, &[&gallery_id], |r| r.get(0))?
                    .unwrap_or(0);
            let photo_id = insert_returning_id(
                tx,
                queries::photos::INSERT,
                &[&gallery_id, &file_id, &filename, &extension, &key, &order_index],
            )?;
            fetch_one(tx, queries::photos::SELECT_BY_ID, &[&photo_id], Photo::from_row)?
                .ok_or_else(|| AppError::Internal(format!("Photo {} vanished after insert", photo_id)))
        })
    };

    let photo = match inserted {
        Ok(photo) => photo,
        Err(e) => {
            storage.delete(&key).await;
            return Err(e);
        }
    };

    invalidate_archives(storage, gallery_id).await;

    match queue {
        Some(queue) => {
            queue.enqueue(DerivativeJob {
                photo_id: photo.id,
                original_key: photo.original_key.clone(),
                gallery_id,
            });
        }
        None => warn!("No derivative queue; photo {} will render on demand", photo.id),
    }

    info!(
        "Ingested {} into gallery {} as photo {} ({})",
        filename, gallery_id, photo.id, key
    );
    Ok(photo)
}
