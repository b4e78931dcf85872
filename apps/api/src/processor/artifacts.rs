//! Removal of stored objects that belong to photos and galleries.
//!
//! Storage deletes are best-effort; database rows are always removed first so a
//! failed object delete leaves an orphan rather than a row pointing at nothing.

use crate::database::{execute_query, fetch_all, fetch_one, queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::Photo;
use crate::storage::keys::{all_variant_keys, archive_prefix, derivative_prefixes};
use crate::storage::Storage;
use tracing::{debug, info};

/// Deletes the original, every derivative and the gallery's cached archives.
pub async fn delete_photo_artifacts(storage: &dyn Storage, photo: &Photo) {
    storage.delete(&photo.original_key).await;
    for key in all_variant_keys(photo) {
        storage.delete(&key).await;
    }
    for key in [&photo.thumb_key, &photo.preview_key].into_iter().flatten() {
        storage.delete(key).await;
    }
    invalidate_archives(storage, photo.gallery_id).await;
    debug!("Removed stored artifacts for photo {}", photo.id);
}

/// Cached ZIPs list the gallery's photos, so any change to the set makes them stale.
pub async fn invalidate_archives(storage: &dyn Storage, gallery_id: i64) {
    storage.delete_prefix(&archive_prefix(gallery_id)).await;
}

/// Drops every generated artifact of a gallery, keeping originals.
pub async fn purge_gallery_derivatives(storage: &dyn Storage, gallery_id: i64) {
    for prefix in derivative_prefixes(gallery_id) {
        storage.delete_prefix(&prefix).await;
    }
    info!("Purged derivatives for gallery {}", gallery_id);
}

pub async fn delete_photo(
    pool: &DbPool,
    storage: &dyn Storage,
    gallery_id: i64,
    photo_id: i64,
) -> AppResult<()> {
    let photo = {
        let conn = pool.get()?;
        let photo = fetch_one(
            &conn,
            queries::photos::SELECT_BY_ID_IN_GALLERY,
            &[&photo_id, &gallery_id],
            Photo::from_row,
        )?
        .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", photo_id)))?;
        execute_query(&conn, queries::photos::DELETE, &[&photo.id])?;
        photo
    };

    delete_photo_artifacts(storage, &photo).await;
    info!("Deleted photo {} from gallery {}", photo.id, gallery_id);
    Ok(())
}

/// Deletes a gallery row (photos and favorites cascade) and then its stored objects.
pub async fn delete_gallery(pool: &DbPool, storage: &dyn Storage, gallery_id: i64) -> AppResult<usize> {
    let photos = {
        let conn = pool.get()?;
        let photos = fetch_all(
            &conn,
            queries::photos::SELECT_FOR_GALLERY,
            &[&gallery_id],
            Photo::from_row,
        )?;
        let deleted = execute_query(&conn, queries::galleries::DELETE, &[&gallery_id])?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Gallery {} not found", gallery_id)));
        }
        photos
    };

    for photo in &photos {
        storage.delete(&photo.original_key).await;
    }
    purge_gallery_derivatives(storage, gallery_id).await;
    storage.delete_prefix(&format!("{}/", gallery_id)).await;

    info!("Deleted gallery {} with {} photos", gallery_id, photos.len());
    Ok(photos.len())
}
