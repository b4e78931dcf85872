//! Per-owner branding: watermark settings, their snapshot for rendering, and invalidation on change.

use crate::database::{execute_query, fetch_all, fetch_one, queries, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::BrandSettings;
use crate::processor::artifacts::purge_gallery_derivatives;
use crate::processor::ingest::image_extension;
use crate::processor::watermark::WatermarkSnapshot;
use crate::storage::{BoxedReader, Storage};
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stored settings for `owner_id`, or defaults when none were saved.
pub fn get_settings(conn: &Connection, owner_id: i64) -> AppResult<BrandSettings> {
    Ok(
        fetch_one(conn, queries::brand::SELECT_FOR_OWNER, &[&owner_id], BrandSettings::from_row)?
            .unwrap_or_default(),
    )
}

pub fn save_settings(conn: &Connection, owner_id: i64, settings: &BrandSettings) -> AppResult<()> {
    settings.validate()?;
    execute_query(
        conn,
        queries::brand::UPSERT,
        &[
            &owner_id,
            &settings.studio_name,
            &settings.wm_enabled,
            &settings.wm_use_logo,
            &settings.wm_logo_key,
            &settings.wm_text,
            &(settings.wm_opacity as f64),
            &settings.wm_position.code(),
            &(settings.wm_scale as f64),
            &settings.wm_apply_previews,
            &settings.wm_apply_thumbs,
            &settings.wm_apply_downloads,
        ],
    )?;
    Ok(())
}

/// Settings plus decoded logo, read once so a render never sees a half-updated brand.
pub async fn load_snapshot(
    pool: &DbPool,
    storage: &dyn Storage,
    owner_id: i64,
) -> AppResult<Arc<WatermarkSnapshot>> {
    let settings = {
        let conn = pool.get()?;
        get_settings(&conn, owner_id)?
    };

    if !settings.wm_enabled {
        return Ok(Arc::new(WatermarkSnapshot::new(settings, None)));
    }

    let logo = match settings.wm_logo_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) if settings.wm_use_logo => match storage.read_bytes(key).await {
            Ok(bytes) => WatermarkSnapshot::decode_logo(&bytes),
            Err(e) => {
                warn!("Watermark logo {} unavailable for owner {}: {}", key, owner_id, e);
                None
            }
        },
        _ => None,
    };

    Ok(Arc::new(WatermarkSnapshot::new(settings, logo)))
}

/// Saves new settings and, when anything affecting rendering changed, drops every
/// derivative of the owner's galleries so they are regenerated with the new mark.
pub async fn update_settings(
    pool: &DbPool,
    storage: &dyn Storage,
    owner_id: i64,
    settings: BrandSettings,
) -> AppResult<BrandSettings> {
    settings.validate()?;

    let (changed, gallery_ids) = {
        let conn = pool.get()?;
        let previous = get_settings(&conn, owner_id)?;
        save_settings(&conn, owner_id, &settings)?;
        let changed = previous != settings;
        let gallery_ids: Vec<i64> = if changed {
            execute_query(&conn, queries::photos::CLEAR_DERIVATIVE_KEYS_FOR_OWNER, &[&owner_id])?;
            fetch_all(&conn, queries::photos::SELECT_GALLERY_IDS_FOR_OWNER, &[&owner_id], |r| r.get(0))?
        } else {
            Vec::new()
        };
        (changed, gallery_ids)
    };

    if changed {
        for gallery_id in &gallery_ids {
            purge_gallery_derivatives(storage, *gallery_id).await;
        }
        info!(
            "Brand settings changed for owner {}, purged {} galleries",
            owner_id,
            gallery_ids.len()
        );
    } else {
        debug!("Brand settings for owner {} saved without rendering changes", owner_id);
    }

    Ok(settings)
}

/// Stores a new logo and points the owner's settings at it.
pub async fn upload_logo(
    pool: &DbPool,
    storage: &dyn Storage,
    owner_id: i64,
    filename: &str,
    reader: BoxedReader,
) -> AppResult<BrandSettings> {
    let extension = image_extension(filename)
        .ok_or_else(|| AppError::Validation(format!("Unsupported logo type: {}", filename)))?;
    let key = format!("brand/{}/logo-{}.{}", owner_id, uuid::Uuid::new_v4().simple(), extension);
    storage.save(reader, &key).await?;

    let bytes = storage.read_bytes(&key).await?;
    if WatermarkSnapshot::decode_logo(&bytes).is_none() {
        storage.delete(&key).await;
        return Err(AppError::UnprocessableAsset("Logo could not be decoded".to_string()));
    }

    let current = {
        let conn = pool.get()?;
        get_settings(&conn, owner_id)?
    };
    let previous_key = current.wm_logo_key.clone();
    let updated = update_settings(
        pool,
        storage,
        owner_id,
        BrandSettings {
            wm_logo_key: Some(key),
            ..current
        },
    )
    .await?;

    if let Some(old) = previous_key.filter(|k| !k.is_empty()) {
        storage.delete(&old).await;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Variant, WatermarkPosition};
    use crate::storage::keys::photo_variant_key;
    use crate::test_utils::{
        create_test_db, create_test_gallery, create_test_photo, create_test_user, png_bytes,
        test_storage,
    };
    use std::io::Cursor;

    #[test]
    fn test_missing_record_yields_defaults() {
        let pool = create_test_db();
        let conn = pool.get().unwrap();
        assert_eq!(get_settings(&conn, 42).unwrap(), BrandSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let pool = create_test_db();
        let owner = create_test_user(&pool, "brand", "owner");
        let conn = pool.get().unwrap();
        let settings = BrandSettings {
            studio_name: "North Light".to_string(),
            wm_enabled: true,
            wm_opacity: 0.5,
            wm_position: WatermarkPosition::TopLeft,
            wm_scale: 0.1,
            wm_apply_thumbs: true,
            ..BrandSettings::default()
        };
        save_settings(&conn, owner, &settings).unwrap();
        assert_eq!(get_settings(&conn, owner).unwrap(), settings);

        let invalid = BrandSettings {
            wm_opacity: 1.5,
            ..settings
        };
        assert!(matches!(save_settings(&conn, owner, &invalid), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_snapshot_tolerates_missing_logo() {
        let pool = create_test_db();
        let (_dir, storage) = test_storage();
        let owner = create_test_user(&pool, "snap", "owner");
        {
            let conn = pool.get().unwrap();
            let settings = BrandSettings {
                wm_enabled: true,
                wm_logo_key: Some("brand/missing.png".to_string()),
                ..BrandSettings::default()
            };
            save_settings(&conn, owner, &settings).unwrap();
        }

        let snapshot = load_snapshot(&pool, storage.as_ref(), owner).await.unwrap();
        assert!(snapshot.settings.wm_enabled);
        assert!(snapshot.logo.is_none());
    }

    #[tokio::test]
    async fn test_update_purges_existing_derivatives() {
        let pool = create_test_db();
        let (_dir, storage) = test_storage();
        let owner = create_test_user(&pool, "purge", "owner");
        let gallery_id = create_test_gallery(&pool, owner, false, None);
        let photo = create_test_photo(&pool, gallery_id, "p.jpg", 0);
        let thumb = photo_variant_key(&photo, Variant::Thumb);
        storage.write_bytes(&photo.original_key, vec![1], "image/jpeg").await.unwrap();
        storage.write_bytes(&thumb, vec![1], "image/jpeg").await.unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute("UPDATE photos SET thumb_key = ? WHERE id = ?", rusqlite::params![thumb, photo.id])
                .unwrap();
        }

        // saving identical settings leaves the cache alone
        update_settings(&pool, storage.as_ref(), owner, BrandSettings::default()).await.unwrap();
        assert!(storage.exists(&thumb).await.unwrap());

        let enabled = BrandSettings {
            wm_enabled: true,
            ..BrandSettings::default()
        };
        update_settings(&pool, storage.as_ref(), owner, enabled).await.unwrap();
        assert!(!storage.exists(&thumb).await.unwrap());
        assert!(storage.exists(&photo.original_key).await.unwrap());

        let conn = pool.get().unwrap();
        let key: Option<String> = conn
            .query_row("SELECT thumb_key FROM photos WHERE id = ?", [photo.id], |r| r.get(0))
            .unwrap();
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_upload_logo_sets_key_and_loads() {
        let pool = create_test_db();
        let (_dir, storage) = test_storage();
        let owner = create_test_user(&pool, "logo", "owner");
        {
            let conn = pool.get().unwrap();
            save_settings(&conn, owner, &BrandSettings { wm_enabled: true, ..BrandSettings::default() }).unwrap();
        }

        let updated = upload_logo(&pool, storage.as_ref(), owner, "mark.png", Box::pin(Cursor::new(png_bytes(30, 10))))
            .await
            .unwrap();
        let key = updated.wm_logo_key.clone().unwrap();
        assert!(key.starts_with(&format!("brand/{}/logo-", owner)));

        let snapshot = load_snapshot(&pool, storage.as_ref(), owner).await.unwrap();
        assert_eq!(snapshot.logo.as_ref().map(|l| l.dimensions()), Some((30, 10)));

        let err = upload_logo(&pool, storage.as_ref(), owner, "bad.png", Box::pin(Cursor::new(b"nope".to_vec())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnprocessableAsset(_)));
    }
}
