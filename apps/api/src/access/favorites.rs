use crate::auth::CurrentUser;
use crate::database::{execute_query, fetch_all, fetch_one, queries, with_immediate_transaction, DbPool};
use crate::error::{AppError, AppResult};
use crate::models::{FavoriteExportRow, FavoriteToggleResponse, FavoritesResponse, Gallery, Photo};
use crate::utils::hash::short_digest;
use rusqlite::Connection;
use tracing::info;

/// Identity favorites are recorded under.
pub fn selector_for(user: Option<&CurrentUser>, access_cookie: Option<&str>) -> String {
    match (user, access_cookie.filter(|c| !c.is_empty())) {
        (Some(user), _) => format!("user:{}", user.id),
        (None, Some(cookie)) => format!("cookie:{}", short_digest(cookie, 16)),
        (None, None) => "cookie:anon".to_string(),
    }
}

pub fn effective_limit(gallery: &Gallery, default_limit: i64) -> i64 {
    if gallery.favorites_limit > 0 {
        gallery.favorites_limit
    } else {
        default_limit
    }
}

fn count_for(conn: &Connection, gallery_id: i64, selector: &str) -> AppResult<i64> {
    Ok(
        fetch_one(conn, queries::favorites::COUNT_FOR_SELECTOR, &[&gallery_id, &selector], |r| r.get(0))?
            .unwrap_or(0),
    )
}

pub fn add_favorite(
    pool: &DbPool,
    gallery: &Gallery,
    photo_id: i64,
    selector: &str,
    default_limit: i64,
) -> AppResult<FavoriteToggleResponse> {
    let limit = effective_limit(gallery, default_limit);
    let mut conn = pool.get()?;

    with_immediate_transaction(&mut conn, |tx| {
        fetch_one(
            tx,
            queries::photos::SELECT_BY_ID_IN_GALLERY,
            &[&photo_id, &gallery.id],
            Photo::from_row,
        )?
        .ok_or_else(|| AppError::NotFound(format!("Photo {} not found", photo_id)))?;

        let already: Option<i64> =
            fetch_one(tx, queries::favorites::EXISTS, &[&gallery.id, &photo_id, &selector], |r| r.get(0))?;
        let count = count_for(tx, gallery.id, selector)?;

        if already.is_none() {
            if count >= limit {
                return Err(AppError::Conflict(format!(
                    "Favorites limit of {} reached",
                    limit
                )));
            }
            execute_query(tx, queries::favorites::INSERT, &[&gallery.id, &photo_id, &selector])?;
        }

        Ok(FavoriteToggleResponse {
            photo_id,
            favorited: true,
            count: if already.is_none() { count + 1 } else { count },
        })
    })
}

pub fn remove_favorite(
    pool: &DbPool,
    gallery_id: i64,
    photo_id: i64,
    selector: &str,
) -> AppResult<FavoriteToggleResponse> {
    let conn = pool.get()?;
    execute_query(&conn, queries::favorites::DELETE, &[&gallery_id, &photo_id, &selector])?;
    Ok(FavoriteToggleResponse {
        photo_id,
        favorited: false,
        count: count_for(&conn, gallery_id, selector)?,
    })
}

pub fn list_favorites(
    pool: &DbPool,
    gallery: &Gallery,
    selector: &str,
    default_limit: i64,
) -> AppResult<FavoritesResponse> {
    let conn = pool.get()?;
    let photo_ids = fetch_all(
        &conn,
        queries::favorites::SELECT_PHOTO_IDS_FOR_SELECTOR,
        &[&gallery.id, &selector],
        |r| r.get(0),
    )?;
    Ok(FavoritesResponse {
        photo_ids,
        limit: effective_limit(gallery, default_limit),
    })
}

/// `0` restores the configured default.
pub fn set_favorites_limit(pool: &DbPool, gallery_id: i64, limit: i64) -> AppResult<()> {
    if limit < 0 {
        return Err(AppError::Validation("Favorites limit cannot be negative".to_string()));
    }
    let conn = pool.get()?;
    execute_query(&conn, queries::galleries::UPDATE_FAVORITES_LIMIT, &[&limit, &gallery_id])?;
    info!("Favorites limit for gallery {} set to {}", gallery_id, limit);
    Ok(())
}

pub fn export_rows(pool: &DbPool, gallery_id: i64) -> AppResult<Vec<FavoriteExportRow>> {
    let conn = pool.get()?;
    fetch_all(&conn, queries::favorites::SELECT_FOR_EXPORT, &[&gallery_id], |r| {
        Ok(FavoriteExportRow {
            photo_id: r.get(0)?,
            filename: r.get(1)?,
            selector: r.get(2)?,
            created_at: r.get(3)?,
        })
    })
}

pub fn export_csv(rows: &[FavoriteExportRow]) -> String {
    let mut out = String::from("photo_id,filename,selector,created_at\n");
    for row in rows {
        out.push_str(&format!(
            "{},{},{},{}\n",
            row.photo_id,
            csv_field(&row.filename),
            csv_field(&row.selector),
            csv_field(&row.created_at)
        ));
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
