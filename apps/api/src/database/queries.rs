pub mod users {
    pub const SELECT_USER_FOR_TOKEN: &str = r#"
    SELECT id
         , username
         , email
         , role
         , is_active
      FROM users
     WHERE id = ?
    "#;
}

pub mod galleries {
    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , owner_id
         , title
         , description
         , is_public
         , password_hash
         , password_expires_at
         , download_count
         , download_limit
         , download_reset_at
         , favorites_limit
         , created_at
      FROM galleries
     WHERE id = ?
    "#;

    pub const INSERT: &str = r#"
    INSERT INTO galleries (
        owner_id
      , title
      , description
      , is_public
      , download_limit
      , favorites_limit
    ) VALUES (?, ?, ?, ?, ?, ?)
    "#;

    pub const UPDATE_PASSWORD: &str = r#"
    UPDATE galleries
       SET password_hash = ?
         , password_expires_at = ?
         , updated_at = datetime('now')
     WHERE id = ?
    "#;

    pub const UPDATE_FAVORITES_LIMIT: &str = r#"
    UPDATE galleries
       SET favorites_limit = ?
         , updated_at = datetime('now')
     WHERE id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM galleries
     WHERE id = ?
    "#;
}

pub mod quota {
    pub const SELECT_COUNTERS: &str = r#"
    SELECT download_count
         , download_limit
         , download_reset_at
      FROM galleries
     WHERE id = ?
    "#;

    pub const RESET_COUNTER: &str = r#"
    UPDATE galleries
       SET download_count = 0
         , download_reset_at = NULL
     WHERE id = ?
    "#;

    pub const RESERVE: &str = r#"
    UPDATE galleries
       SET download_count = download_count + ?
         , download_reset_at = COALESCE(download_reset_at, ?)
     WHERE id = ?
    "#;
}

pub mod photos {
    pub const SELECT_BY_ID_IN_GALLERY: &str = r#"
    SELECT id
         , gallery_id
         , file_id
         , filename
         , extension
         , original_key
         , preview_key
         , thumb_key
         , width
         , height
         , order_index
         , is_cover
         , created_at
      FROM photos
     WHERE id = ?
       AND gallery_id = ?
    "#;

    pub const SELECT_BY_ID: &str = r#"
    SELECT id
         , gallery_id
         , file_id
         , filename
         , extension
         , original_key
         , preview_key
         , thumb_key
         , width
         , height
         , order_index
         , is_cover
         , created_at
      FROM photos
     WHERE id = ?
    "#;

    pub const SELECT_FOR_GALLERY: &str = r#"
    SELECT id
         , gallery_id
         , file_id
         , filename
         , extension
         , original_key
         , preview_key
         , thumb_key
         , width
         , height
         , order_index
         , is_cover
         , created_at
      FROM photos
     WHERE gallery_id = ?
     ORDER BY order_index ASC, id ASC
    "#;

    pub const NEXT_ORDER_INDEX: &str = r#"
    SELECT COALESCE(MAX(order_index) + 1, 0)
      FROM photos
     WHERE gallery_id = ?
    "#;

    pub const INSERT: &str = r#"
    INSERT INTO photos (
        gallery_id
      , file_id
      , filename
      , extension
      , original_key
      , order_index
    ) VALUES (?, ?, ?, ?, ?, ?)
    "#;

    pub const UPDATE_DERIVATIVES: &str = r#"
    UPDATE photos
       SET thumb_key = COALESCE(?, thumb_key)
         , preview_key = COALESCE(?, preview_key)
         , width = COALESCE(?, width)
         , height = COALESCE(?, height)
     WHERE id = ?
    "#;

    pub const UPDATE_DIMENSIONS_IF_MISSING: &str = r#"
    UPDATE photos
       SET width = ?
         , height = ?
     WHERE id = ?
       AND (width IS NULL OR height IS NULL)
    "#;

    pub const CLEAR_DERIVATIVE_KEYS_FOR_OWNER: &str = r#"
    UPDATE photos
       SET thumb_key = NULL
         , preview_key = NULL
     WHERE gallery_id IN (
           SELECT id
             FROM galleries
            WHERE owner_id = ?
           )
    "#;

    pub const SELECT_GALLERY_IDS_FOR_OWNER: &str = r#"
    SELECT id
      FROM galleries
     WHERE owner_id = ?
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM photos
     WHERE id = ?
    "#;
}

pub mod brand {
    pub const SELECT_FOR_OWNER: &str = r#"
    SELECT studio_name
         , wm_enabled
         , wm_use_logo
         , wm_logo_key
         , wm_text
         , wm_opacity
         , wm_position
         , wm_scale
         , wm_apply_previews
         , wm_apply_thumbs
         , wm_apply_downloads
      FROM brand_settings
     WHERE owner_id = ?
    "#;

    pub const UPSERT: &str = r#"
    INSERT INTO brand_settings (
        owner_id
      , studio_name
      , wm_enabled
      , wm_use_logo
      , wm_logo_key
      , wm_text
      , wm_opacity
      , wm_position
      , wm_scale
      , wm_apply_previews
      , wm_apply_thumbs
      , wm_apply_downloads
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (owner_id) DO UPDATE
       SET studio_name = excluded.studio_name
         , wm_enabled = excluded.wm_enabled
         , wm_use_logo = excluded.wm_use_logo
         , wm_logo_key = excluded.wm_logo_key
         , wm_text = excluded.wm_text
         , wm_opacity = excluded.wm_opacity
         , wm_position = excluded.wm_position
         , wm_scale = excluded.wm_scale
         , wm_apply_previews = excluded.wm_apply_previews
         , wm_apply_thumbs = excluded.wm_apply_thumbs
         , wm_apply_downloads = excluded.wm_apply_downloads
         , updated_at = datetime('now')
    "#;
}

pub mod favorites {
    pub const INSERT: &str = r#"
    INSERT OR IGNORE INTO favorites (
        gallery_id
      , photo_id
      , selector
    ) VALUES (?, ?, ?)
    "#;

    pub const DELETE: &str = r#"
    DELETE FROM favorites
     WHERE gallery_id = ?
       AND photo_id = ?
       AND selector = ?
    "#;

    pub const EXISTS: &str = r#"
    SELECT 1
      FROM favorites
     WHERE gallery_id = ?
       AND photo_id = ?
       AND selector = ?
    "#;

    pub const COUNT_FOR_SELECTOR: &str = r#"
    SELECT COUNT(*)
      FROM favorites
     WHERE gallery_id = ?
       AND selector = ?
    "#;

    pub const SELECT_PHOTO_IDS_FOR_SELECTOR: &str = r#"
    SELECT photo_id
      FROM favorites
     WHERE gallery_id = ?
       AND selector = ?
     ORDER BY created_at ASC, id ASC
    "#;

    pub const SELECT_FOR_EXPORT: &str = r#"
    SELECT f.photo_id
         , p.filename
         , f.selector
         , f.created_at
      FROM favorites AS f
      JOIN photos AS p ON p.id = f.photo_id
     WHERE f.gallery_id = ?
     ORDER BY f.selector ASC, f.created_at ASC, f.id ASC
    "#;
}
