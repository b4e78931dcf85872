use crate::database::DbConn;
use crate::error::AppResult;

const SCHEMA: &str = include_str!("../../schema.sql");

pub fn init_database(conn: &DbConn) -> AppResult<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Adds columns introduced after the first release to an existing `photos` table.
pub fn ensure_photo_columns(conn: &DbConn) -> AppResult<()> {
    let existing: std::collections::HashSet<String> = {
        let mut stmt = conn.prepare("PRAGMA table_info(photos)")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        rows.filter_map(|r| r.ok()).collect()
    };

    let columns = [
        ("file_id", "TEXT"),
        ("preview_key", "TEXT"),
        ("thumb_key", "TEXT"),
        ("width", "INTEGER"),
        ("height", "INTEGER"),
        ("is_cover", "INTEGER NOT NULL DEFAULT 0"),
    ];

    for (column_name, column_type) in columns {
        if !existing.contains(column_name) {
            conn.execute(
                &format!("ALTER TABLE photos ADD COLUMN {} {}", column_name, column_type),
                [],
            )?;
        }
    }

    Ok(())
}
