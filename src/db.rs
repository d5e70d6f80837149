use sqlx::SqlitePool;

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Foreign keys are critical - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    // libraries: scan_paths is a JSON array of strings
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS libraries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            scan_paths TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // contents: one series folder or one standalone archive
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS contents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            library_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            title TEXT NOT NULL,
            author TEXT NULL,
            description TEXT NULL,
            added_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            UNIQUE(library_id, path),
            FOREIGN KEY(library_id) REFERENCES libraries(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // chapters: readable archive files belonging to a content
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            title TEXT NOT NULL,
            sort_index INTEGER NOT NULL,
            UNIQUE(content_id, path),
            FOREIGN KEY(content_id) REFERENCES contents(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contents_library ON contents(library_id)").execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chapters_content ON chapters(content_id)").execute(pool).await?;

    Ok(())
}
