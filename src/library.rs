//! Persistence helpers for libraries and their imported contents.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::queue::LibraryId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub scan_paths: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDto {
    pub id: i64,
    pub library_id: LibraryId,
    pub title: String,
    pub path: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub chapter_count: i64,
    pub added_at: String,
}

fn library_from_row(r: &SqliteRow) -> sqlx::Result<Library> {
    let raw: String = r.get("scan_paths");
    let scan_paths: Vec<String> = serde_json::from_str(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Library { id: r.get("id"), name: r.get("name"), scan_paths, created_at: r.get("created_at") })
}

pub async fn create_library(pool: &SqlitePool, name: &str, scan_paths: &[String]) -> anyhow::Result<Library> {
    let paths_json = serde_json::to_string(scan_paths)?;
    let id = sqlx::query("INSERT INTO libraries (name, scan_paths) VALUES (?1, ?2)")
        .bind(name)
        .bind(paths_json)
        .execute(pool)
        .await?
        .last_insert_rowid();
    get_library(pool, id).await?.ok_or_else(|| anyhow::anyhow!("library {} vanished after insert", id))
}

pub async fn get_library(pool: &SqlitePool, id: LibraryId) -> sqlx::Result<Option<Library>> {
    let row = sqlx::query("SELECT id, name, scan_paths, created_at FROM libraries WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(library_from_row).transpose()
}

pub async fn list_libraries(pool: &SqlitePool) -> sqlx::Result<Vec<Library>> {
    let rows = sqlx::query("SELECT id, name, scan_paths, created_at FROM libraries ORDER BY id")
        .fetch_all(pool)
        .await?;
    rows.iter().map(library_from_row).collect()
}

pub async fn list_library_ids(pool: &SqlitePool) -> sqlx::Result<Vec<LibraryId>> {
    let rows = sqlx::query("SELECT id FROM libraries ORDER BY id").fetch_all(pool).await?;
    Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
}

/// Deletes a library with its contents and chapters. Returns whether it existed.
pub async fn delete_library(pool: &SqlitePool, id: LibraryId) -> sqlx::Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chapters WHERE content_id IN (SELECT id FROM contents WHERE library_id = ?1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM contents WHERE library_id = ?1").bind(id).execute(&mut *tx).await?;
    let deleted = sqlx::query("DELETE FROM libraries WHERE id = ?1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;
    Ok(deleted.rows_affected() > 0)
}

pub async fn list_contents(pool: &SqlitePool, library_id: LibraryId) -> sqlx::Result<Vec<ContentDto>> {
    let rows = sqlx::query(
        r#"SELECT c.id, c.library_id, c.title, c.path, c.author, c.description, c.added_at,
                  (SELECT COUNT(*) FROM chapters ch WHERE ch.content_id = c.id) AS chapter_count
           FROM contents c WHERE c.library_id = ?1 ORDER BY c.title COLLATE NOCASE, c.id"#,
    )
    .bind(library_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| ContentDto {
            id: r.get("id"),
            library_id: r.get("library_id"),
            title: r.get("title"),
            path: r.get("path"),
            author: r.get("author"),
            description: r.get("description"),
            chapter_count: r.get("chapter_count"),
            added_at: r.get("added_at"),
        })
        .collect())
}
