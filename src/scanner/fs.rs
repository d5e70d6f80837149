use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{AddedChapter, AddedContent, LibraryScanner, ScanContext, ScanError, ScanSummary};
use crate::config::ScannerConfig;
use crate::library;
use crate::queue::LibraryId;

/// Walks a library's scan paths and reconciles the `contents`/`chapters`
/// tables with what is on disk.
///
/// A directory directly under a scan path is one content whose chapters are
/// the supported files beneath it; a supported file directly under a scan
/// path is a content with a single chapter.
#[derive(Clone)]
pub struct FsLibraryScanner {
    pool: SqlitePool,
    config: ScannerConfig,
}

#[derive(Debug, Clone)]
struct DiscoveredChapter {
    path: String,
    title: String,
}

#[derive(Debug, Clone)]
struct DiscoveredContent {
    path: String,
    title: String,
    author: Option<String>,
    description: Option<String>,
    scrape_failed: bool,
    chapters: Vec<DiscoveredChapter>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentMetadata {
    title: Option<String>,
    author: Option<String>,
    description: Option<String>,
}

struct DiscoverOptions {
    excludes: GlobSet,
    extensions: HashSet<String>,
    follow_symlinks: bool,
    metadata_file: String,
}

impl DiscoverOptions {
    fn from_config(cfg: &ScannerConfig) -> Result<Self, ScanError> {
        Ok(Self {
            excludes: build_globset(&cfg.excludes)?,
            extensions: cfg
                .extensions
                .iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            follow_symlinks: cfg.follow_symlinks,
            metadata_file: cfg.metadata_file.clone(),
        })
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.contains(&e.to_ascii_lowercase()))
    }

    // Matched relative to the scan path so a hidden parent of the library
    // itself never excludes everything.
    fn is_excluded(&self, root: &Path, path: &Path) -> bool {
        if self.excludes.is_empty() {
            return false;
        }
        let rel = path.strip_prefix(root).unwrap_or(path);
        let s = rel.to_string_lossy().replace('\\', "/");
        !s.is_empty() && self.excludes.is_match(&s)
    }
}

impl FsLibraryScanner {
    pub fn new(pool: SqlitePool, config: ScannerConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl LibraryScanner for FsLibraryScanner {
    async fn scan_library(&self, library_id: LibraryId, ctx: ScanContext) -> Result<ScanSummary, ScanError> {
        let library =
            library::get_library(&self.pool, library_id).await?.ok_or(ScanError::LibraryNotFound(library_id))?;
        if library.scan_paths.is_empty() {
            return Err(ScanError::NoScanPaths(library_id));
        }
        let opts = Arc::new(DiscoverOptions::from_config(&self.config)?);

        let total = library.scan_paths.len() as u64;
        ctx.report_progress(0, total);

        let mut discovered: Vec<DiscoveredContent> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for (done, scan_path) in library.scan_paths.iter().enumerate() {
            ctx.checkpoint()?;
            let root = PathBuf::from(scan_path);
            let opts_cl = opts.clone();
            let found = task::spawn_blocking(move || discover(&root, &opts_cl)).await??;
            debug!("Discovered {} content(s) under {}", found.len(), scan_path);
            discovered.extend(found.into_iter().filter(|c| seen.insert(c.path.clone())));
            ctx.report_progress(done as u64 + 1, total);
        }

        ctx.checkpoint()?;
        let summary = self.reconcile(library_id, discovered, &ctx).await?;
        info!(
            "Library {} ({}) scanned: {} added, {} removed, {} new chapter(s), {} failed scrape(s)",
            library.id,
            library.name,
            summary.added_count,
            summary.removed_count,
            summary.added_chapters.len(),
            summary.failed_scrape_count
        );
        Ok(summary)
    }
}

impl FsLibraryScanner {
    /// Applies the discovered state in one transaction; a cancellation
    /// between contents rolls everything back.
    async fn reconcile(
        &self,
        library_id: LibraryId,
        discovered: Vec<DiscoveredContent>,
        ctx: &ScanContext,
    ) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::default();
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT id, path FROM contents WHERE library_id = ?1")
            .bind(library_id)
            .fetch_all(&mut *tx)
            .await?;
        let mut existing: HashMap<String, i64> =
            rows.iter().map(|r| (r.get::<String, _>("path"), r.get::<i64, _>("id"))).collect();
        let on_disk: HashSet<&str> = discovered.iter().map(|c| c.path.as_str()).collect();

        let vanished: Vec<i64> =
            existing.iter().filter(|(p, _)| !on_disk.contains(p.as_str())).map(|(_, id)| *id).collect();
        for content_id in vanished {
            sqlx::query("DELETE FROM chapters WHERE content_id = ?1").bind(content_id).execute(&mut *tx).await?;
            sqlx::query("DELETE FROM contents WHERE id = ?1").bind(content_id).execute(&mut *tx).await?;
            summary.removed_count += 1;
        }
        existing.retain(|p, _| on_disk.contains(p.as_str()));

        for content in &discovered {
            ctx.checkpoint()?;
            match existing.get(&content.path) {
                Some(&content_id) => sync_chapters(&mut *tx, content_id, &content.chapters, &mut summary).await?,
                None => {
                    let content_id = sqlx::query(
                        "INSERT INTO contents (library_id, path, title, author, description) VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .bind(library_id)
                    .bind(&content.path)
                    .bind(&content.title)
                    .bind(content.author.as_deref())
                    .bind(content.description.as_deref())
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                    summary.added_count += 1;
                    if content.scrape_failed {
                        summary.failed_scrape_count += 1;
                    }
                    summary.added_contents.push(AddedContent {
                        id: content_id,
                        title: content.title.clone(),
                        path: content.path.clone(),
                    });
                    sync_chapters(&mut *tx, content_id, &content.chapters, &mut summary).await?;
                }
            }
        }

        ctx.checkpoint()?;
        tx.commit().await?;
        Ok(summary)
    }
}

async fn sync_chapters(
    conn: &mut SqliteConnection,
    content_id: i64,
    chapters: &[DiscoveredChapter],
    summary: &mut ScanSummary,
) -> Result<(), ScanError> {
    let rows = sqlx::query("SELECT path FROM chapters WHERE content_id = ?1")
        .bind(content_id)
        .fetch_all(&mut *conn)
        .await?;
    let known: HashSet<String> = rows.iter().map(|r| r.get::<String, _>("path")).collect();
    let wanted: HashSet<&str> = chapters.iter().map(|c| c.path.as_str()).collect();

    for path in known.iter().filter(|p| !wanted.contains(p.as_str())) {
        sqlx::query("DELETE FROM chapters WHERE content_id = ?1 AND path = ?2")
            .bind(content_id)
            .bind(path)
            .execute(&mut *conn)
            .await?;
    }

    for (idx, chapter) in chapters.iter().enumerate() {
        if known.contains(&chapter.path) {
            sqlx::query("UPDATE chapters SET sort_index = ?1 WHERE content_id = ?2 AND path = ?3")
                .bind(idx as i64)
                .bind(content_id)
                .bind(&chapter.path)
                .execute(&mut *conn)
                .await?;
            continue;
        }
        let id = sqlx::query("INSERT INTO chapters (content_id, path, title, sort_index) VALUES (?1, ?2, ?3, ?4)")
            .bind(content_id)
            .bind(&chapter.path)
            .bind(&chapter.title)
            .bind(idx as i64)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();
        summary.added_chapters.push(AddedChapter {
            id,
            content_id,
            title: chapter.title.clone(),
            path: chapter.path.clone(),
        });
    }
    Ok(())
}

/// Enumerates the contents directly under one scan path. Runs on a blocking thread.
fn discover(root: &Path, opts: &DiscoverOptions) -> Result<Vec<DiscoveredContent>, ScanError> {
    // Only an absent or non-directory root counts as missing; other
    // failures (permissions, bad path) are reported as they are.
    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ScanError::MissingScanPath(root.to_string_lossy().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::MissingScanPath(root.to_string_lossy().to_string()));
        }
        Err(e) => return Err(e.into()),
    }
    let mut found = Vec::new();
    let top = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(opts.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !opts.is_excluded(root, e.path()));
    for entry in top {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_dir() {
            let chapters = collect_chapters(root, path, opts);
            if chapters.is_empty() {
                continue;
            }
            let (metadata, scrape_failed) = scrape_metadata(path, &opts.metadata_file);
            let fallback = file_name_string(path);
            found.push(DiscoveredContent {
                path: path_string(path),
                title: metadata.title.filter(|t| !t.trim().is_empty()).unwrap_or(fallback),
                author: metadata.author,
                description: metadata.description,
                scrape_failed,
                chapters,
            });
        } else if entry.file_type().is_file() && opts.is_supported(path) {
            let title = file_stem_string(path);
            found.push(DiscoveredContent {
                path: path_string(path),
                title: title.clone(),
                author: None,
                description: None,
                scrape_failed: false,
                chapters: vec![DiscoveredChapter { path: path_string(path), title }],
            });
        }
    }
    Ok(found)
}

fn collect_chapters(root: &Path, dir: &Path, opts: &DiscoverOptions) -> Vec<DiscoveredChapter> {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(opts.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !opts.is_excluded(root, e.path()))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && opts.is_supported(e.path()))
        .map(|e| DiscoveredChapter { path: path_string(e.path()), title: file_stem_string(e.path()) })
        .collect()
}

/// Reads the optional metadata sidecar. A present but unreadable file is a
/// failed scrape; a missing one is not.
fn scrape_metadata(dir: &Path, metadata_file: &str) -> (ContentMetadata, bool) {
    let file = dir.join(metadata_file);
    if !file.is_file() {
        return (ContentMetadata::default(), false);
    }
    let parsed = fs::read_to_string(&file)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<ContentMetadata>(&raw).map_err(anyhow::Error::from));
    match parsed {
        Ok(meta) => (meta, false),
        Err(e) => {
            warn!("Failed to scrape metadata from {}: {}", file.display(), e);
            (ContentMetadata::default(), true)
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, globset::Error> {
    let mut b = GlobSetBuilder::new();
    for p in patterns {
        if p.trim().is_empty() {
            continue;
        }
        // Normalize backslashes so patterns match the '/'-normalized relative paths
        let norm = p.trim().replace('\\', "/");
        b.add(Glob::new(&norm)?);
    }
    b.build()
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn file_name_string(path: &Path) -> String {
    path.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| path_string(path))
}

fn file_stem_string(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| file_name_string(path))
}
