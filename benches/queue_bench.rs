use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use leseecke::config::{QueueConfig, ScannerConfig};
use leseecke::db;
use leseecke::library;
use leseecke::metrics::Metrics;
use leseecke::queue::{ScanQueue, TaskPriority};
use leseecke::scanner::{FsLibraryScanner, LibraryScanner, ScanContext};
use sqlx::sqlite::SqlitePoolOptions;
use std::fs;
use std::hint::black_box;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn new_queue() -> ScanQueue {
    ScanQueue::new(&QueueConfig::default(), Metrics::new())
}

/// `series` folders with `chapters` files each, plus one standalone file.
fn create_library_tree(series: usize, chapters: usize) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    for s in 0..series {
        let dir = temp_dir.path().join(format!("Series {}", s));
        fs::create_dir(&dir).unwrap();
        for c in 0..chapters {
            fs::write(dir.join(format!("chapter_{:03}.cbz", c)), b"x").unwrap();
        }
    }
    fs::write(temp_dir.path().join("oneshot.epub"), b"x").unwrap();
    temp_dir
}

fn benchmark_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit");

    for size in [100i64, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("distinct_libraries", size), size, |b, &size| {
            b.iter(|| {
                let q = new_queue();
                for lib in 0..size {
                    black_box(q.submit_task(lib, TaskPriority::Normal));
                }
            })
        });
    }

    group.bench_function("deduplicated", |b| {
        let q = new_queue();
        for lib in 0..1_000 {
            q.submit_task(lib, TaskPriority::Normal);
        }
        b.iter(|| black_box(q.submit_task(black_box(500), TaskPriority::Normal)))
    });

    group.bench_function("upgrade_1000", |b| {
        b.iter(|| {
            let q = new_queue();
            for lib in 0..1_000 {
                q.submit_task(lib, TaskPriority::Normal);
            }
            for lib in (0..1_000).rev() {
                black_box(q.submit_task(lib, TaskPriority::High));
            }
        })
    });
    group.finish();
}

fn benchmark_listing(c: &mut Criterion) {
    let q = new_queue();
    for lib in 0..5_000 {
        let priority = if lib % 7 == 0 { TaskPriority::High } else { TaskPriority::Normal };
        q.submit_task(lib, priority);
    }
    for lib in 0..500 {
        if let Some(task) = q.get_library_task(lib) {
            let _ = q.cancel_task(task.id);
        }
    }

    c.bench_function("list_pending_4500", |b| b.iter(|| black_box(q.list_pending())));
    c.bench_function("list_history_500", |b| b.iter(|| black_box(q.list_history(500))));
}

fn benchmark_scan_library(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("scan_library");
    group.sample_size(20);

    for (series, chapters) in [(10usize, 10usize), (50, 20)].iter() {
        let tree = create_library_tree(*series, *chapters);
        let path = tree.path().to_string_lossy().to_string();
        let label = format!("{}x{}", series, chapters);

        group.bench_function(BenchmarkId::new("first_scan", &label), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let pool =
                        SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
                    db::init_db(&pool).await.unwrap();
                    let lib = library::create_library(&pool, "Bench", &[path.clone()]).await.unwrap();
                    let scanner = FsLibraryScanner::new(pool, ScannerConfig::default());
                    black_box(scanner.scan_library(lib.id, ScanContext::detached()).await.unwrap())
                })
            })
        });

        // Rescans of an unchanged tree only reconcile.
        let (scanner, lib_id) = rt.block_on(async {
            let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
            db::init_db(&pool).await.unwrap();
            let lib = library::create_library(&pool, "Bench", &[path.clone()]).await.unwrap();
            let scanner = FsLibraryScanner::new(pool, ScannerConfig::default());
            scanner.scan_library(lib.id, ScanContext::detached()).await.unwrap();
            (scanner, lib.id)
        });
        group.bench_function(BenchmarkId::new("rescan_unchanged", &label), |b| {
            b.iter(|| rt.block_on(async { black_box(scanner.scan_library(lib_id, ScanContext::detached()).await.unwrap()) }))
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_submit, benchmark_listing, benchmark_scan_library);
criterion_main!(benches);
