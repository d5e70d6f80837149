//! In-crate test suites.
//!
//! - **queue_tests**: queue state transitions, ordering, dedup, cancel, history window
//! - **service_tests**: the `ScanQueue` handle, events and metrics
//! - **worker_tests**: the background worker against fake scanners
//! - **scanner_tests**: the filesystem scanner against temp directories
//! - **scheduler_tests**: periodic rescans against an in-memory database
//! - **api_tests**: library and scan task endpoints
//! - **health_api_tests**: health, metrics and version endpoints
//! - **config_tests**: configuration defaults and validation
//! - **error_tests**: error mapping and request validation
//!
//! Run one suite with e.g. `cargo test queue_tests`.

pub mod api_tests;
pub mod support;
