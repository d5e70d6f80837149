//! # Leseecke backend library
//!
//! Backend of Leseecke, a self-hosted comic and novel reader. Libraries are
//! sets of directories on disk; scanning one imports its series and volumes
//! into SQLite so they can be browsed and read over HTTP.
//!
//! All scans go through the [`queue`]: user-triggered and periodic requests
//! are deduplicated per library, ordered by priority, and executed one at a
//! time by a single background worker.
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration
//! - [`db`]: schema initialization
//! - [`error`]: HTTP error type and request validation
//! - [`library`]: library and content persistence
//! - [`metrics`]: queue and scan counters
//! - [`middleware`]: client IP, rate limiting, security headers
//! - [`queue`]: the scan queue and its worker
//! - [`routes`]: HTTP handlers and [`routes::api_router`]
//! - [`scanner`]: the scanner seam and the filesystem scanner
//! - [`scheduler`]: periodic rescans
//! - [`state`]: shared application state
//! - [`types`]: HTTP request and response types

pub mod config;
pub mod db;
pub mod error;
pub mod library;
pub mod metrics;
pub mod middleware;
pub mod queue;
pub mod routes;
pub mod scanner;
pub mod scheduler;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;
