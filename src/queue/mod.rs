//! The library scan queue.
//!
//! Scan requests from HTTP handlers and the periodic scheduler are funnelled
//! through [`ScanQueue`]. It keeps at most one active task per library,
//! orders pending work by priority then submission time, and hands tasks to
//! a single background worker that drives the [`LibraryScanner`].
//!
//! ```text
//! submit ──► QueueState { tasks, library_index, pending } ──► Worker ──► LibraryScanner
//!                ▲                       │ claim/finish
//!         get / list / cancel ◄──────────┘
//! ```
//!
//! [`LibraryScanner`]: crate::scanner::LibraryScanner

mod pending;
mod service;
mod store;
mod types;
mod worker;

pub use service::ScanQueue;
pub use types::{
    LibraryId, QueueError, ScanProgress, ScanTask, Submission, TaskEvent, TaskId, TaskPriority, TaskStatus,
};

#[cfg(test)]
pub(crate) use store::{Cancellation, QueueState};
#[cfg(test)]
pub(crate) use types::TaskOutcome;
