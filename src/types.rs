use serde::{Deserialize, Serialize};

use crate::library::Library;
use crate::queue::{LibraryId, ScanTask, TaskId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLibraryRequest {
    pub name: String,
    pub scan_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDto {
    pub id: LibraryId,
    pub name: String,
    pub scan_paths: Vec<String>,
    pub created_at: String,
    /// The library's pending or running scan, if any.
    pub active_task: Option<ScanTask>,
}

impl LibraryDto {
    pub fn new(library: Library, active_task: Option<ScanTask>) -> Self {
        Self {
            id: library.id,
            name: library.name,
            scan_paths: library.scan_paths,
            created_at: library.created_at,
            active_task,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScanResponse {
    pub task_id: TaskId,
    pub task: ScanTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTaskList {
    pub pending: Vec<ScanTask>,
    pub history: Vec<ScanTask>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}
