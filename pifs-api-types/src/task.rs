use serde::{Deserialize, Serialize};

pub type TaskId = String;

/// Durable status of a background task (spec §3, §4.7).
///
/// A reader must never observe a `Pending` task whose underlying queue job
/// has actually failed; `pifs::server::task` reconciles that discrepancy
/// before returning a `Task` to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Error,
}

/// A machine-readable entry in `Task.errors` (spec §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

/// The durable view of a background job (spec §3, §4.7). Written before
/// enqueue, mutated by the worker at terminal transitions, deleted by the
/// reader on the first non-pending GET (spec §4.7 poll semantics).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub errors: Vec<TaskError>,
    pub created_at: i64,
}

impl Task {
    pub fn new(id: TaskId, project_id: impl Into<String>) -> Self {
        Task {
            id,
            project_id: project_id.into(),
            status: TaskStatus::Pending,
            message: "processing".to_string(),
            errors: Vec::new(),
            created_at: proxmox_time::epoch_i64(),
        }
    }
}
