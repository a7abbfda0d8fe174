//! Task type and the processing transform.

use serde::{Deserialize, Serialize};

use super::WorkerId;

/// Prefix the processing step adds to a task's input.
const RESULT_PREFIX: &str = "Processed: ";

/// A unit of work submitted by a caller.
///
/// `id` is caller-supplied and used for routing; it is not required to be
/// globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub input: String,
    /// Empty until processed.
    #[serde(default)]
    pub result: String,
    /// Worker that processed the task. Set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
}

impl Task {
    /// Create an unprocessed task.
    pub fn new(id: i64, input: impl Into<String>) -> Self {
        Self {
            id,
            input: input.into(),
            result: String::new(),
            worker_id: None,
        }
    }

    /// Run the processing step and stamp the processing worker.
    pub fn complete(mut self, worker_id: WorkerId) -> Self {
        self.result = process(&self.input);
        self.worker_id = Some(worker_id);
        self
    }
}

/// The processing step. Deterministic and side-effect free.
pub fn process(input: &str) -> String {
    format!("{RESULT_PREFIX}{input}")
}
