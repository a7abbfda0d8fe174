//! Append-only store of completed tasks.

use tokio::sync::Mutex;

use super::task::Task;

/// Completed tasks in completion order.
///
/// Entries are never mutated or removed once appended. Both operations hold
/// the lock only for the push or the copy.
#[derive(Debug, Default)]
pub struct ResultStore {
    tasks: Mutex<Vec<Task>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed task.
    pub async fn append(&self, task: Task) {
        self.tasks.lock().await.push(task);
    }

    /// Copy of the current contents. The lock is released before returning.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }
}
