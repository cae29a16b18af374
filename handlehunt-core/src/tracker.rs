// Per-handle search lifecycle and the single-flight guarantee

use chrono::{DateTime, Utc};
use handlehunt_scanner::SiteDefinition;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Snapshot of one scan for one handle.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTask {
    pub id: Uuid,
    pub handle: String,
    pub state: TaskState,
    pub found_sites: Vec<SiteDefinition>,
    pub total_sites: usize,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl SearchTask {
    fn new(handle: &str, total_sites: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            state: TaskState::Pending,
            found_sites: Vec::new(),
            total_sites,
            error: None,
            started_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Admission {
    Admitted(SearchTask),
    AlreadyRunning(SearchTask),
}

/// Owns every [`SearchTask`] of one engine. Each task sits behind its own
/// mutex so sibling probes of a scan serialize on their handle only.
#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<String, Arc<Mutex<SearchTask>>>>,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, handle: &str) -> Option<Arc<Mutex<SearchTask>>> {
        self.tasks.read().await.get(handle).cloned()
    }

    /// Create a `Pending` task unless one is already pending or in progress.
    /// A terminal task is replaced by a fresh one with a new id.
    pub async fn admit(&self, handle: &str, total_sites: usize) -> Admission {
        let mut tasks = self.tasks.write().await;

        if let Some(existing) = tasks.get(handle) {
            let existing = existing.lock().await;
            if existing.state.is_active() {
                return Admission::AlreadyRunning(existing.clone());
            }
        }

        let task = SearchTask::new(handle, total_sites);
        debug!("Admitted task {} for '{}'", task.id, handle);
        tasks.insert(handle.to_string(), Arc::new(Mutex::new(task.clone())));
        Admission::Admitted(task)
    }

    /// `Pending -> InProgress`. Returns false if the task was not pending.
    pub async fn begin(&self, handle: &str) -> bool {
        let Some(slot) = self.slot(handle).await else {
            return false;
        };
        let mut task = slot.lock().await;
        if task.state != TaskState::Pending {
            return false;
        }
        task.state = TaskState::InProgress;
        true
    }

    /// Append a confirmed site and return the cumulative found list.
    /// `None` when the handle has no task in progress.
    pub async fn record_found(&self, handle: &str, site: SiteDefinition) -> Option<Vec<SiteDefinition>> {
        let slot = self.slot(handle).await?;
        let mut task = slot.lock().await;
        if task.state != TaskState::InProgress {
            return None;
        }
        task.found_sites.push(site);
        Some(task.found_sites.clone())
    }

    /// Terminal transition to `Completed`; a no-op on terminal tasks.
    pub async fn complete(&self, handle: &str) -> Option<SearchTask> {
        self.finish(handle, TaskState::Completed, None).await
    }

    /// Terminal transition to `Failed`; a no-op on terminal tasks.
    pub async fn fail(&self, handle: &str, error: impl Into<String>) -> Option<SearchTask> {
        self.finish(handle, TaskState::Failed, Some(error.into())).await
    }

    async fn finish(&self, handle: &str, state: TaskState, error: Option<String>) -> Option<SearchTask> {
        let slot = self.slot(handle).await?;
        let mut task = slot.lock().await;
        if task.state.is_terminal() {
            return None;
        }
        task.state = state;
        task.error = error;
        debug!("Task {} for '{}' is now {}", task.id, handle, state.as_str());
        Some(task.clone())
    }

    pub async fn get(&self, handle: &str) -> Option<SearchTask> {
        let slot = self.slot(handle).await?;
        let task = slot.lock().await;
        Some(task.clone())
    }

    pub async fn is_active(&self, handle: &str) -> bool {
        match self.slot(handle).await {
            Some(slot) => slot.lock().await.state.is_active(),
            None => false,
        }
    }
}
