use std::sync::Mutex;

use async_trait::async_trait;

use super::record::{JobCompletion, JobId};

/// Result code reported with every completion. The job infrastructure
/// keys retries off the status, not the code.
pub const RESULT_CODE_NONE: i32 = 0;

/// Receives the terminal status of a dispatched job.
///
/// Implementations may block or suspend; the dispatcher awaits the call and
/// makes it exactly once per dispatch.
#[async_trait]
pub trait JobCompleter: Send + Sync {
    async fn complete(&self, completion: JobCompletion);
}

/// A completer that keeps every completion in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CompletionLog {
    entries: Mutex<Vec<JobCompletion>>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completions(&self) -> Vec<JobCompletion> {
        self.lock().clone()
    }

    /// All completions recorded for one job id.
    pub fn for_job(&self, job_id: JobId) -> Vec<JobCompletion> {
        self.lock()
            .iter()
            .filter(|c| c.job_id == job_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JobCompletion>> {
        // A poisoned log still holds valid completions.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl JobCompleter for CompletionLog {
    async fn complete(&self, completion: JobCompletion) {
        self.lock().push(completion);
    }
}
