use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type JobId = u64;

/// Lifecycle status of a job as seen by the job infrastructure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::InProgress => write!(f, "IN_PROGRESS"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// A persisted unit of deferred work, owned by the job infrastructure.
///
/// `cmd` is the work-type discriminator used to pick a decoder for
/// `cmd_info`; `related` links the job to the job that spawned it and is
/// only used for tracing the chain in logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub cmd: String,
    pub cmd_info: String,
    #[serde(default)]
    pub related: Option<String>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: JobId, cmd: impl Into<String>, cmd_info: impl Into<String>) -> Self {
        Self {
            id,
            cmd: cmd.into(),
            cmd_info: cmd_info.into(),
            related: None,
            status: JobStatus::InProgress,
            created_at: Utc::now(),
        }
    }

    pub fn with_related(mut self, related: impl Into<String>) -> Self {
        self.related = Some(related.into());
        self
    }

    /// The originating job, or `"-"` when the job has no parent.
    pub fn origin(&self) -> &str {
        self.related.as_deref().unwrap_or("-")
    }
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{} ({})", self.id, self.cmd)
    }
}

/// What a handler reports back after processing a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub message: String,
}

impl JobOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Succeeded,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            message: message.into(),
        }
    }
}

/// The single terminal signal sent back to the job infrastructure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub job_id: JobId,
    pub status: JobStatus,
    pub result_code: i32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let job = JobRecord::new(7, "VmWorkStart", "{}");
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.related.is_none());
        assert_eq!(job.origin(), "-");
        assert_eq!(job.to_string(), "job-7 (VmWorkStart)");
    }

    #[test]
    fn related_job_is_reported_as_origin() {
        let job = JobRecord::new(8, "VmWorkStop", "{}").with_related("42");
        assert_eq!(job.origin(), "42");
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{"id": 3, "cmd": "VmWorkReboot", "cmd_info": "{}"}"#;
        let job: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, 3);
        assert_eq!(job.status, JobStatus::InProgress);
        assert!(job.related.is_none());
    }

    #[test]
    fn status_terminality_and_display() {
        assert!(!JobStatus::InProgress.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert_eq!(JobStatus::Failed.to_string(), "FAILED");
        assert_eq!(
            serde_json::to_string(&JobStatus::InProgress).unwrap(),
            r#""IN_PROGRESS""#
        );
    }
}
