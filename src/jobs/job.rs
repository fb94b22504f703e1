// src/jobs/job.rs
//
// Batch job record and its lifecycle:
//
//   Pending -> Processing -> Completed | Failed
//
// Terminal jobs never change again. Progress only moves forward and
// reaches 100 exactly when the job completes.

use crate::types::Label;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub total_frames: u64,
    pub processed_frames: u64,
    pub total_detections: u64,
    pub label_counts: BTreeMap<Label, u64>,
}

impl Default for JobSummary {
    fn default() -> Self {
        Self {
            total_frames: 0,
            processed_frames: 0,
            total_detections: 0,
            label_counts: Label::zeroed_counts(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    pub input_ref: PathBuf,
    pub output_ref: Option<PathBuf>,
    pub error: Option<String>,
    pub summary: Option<JobSummary>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: String, input_ref: PathBuf) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            input_ref,
            output_ref: None,
            error: None,
            summary: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Pending -> Processing. False if the job was already started.
    pub fn start(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            warn!("Job {} cannot start from {:?}", self.id, self.status);
            return false;
        }
        self.status = JobStatus::Processing;
        true
    }

    /// Ignored unless Processing. Capped at 99; never goes backwards.
    pub fn update_progress(&mut self, percent: u32) {
        if self.status != JobStatus::Processing {
            return;
        }
        let percent = percent.min(99) as u8;
        if percent > self.progress {
            self.progress = percent;
        }
    }

    pub fn complete(&mut self, output_ref: PathBuf, summary: JobSummary) -> bool {
        if self.status != JobStatus::Processing {
            warn!("Job {} cannot complete from {:?}", self.id, self.status);
            return false;
        }
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.output_ref = Some(output_ref);
        self.summary = Some(summary);
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, error: String) -> bool {
        if self.status.is_terminal() {
            warn!("Job {} already {:?}, dropping error: {}", self.id, self.status, error);
            return false;
        }
        self.status = JobStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("j1".to_string(), PathBuf::from("in.mp4"))
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let mut job = job();
        job.update_progress(10);
        assert_eq!(job.progress, 0, "pending jobs report no progress");

        assert!(job.start());
        let mut seen = Vec::new();
        for p in [5, 20, 15, 60, 100, 250] {
            job.update_progress(p);
            seen.push(job.progress);
        }
        assert_eq!(seen, vec![5, 20, 20, 60, 99, 99]);

        assert!(job.complete(PathBuf::from("out.mp4"), JobSummary::default()));
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_jobs_are_immutable() {
        let mut job = job();
        job.start();
        assert!(job.fail("Video processing error: boom".to_string()));

        assert!(!job.complete(PathBuf::from("out.mp4"), JobSummary::default()));
        assert!(!job.fail("again".to_string()));
        assert!(!job.start());
        job.update_progress(50);

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Video processing error: boom"));
        assert!(job.output_ref.is_none());
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_summary_starts_with_every_label() {
        let s = JobSummary::default();
        assert_eq!(s.label_counts.len(), 3);
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["label_counts"]["MASK_INCORRECT"], 0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
