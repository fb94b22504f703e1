// src/jobs/mod.rs

pub mod engine;
pub mod job;
pub mod store;

pub use engine::{sampling_stride, JobEngine};
pub use job::{Job, JobStatus, JobSummary};
pub use store::JobStore;
