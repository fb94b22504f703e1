// src/jobs/store.rs
//
// Shared job registry. Each job sits in its own mutex cell so a worker
// can update its job without blocking readers of other jobs. Readers only
// ever see cloned snapshots.

use super::job::Job;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

type JobCell = Arc<Mutex<Job>>;

#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<String, JobCell>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id.clone(), Arc::new(Mutex::new(job)));
    }

    pub fn get(&self, id: &str) -> Option<Job> {
        let cell = self.cell(id)?;
        let job = lock(&cell).clone();
        Some(job)
    }

    /// Every job, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let cells: Vec<JobCell> = {
            let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
            jobs.values().cloned().collect()
        };
        let mut out: Vec<Job> = cells.iter().map(|c| lock(c).clone()).collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    /// Run `f` against the live record. None if the job does not exist.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let cell = self.cell(id)?;
        let mut job = lock(&cell);
        Some(f(&mut job))
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, id: &str) -> Option<JobCell> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(id).cloned()
    }
}

fn lock(cell: &JobCell) -> MutexGuard<'_, Job> {
    cell.lock().unwrap_or_else(|e| e.into_inner())
}
