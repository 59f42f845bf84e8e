//! Concurrent batch processing of multiple sources.
//!
//! [`BatchScheduler`] fans a submitted set of sources out to a bounded pool
//! of workers (a semaphore over spawned tasks) and tracks one [`BatchJob`]
//! per source. Only one batch runs at a time; submissions while a batch is
//! active are rejected rather than queued.
//!
//! Cancellation is cooperative: [`BatchScheduler::cancel`] raises a flag
//! that workers check before starting and between progress milestones.
//! Jobs already inside the indexing pipeline run to completion; jobs that
//! have not started finish as `Cancelled`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::KnowledgeSource;
use crate::progress::ProgressReporter;
use crate::service::RagService;

/// Progress fractions reported while a job is being processed.
const MILESTONES: &[f64] = &[0.1, 0.3, 0.5, 0.7, 0.9];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// One source's journey through a batch run.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: String,
    pub source: KnowledgeSource,
    pub status: JobStatus,
    pub progress: f64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub is_running: bool,
}

type JobMap = Arc<Mutex<HashMap<String, BatchJob>>>;

pub struct BatchScheduler {
    service: Arc<RagService>,
    reporter: Arc<dyn ProgressReporter>,
    max_workers: AtomicUsize,
    jobs: JobMap,
    running: Arc<AtomicBool>,
    should_stop: Arc<AtomicBool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl BatchScheduler {
    pub fn new(
        service: Arc<RagService>,
        max_workers: usize,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            service,
            reporter,
            max_workers: AtomicUsize::new(max_workers.max(1)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            should_stop: Arc::new(AtomicBool::new(false)),
            supervisor: Mutex::new(None),
        }
    }

    /// Start a batch. Returns false without side effects when the set is
    /// empty or another batch is still running.
    pub fn submit(&self, sources: Vec<KnowledgeSource>) -> bool {
        if sources.is_empty() {
            warn!("rejecting empty batch");
            return false;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("rejecting batch: another batch is already running");
            return false;
        }
        self.should_stop.store(false, Ordering::SeqCst);

        let mut job_ids = Vec::with_capacity(sources.len());
        {
            let mut jobs = self.jobs.lock().unwrap();
            for source in sources {
                let job_id = uuid::Uuid::new_v4().to_string();
                jobs.insert(
                    job_id.clone(),
                    BatchJob {
                        id: job_id.clone(),
                        source,
                        status: JobStatus::Pending,
                        progress: 0.0,
                        error_message: None,
                        started_at: None,
                        finished_at: None,
                    },
                );
                job_ids.push(job_id);
            }
        }

        let total = job_ids.len();
        let workers = self.max_workers.load(Ordering::SeqCst);
        info!(total, workers, "batch submitted");
        self.reporter.batch_started(total);

        let service = self.service.clone();
        let reporter = self.reporter.clone();
        let jobs = self.jobs.clone();
        let should_stop = self.should_stop.clone();
        let running = self.running.clone();

        let supervisor = tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(workers));
            let completed = Arc::new(AtomicUsize::new(0));
            let mut handles = Vec::with_capacity(total);

            for job_id in job_ids {
                let semaphore = semaphore.clone();
                let service = service.clone();
                let reporter = reporter.clone();
                let jobs = jobs.clone();
                let should_stop = should_stop.clone();
                let completed = completed.clone();

                handles.push(tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    run_job(
                        service, jobs, reporter, should_stop, completed, total, job_id,
                    )
                    .await;
                }));
            }

            for handle in handles {
                let _ = handle.await;
            }
            running.store(false, Ordering::SeqCst);
            info!("batch finished");
        });
        *self.supervisor.lock().unwrap() = Some(supervisor);
        true
    }

    /// Request cooperative cancellation of the running batch. Returns
    /// false when no batch is active.
    pub fn cancel(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.should_stop.store(true, Ordering::SeqCst);
        info!("batch cancellation requested");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait for the current batch to wind down. Used by shutdown paths and
    /// tests; returns immediately when nothing is running.
    pub async fn wait(&self) {
        let handle = self.supervisor.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn job(&self, job_id: &str) -> Option<BatchJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    pub fn jobs(&self) -> Vec<BatchJob> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }

    /// Drop finished jobs from the map, returning how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status.is_terminal());
        before - jobs.len()
    }

    /// Takes effect on the next submitted batch.
    pub fn set_max_workers(&self, workers: usize) {
        self.max_workers.store(workers.max(1), Ordering::SeqCst);
    }

    pub fn statistics(&self) -> BatchStatistics {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = BatchStatistics {
            total: jobs.len(),
            is_running: self.is_running(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

fn with_job(jobs: &JobMap, job_id: &str, apply: impl FnOnce(&mut BatchJob)) {
    if let Some(job) = jobs.lock().unwrap().get_mut(job_id) {
        apply(job);
    }
}

async fn run_job(
    service: Arc<RagService>,
    jobs: JobMap,
    reporter: Arc<dyn ProgressReporter>,
    should_stop: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    total: usize,
    job_id: String,
) {
    let cancel = |reason: &str| {
        with_job(&jobs, &job_id, |job| {
            job.status = JobStatus::Cancelled;
            job.finished_at = Some(Utc::now());
        });
        info!(job_id = %job_id, reason, "job cancelled");
    };

    if should_stop.load(Ordering::SeqCst) {
        cancel("before start");
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        reporter.batch_progress(done, total);
        return;
    }

    with_job(&jobs, &job_id, |job| {
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
    });
    reporter.job_started(&job_id);

    let Some(mut source) = jobs
        .lock()
        .unwrap()
        .get(&job_id)
        .map(|job| job.source.clone())
    else {
        return;
    };

    for &milestone in MILESTONES {
        if should_stop.load(Ordering::SeqCst) {
            cancel("mid-flight");
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            reporter.batch_progress(done, total);
            return;
        }
        with_job(&jobs, &job_id, |job| job.progress = milestone);
        reporter.job_progress(&job_id, milestone);
    }

    let ok = service.process(&mut source).await;
    let error_message = if ok { None } else { source.error_message.clone() };

    with_job(&jobs, &job_id, |job| {
        job.status = if ok {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        job.progress = 1.0;
        job.error_message = error_message;
        job.finished_at = Some(Utc::now());
        job.source = source;
    });
    reporter.job_progress(&job_id, 1.0);
    reporter.job_finished(&job_id, ok);

    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
    reporter.batch_progress(done, total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::embedding::DisabledProvider;
    use crate::gateway::VectorGateway;
    use crate::progress::NoProgress;
    use crate::store::memory::InMemoryStore;

    fn scheduler() -> BatchScheduler {
        let gateway = VectorGateway::new(Arc::new(DisabledProvider), Arc::new(InMemoryStore::new()), 100);
        let service =
            Arc::new(RagService::new(EngineConfig::default(), gateway, None).unwrap());
        BatchScheduler::new(service, 2, Arc::new(NoProgress))
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let scheduler = scheduler();
        assert!(!scheduler.submit(Vec::new()));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.statistics().total, 0);
    }

    #[tokio::test]
    async fn test_cancel_without_batch_is_noop() {
        let scheduler = scheduler();
        assert!(!scheduler.cancel());
        scheduler.wait().await;
    }

    #[tokio::test]
    async fn test_clear_finished_on_empty_map() {
        let scheduler = scheduler();
        assert_eq!(scheduler.clear_finished(), 0);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
