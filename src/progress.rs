//! Progress reporting for batch runs.
//!
//! The scheduler emits coarse milestones per job plus an aggregate count
//! for the whole batch. Implementations must be cheap and non-blocking;
//! they are called from worker tasks.

use tokio::sync::mpsc;
use tracing::{debug, info};

pub trait ProgressReporter: Send + Sync {
    fn batch_started(&self, _total: usize) {}
    fn job_started(&self, _job_id: &str) {}
    /// `fraction` hits 0.1, 0.3, 0.5, 0.7, 0.9 during processing and 1.0
    /// on completion.
    fn job_progress(&self, _job_id: &str, _fraction: f64) {}
    fn job_finished(&self, _job_id: &str, _success: bool) {}
    fn batch_progress(&self, _completed: usize, _total: usize) {}
}

/// Discards everything.
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Logs milestones through `tracing`.
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn batch_started(&self, total: usize) {
        info!(total, "batch started");
    }

    fn job_started(&self, job_id: &str) {
        debug!(job_id, "job started");
    }

    fn job_progress(&self, job_id: &str, fraction: f64) {
        debug!(job_id, fraction, "job progress");
    }

    fn job_finished(&self, job_id: &str, success: bool) {
        info!(job_id, success, "job finished");
    }

    fn batch_progress(&self, completed: usize, total: usize) {
        info!(completed, total, "batch progress");
    }
}

/// One reporter callback, as a value. Lets UIs consume progress off a
/// channel instead of implementing the trait.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchStarted { total: usize },
    JobStarted { job_id: String },
    JobProgress { job_id: String, fraction: f64 },
    JobFinished { job_id: String, success: bool },
    BatchProgress { completed: usize, total: usize },
}

/// Forwards events into a bounded channel, dropping events rather than
/// blocking workers when the receiver lags.
pub struct ChannelProgress {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }
}

impl ProgressReporter for ChannelProgress {
    fn batch_started(&self, total: usize) {
        self.send(ProgressEvent::BatchStarted { total });
    }

    fn job_started(&self, job_id: &str) {
        self.send(ProgressEvent::JobStarted {
            job_id: job_id.to_string(),
        });
    }

    fn job_progress(&self, job_id: &str, fraction: f64) {
        self.send(ProgressEvent::JobProgress {
            job_id: job_id.to_string(),
            fraction,
        });
    }

    fn job_finished(&self, job_id: &str, success: bool) {
        self.send(ProgressEvent::JobFinished {
            job_id: job_id.to_string(),
            success,
        });
    }

    fn batch_progress(&self, completed: usize, total: usize) {
        self.send(ProgressEvent::BatchProgress { completed, total });
    }
}
