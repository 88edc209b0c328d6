//! Fixed-size job pool
//!
//! Jobs are spawned as tokio tasks, but at most `pool_size` of them run at a
//! time: each task holds a semaphore permit for its whole run. Fork/join
//! topologies need a pool of at least `workers + 2` or they can deadlock;
//! the pool does not enforce this.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::report::{JobParameters, JobReport};
use super::Job;
use crate::error::JobError;
use crate::record::Payload;

/// Runs jobs concurrently on a bounded number of slots
#[derive(Debug, Clone)]
pub struct JobExecutor {
    permits: Arc<Semaphore>,
    pool_size: usize,
}

impl JobExecutor {
    /// Pool running at most `pool_size` jobs at once (minimum 1)
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run a job on the pool and wait for its report
    pub async fn execute<P: Payload>(&self, job: Job<P>) -> JobReport {
        self.submit(job).join().await
    }

    /// Start a job on the pool without waiting for it
    pub fn submit<P: Payload>(&self, job: Job<P>) -> JobHandle {
        let parameters = job.parameters().clone();
        let permits = Arc::clone(&self.permits);
        let task_parameters = parameters.clone();

        let task = tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(job = %task_parameters.name, "Job submitted to a shut down executor");
                    return JobReport::aborted(task_parameters, JobError::ExecutorShutdown);
                }
            };
            job.call().await
        });

        JobHandle { parameters, task }
    }

    /// Start several jobs; handles are returned in submission order
    pub fn submit_all<P: Payload>(&self, jobs: impl IntoIterator<Item = Job<P>>) -> Vec<JobHandle> {
        jobs.into_iter().map(|job| self.submit(job)).collect()
    }

    /// Refuse new work. Jobs already running finish normally; jobs still
    /// waiting for a slot end FAILED with [`JobError::ExecutorShutdown`].
    pub fn shutdown(&self) {
        info!(pool_size = self.pool_size, "Shutting down job executor");
        self.permits.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.permits.is_closed()
    }
}

/// Handle of a submitted job
#[derive(Debug)]
pub struct JobHandle {
    parameters: JobParameters,
    task: JoinHandle<JobReport>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.parameters.name
    }

    /// Wait for the job's report. A panicked or cancelled task yields a
    /// FAILED report carrying [`JobError::TaskAborted`].
    pub async fn join(self) -> JobReport {
        match self.task.await {
            Ok(report) => report,
            Err(err) => {
                error!(job = %self.parameters.name, error = %err, "Job task aborted");
                JobReport::aborted(self.parameters, JobError::TaskAborted(err.to_string()))
            }
        }
    }

    /// Cancel the job task. [`JobHandle::join`] then reports it as aborted.
    pub fn abort(&self) {
        self.task.abort();
    }
}
