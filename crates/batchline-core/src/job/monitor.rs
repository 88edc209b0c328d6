//! Pull-based job monitoring
//!
//! A monitored job publishes a clone of its report on a `watch` channel at
//! start, after every batch and at the end. Observers poll
//! [`JobMonitor::snapshot`] or await [`JobMonitor::changed`].

use tokio::sync::watch;

use super::report::JobReport;

/// Observer handle of a running job
#[derive(Debug, Clone)]
pub struct JobMonitor {
    receiver: watch::Receiver<JobReport>,
}

impl JobMonitor {
    /// Latest published report
    pub fn snapshot(&self) -> JobReport {
        self.receiver.borrow().clone()
    }

    /// Wait for the next snapshot. Returns `false` once the job is gone and
    /// nothing new will be published.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until the job reports a terminal status and return that report
    pub async fn wait_for_end(&mut self) -> JobReport {
        loop {
            let report = self.receiver.borrow_and_update().clone();
            if report.status().is_terminal() || self.receiver.changed().await.is_err() {
                return self.receiver.borrow().clone();
            }
        }
    }
}

/// Publishing side owned by the job
#[derive(Debug)]
pub(crate) struct MonitorPublisher {
    sender: watch::Sender<JobReport>,
}

impl MonitorPublisher {
    pub(crate) fn new(initial: JobReport) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    pub(crate) fn subscribe(&self) -> JobMonitor {
        JobMonitor {
            receiver: self.sender.subscribe(),
        }
    }

    pub(crate) fn publish(&self, report: &JobReport) {
        self.sender.send_replace(report.clone());
    }
}
