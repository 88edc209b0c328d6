//! Job parameters, metrics, status and report

use std::fmt;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use batchline_common::config::{EngineConfig, DEFAULT_BATCH_SIZE, DEFAULT_ERROR_THRESHOLD};

use crate::error::JobError;

/// Name given to jobs built without one
pub const DEFAULT_JOB_NAME: &str = "job";

/// Settings fixed at build time and read-only during execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParameters {
    pub name: String,
    pub batch_size: usize,
    /// `u64::MAX` means the job never aborts on record errors
    pub error_threshold: u64,
    pub monitoring: bool,
}

impl JobParameters {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_config(name: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            name: name.into(),
            batch_size: config.batch_size,
            error_threshold: config.error_threshold,
            monitoring: config.monitoring,
        }
    }

    pub fn is_threshold_bounded(&self) -> bool {
        self.error_threshold != DEFAULT_ERROR_THRESHOLD
    }
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            name: DEFAULT_JOB_NAME.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            monitoring: false,
        }
    }
}

/// Record counters of one job (or the sum of several)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub error_count: u64,
    /// Records accepted by the pipeline but never written because the job
    /// aborted
    pub skip_count: u64,
}

impl Metrics {
    /// Every read record ended up written, filtered, errored or skipped
    pub fn is_balanced(&self) -> bool {
        self.read_count == self.write_count + self.filter_count + self.error_count + self.skip_count
    }
}

impl AddAssign<&Metrics> for Metrics {
    fn add_assign(&mut self, other: &Metrics) {
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.filter_count += other.filter_count;
        self.error_count += other.error_count;
        self.skip_count += other.skip_count;
    }
}

/// Job lifecycle. Moves forward only; COMPLETED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Starting,
    Started,
    BatchProcessing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JobStatus::Starting => "STARTING",
            JobStatus::Started => "STARTED",
            JobStatus::BatchProcessing => "BATCH_PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Outcome of a job run.
///
/// Owned and mutated by the running job only; callers receive it once the
/// job is over (or clones of it through a [`super::JobMonitor`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub(crate) execution_id: Uuid,
    pub(crate) parameters: JobParameters,
    pub(crate) metrics: Metrics,
    pub(crate) status: JobStatus,
    pub(crate) start_time: DateTime<Utc>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<JobError>,
}

impl JobReport {
    pub(crate) fn new(execution_id: Uuid, parameters: JobParameters) -> Self {
        Self {
            execution_id,
            parameters,
            metrics: Metrics::default(),
            status: JobStatus::Starting,
            start_time: Utc::now(),
            end_time: None,
            last_error: None,
        }
    }

    /// Report for a job that never got to run
    pub(crate) fn aborted(parameters: JobParameters, error: JobError) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4(),
            parameters,
            metrics: Metrics::default(),
            status: JobStatus::Failed,
            start_time: now,
            end_time: Some(now),
            last_error: Some(error),
        }
    }

    /// Combine several reports into one.
    ///
    /// Metrics are summed, the time span covers all reports, the status is
    /// FAILED if any report failed (COMPLETED otherwise) and the first
    /// recorded error is kept.
    pub fn merge<'a>(name: impl Into<String>, reports: impl IntoIterator<Item = &'a JobReport>) -> Self {
        let mut merged = JobReport::new(Uuid::new_v4(), JobParameters::new(name));
        merged.status = JobStatus::Completed;

        let mut first = true;
        let mut end_time: Option<DateTime<Utc>> = None;
        for report in reports {
            if first {
                merged.parameters.batch_size = report.parameters.batch_size;
                merged.parameters.error_threshold = report.parameters.error_threshold;
                merged.parameters.monitoring = report.parameters.monitoring;
                merged.start_time = report.start_time;
                first = false;
            }
            merged.metrics += &report.metrics;
            merged.start_time = merged.start_time.min(report.start_time);
            end_time = end_time.max(report.end_time);
            if report.status == JobStatus::Failed {
                merged.status = JobStatus::Failed;
            }
            if merged.last_error.is_none() {
                merged.last_error = report.last_error.clone();
            }
        }
        merged.end_time = end_time.or(Some(merged.start_time));
        merged
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn name(&self) -> &str {
        &self.parameters.name
    }

    pub fn parameters(&self) -> &JobParameters {
        &self.parameters
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn last_error(&self) -> Option<&JobError> {
        self.last_error.as_ref()
    }

    /// Wall-clock duration, once the job has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    pub fn to_json(&self) -> batchline_common::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let threshold = if self.parameters.is_threshold_bounded() {
            self.parameters.error_threshold.to_string()
        } else {
            "N/A".to_string()
        };

        writeln!(f, "Job Report:")?;
        writeln!(f, "===========")?;
        writeln!(f, "Name: {}", self.parameters.name)?;
        writeln!(f, "Execution Id: {}", self.execution_id)?;
        writeln!(f, "Status: {}", self.status)?;
        writeln!(f, "Parameters:")?;
        writeln!(f, "\tBatch size = {}", self.parameters.batch_size)?;
        writeln!(f, "\tError threshold = {}", threshold)?;
        writeln!(f, "\tMonitoring = {}", self.parameters.monitoring)?;
        writeln!(f, "Metrics:")?;
        writeln!(f, "\tStart time = {}", self.start_time.to_rfc3339())?;
        match self.end_time {
            Some(end) => writeln!(f, "\tEnd time = {}", end.to_rfc3339())?,
            None => writeln!(f, "\tEnd time = N/A")?,
        }
        match self.duration() {
            Some(duration) => writeln!(f, "\tDuration = {}ms", duration.num_milliseconds())?,
            None => writeln!(f, "\tDuration = N/A")?,
        }
        writeln!(f, "\tRead count = {}", self.metrics.read_count)?;
        writeln!(f, "\tWrite count = {}", self.metrics.write_count)?;
        writeln!(f, "\tFilter count = {}", self.metrics.filter_count)?;
        writeln!(f, "\tError count = {}", self.metrics.error_count)?;
        writeln!(f, "\tSkip count = {}", self.metrics.skip_count)?;
        match &self.last_error {
            Some(error) => write!(f, "Last error: {}", error),
            None => write!(f, "Last error: N/A"),
        }
    }
}
