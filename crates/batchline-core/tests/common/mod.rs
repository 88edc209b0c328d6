//! Common test utilities for batchline-core integration tests
//!
//! In-memory readers and writers, collaborators that fail on demand, and a
//! listener recording every hook it receives.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{IterableReader, StringWriter};
//!
//! #[tokio::test]
//! async fn test_lines() {
//!     let writer = StringWriter::new();
//!     let job = batchline_core::Job::builder()
//!         .reader(IterableReader::new(["foo", "bar"]))
//!         .writer(writer.clone())
//!         .build()
//!         .unwrap();
//!     job.call().await;
//!     assert_eq!(writer.output(), "foo\nbar\n");
//! }
//! ```

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use batchline_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use batchline_core::{
    Batch, BatchListener, JobError, JobListener, JobParameters, JobReport, Payload,
    PipelineListener, Record, RecordNumbering, RecordReader, RecordWriter, ReaderListener,
    WriterListener,
};

/// Shared, ordered log of strings
#[derive(Debug, Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Names logged for `hook`, in call order (entries are "hook:name")
    pub fn names_for(&self, hook: &str) -> Vec<String> {
        let prefix = format!("{}:", hook);
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }
}

// ============================================================================
// Readers
// ============================================================================

/// Reads payloads from memory, counting `read_record` calls
pub struct IterableReader<P> {
    items: std::vec::IntoIter<P>,
    numbering: RecordNumbering,
    calls: Arc<AtomicUsize>,
    fail_open: bool,
    fail_at: Option<u64>,
}

impl<P> IterableReader<P> {
    pub fn new<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<P>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect::<Vec<_>>().into_iter(),
            numbering: RecordNumbering::new("memory"),
            calls: Arc::new(AtomicUsize::new(0)),
            fail_open: false,
            fail_at: None,
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail instead of producing record number `number`
    pub fn failing_at(mut self, number: u64) -> Self {
        self.fail_at = Some(number);
        self
    }

    /// Counter of `read_record` calls, usable after the job owns the reader
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl<P: Payload> RecordReader<P> for IterableReader<P> {
    async fn open(&mut self) -> Result<()> {
        if self.fail_open {
            bail!("source unavailable")
        }
        Ok(())
    }

    async fn read_record(&mut self) -> Result<Option<Record<P>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_at == Some(self.numbering.count() + 1) {
            bail!("corrupted input")
        }
        Ok(self.items.next().map(|item| self.numbering.stamp(item)))
    }
}

// ============================================================================
// Writers
// ============================================================================

/// Appends every payload followed by a newline to a shared string
#[derive(Debug, Clone, Default)]
pub struct StringWriter {
    output: Arc<Mutex<String>>,
}

impl StringWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordWriter<String> for StringWriter {
    async fn write_records(&mut self, batch: &Batch<String>) -> Result<()> {
        let mut output = self.output.lock().unwrap();
        for record in batch {
            output.push_str(record.payload());
            output.push('\n');
        }
        Ok(())
    }
}

/// Keeps every written batch; can fail on open, on the n-th write or on close
#[derive(Clone)]
pub struct CollectingWriter<P> {
    batches: Arc<Mutex<Vec<Vec<Record<P>>>>>,
    state: Log,
    fail_open: bool,
    fail_on_write: Option<usize>,
    fail_close: bool,
}

impl<P: Payload> CollectingWriter<P> {
    pub fn new() -> Self {
        Self {
            batches: Arc::new(Mutex::new(Vec::new())),
            state: Log::default(),
            fail_open: false,
            fail_on_write: None,
            fail_close: false,
        }
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Fail the `n`-th write call (1-based)
    pub fn failing_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn batches(&self) -> Vec<Vec<Record<P>>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<P> {
        self.batches()
            .into_iter()
            .flatten()
            .map(Record::into_payload)
            .collect()
    }

    /// "open" / "close" calls received, in order
    pub fn lifecycle(&self) -> Vec<String> {
        self.state.entries()
    }
}

#[async_trait]
impl<P: Payload> RecordWriter<P> for CollectingWriter<P> {
    async fn open(&mut self) -> Result<()> {
        self.state.push("open");
        if self.fail_open {
            bail!("sink unavailable")
        }
        Ok(())
    }

    async fn write_records(&mut self, batch: &Batch<P>) -> Result<()> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_on_write == Some(batches.len() + 1) {
            bail!("disk full")
        }
        batches.push(batch.records().to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.state.push("close");
        if self.fail_close {
            bail!("flush failed")
        }
        Ok(())
    }
}

// ============================================================================
// Listeners
// ============================================================================

/// Logs "hook:name" for every hook of every listener family
#[derive(Debug, Clone)]
pub struct RecordingListener {
    name: &'static str,
    log: Log,
}

impl RecordingListener {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}:{}", hook, self.name));
    }
}

impl JobListener for RecordingListener {
    fn before_job_start(&mut self, _parameters: &JobParameters) {
        self.record("before_job_start");
    }

    fn after_job_end(&mut self, _report: &JobReport) {
        self.record("after_job_end");
    }
}

impl<P> BatchListener<P> for RecordingListener {
    fn before_batch_reading(&mut self) {
        self.record("before_batch_reading");
    }

    fn after_batch_processing(&mut self, _batch: &Batch<P>) {
        self.record("after_batch_processing");
    }

    fn after_batch_completed(&mut self, _batch: &Batch<P>) {
        self.record("after_batch_completed");
    }

    fn on_batch_aborted(&mut self, _batch: &Batch<P>, _error: &JobError) {
        self.record("on_batch_aborted");
    }
}

impl<P> ReaderListener<P> for RecordingListener {
    fn before_record_reading(&mut self) {
        self.record("before_record_reading");
    }

    fn after_record_reading(&mut self, record: Option<&Record<P>>) {
        match record {
            Some(_) => self.record("after_record_reading"),
            None => self.record("after_end_of_stream"),
        }
    }

    fn on_record_reading_exception(&mut self, _error: &JobError) {
        self.record("on_record_reading_exception");
    }
}

impl<P> PipelineListener<P> for RecordingListener {
    fn before_record_processing(&mut self, record: Record<P>) -> Record<P> {
        self.record("before_record_processing");
        record
    }

    fn after_record_processing(&mut self, _input: &Record<P>, _output: Option<&Record<P>>) {
        self.record("after_record_processing");
    }

    fn on_record_processing_exception(&mut self, _input: &Record<P>, _error: &JobError) {
        self.record("on_record_processing_exception");
    }
}

impl<P> WriterListener<P> for RecordingListener {
    fn before_batch_writing(&mut self, _batch: &Batch<P>) {
        self.record("before_batch_writing");
    }

    fn after_batch_writing(&mut self, _batch: &Batch<P>) {
        self.record("after_batch_writing");
    }

    fn on_batch_writing_exception(&mut self, _batch: &Batch<P>, _error: &JobError) {
        self.record("on_batch_writing_exception");
    }
}

/// Route engine logs to the test output; safe to call from every test
pub fn init_tracing() {
    let config = LogConfig::builder()
        .output(LogOutput::Test)
        .level(LogLevel::Warn)
        .filter_directives("batchline_core=debug")
        .include_thread_ids(false)
        .build();
    // Only the first call per test binary installs the subscriber
    let _ = init_logging(&config);
}
