//! Filtering and skipping stages

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Stage;
use crate::record::Record;

/// Predicate-based filter.
///
/// [`Filter::new`] keeps records matching the predicate (like
/// `Iterator::filter`); [`Filter::reject`] drops them instead.
pub struct Filter<F> {
    predicate: F,
    keep_matching: bool,
}

impl<F> Filter<F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            keep_matching: true,
        }
    }

    pub fn reject(predicate: F) -> Self {
        Self {
            predicate,
            keep_matching: false,
        }
    }
}

impl<P, F> Stage<P> for Filter<F>
where
    F: FnMut(&Record<P>) -> bool + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        let matched = (self.predicate)(&record);
        Ok((matched == self.keep_matching).then_some(record))
    }
}

/// Keeps only records whose payload contains a pattern
#[derive(Debug, Clone)]
pub struct GrepFilter {
    pattern: String,
}

impl GrepFilter {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl<P: AsRef<str>> Stage<P> for GrepFilter {
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        let keep = record.payload().as_ref().contains(self.pattern.as_str());
        Ok(keep.then_some(record))
    }
}

/// Drops records whose payload starts with any of the given prefixes
#[derive(Debug, Clone)]
pub struct PrefixSkipper {
    prefixes: Vec<String>,
}

impl PrefixSkipper {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl<P: AsRef<str>> Stage<P> for PrefixSkipper {
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        let payload = record.payload().as_ref();
        if self.prefixes.iter().any(|prefix| payload.starts_with(prefix.as_str())) {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Drops records by header number, e.g. a header line at number 1
#[derive(Debug, Clone)]
pub struct RecordNumberSkipper {
    numbers: HashSet<u64>,
}

impl RecordNumberSkipper {
    pub fn new(numbers: impl IntoIterator<Item = u64>) -> Self {
        Self {
            numbers: numbers.into_iter().collect(),
        }
    }
}

impl<P> Stage<P> for RecordNumberSkipper {
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        if self.numbers.contains(&record.header().number()) {
            return Ok(None);
        }
        Ok(Some(record))
    }
}

/// Shared view of the records vetoed by a [`FilteredRecordsCollector`]
#[derive(Debug)]
pub struct FilteredRecords<P> {
    inner: Arc<Mutex<Vec<Record<P>>>>,
}

impl<P> Clone for FilteredRecords<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: Clone> FilteredRecords<P> {
    /// Records filtered so far, in filtering order
    pub fn snapshot(&self) -> Vec<Record<P>> {
        self.lock().clone()
    }
}

impl<P> FilteredRecords<P> {
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record<P>>> {
        // A poisoned list is still a valid list of records
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Wraps a filtering stage and remembers every record it vetoed
pub struct FilteredRecordsCollector<S, P> {
    delegate: S,
    filtered: FilteredRecords<P>,
}

impl<S, P> FilteredRecordsCollector<S, P> {
    pub fn new(delegate: S) -> Self {
        Self {
            delegate,
            filtered: FilteredRecords {
                inner: Arc::new(Mutex::new(Vec::new())),
            },
        }
    }

    /// Handle to the collected records, usable after the job has taken
    /// ownership of the collector
    pub fn filtered_records(&self) -> FilteredRecords<P> {
        self.filtered.clone()
    }
}

impl<S, P> Stage<P> for FilteredRecordsCollector<S, P>
where
    S: Stage<P>,
    P: Clone + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        let input = record.clone();
        let output = self.delegate.process(record)?;
        if output.is_none() {
            self.filtered.lock().push(input);
        }
        Ok(output)
    }
}
