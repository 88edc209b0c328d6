//! Record pipeline stages
//!
//! A [`Stage`] receives one record and returns it (possibly transformed),
//! returns `None` to veto it, or fails. A [`Pipeline`] runs stages in order
//! and stops at the first veto, so later stages never see a suppressed record.
//! Pipelines are stages themselves and nest freely.

mod filters;
mod transform;

pub use filters::{
    FilteredRecords, FilteredRecordsCollector, Filter, GrepFilter, PrefixSkipper,
    RecordNumberSkipper,
};
pub use transform::{Mapper, Processor, Validator};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A single step of a record pipeline
pub trait Stage<P>: Send {
    /// Process one record. `Ok(None)` filters the record out.
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>>;
}

impl<P, F> Stage<P> for F
where
    F: FnMut(Record<P>) -> Result<Option<Record<P>>> + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        self(record)
    }
}

/// Registration category of a stage.
///
/// Job pipelines always apply kinds in declaration order:
/// filter, map, validate, process, marshal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Filter,
    Map,
    Validate,
    Process,
    Marshal,
}

/// Composite stage running its children in registration order
pub struct Pipeline<P> {
    stages: Vec<Box<dyn Stage<P>>>,
}

impl<P> Pipeline<P> {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage
    pub fn add(&mut self, stage: impl Stage<P> + 'static) {
        self.stages.push(Box::new(stage));
    }

    /// Builder-style variant of [`Pipeline::add`]
    pub fn with(mut self, stage: impl Stage<P> + 'static) -> Self {
        self.add(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl<P> Default for Pipeline<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> From<Vec<Box<dyn Stage<P>>>> for Pipeline<P> {
    fn from(stages: Vec<Box<dyn Stage<P>>>) -> Self {
        Self { stages }
    }
}

impl<P> Stage<P> for Pipeline<P> {
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        let mut current = record;
        for stage in self.stages.iter_mut() {
            match (**stage).process(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}
