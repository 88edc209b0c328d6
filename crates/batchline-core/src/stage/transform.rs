//! Mapping, validation and processing stages
//!
//! All of these keep the header of their input record.

use anyhow::{anyhow, Result};

use super::Stage;
use crate::record::Record;

/// Infallible payload transformation. Also used for marshalling.
pub struct Mapper<F> {
    f: F,
}

impl<F> Mapper<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<P, F> Stage<P> for Mapper<F>
where
    F: FnMut(P) -> P + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        Ok(Some(record.map_payload(&mut self.f)))
    }
}

/// Validates payloads. A violation is a per-record error counted against
/// the job's error threshold.
pub struct Validator<F> {
    check: F,
}

impl<F> Validator<F> {
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

impl<P, F> Stage<P> for Validator<F>
where
    F: FnMut(&P) -> std::result::Result<(), String> + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        (self.check)(record.payload()).map_err(|violation| {
            anyhow!(
                "Validation failed for record {}: {}",
                record.header().number(),
                violation
            )
        })?;
        Ok(Some(record))
    }
}

/// Fallible record transformation (the user's business logic)
pub struct Processor<F> {
    f: F,
}

impl<F> Processor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<P, F> Stage<P> for Processor<F>
where
    F: FnMut(Record<P>) -> Result<Record<P>> + Send,
{
    fn process(&mut self, record: Record<P>) -> Result<Option<Record<P>>> {
        (self.f)(record).map(Some)
    }
}
