//! Record, header and batch model
//!
//! A [`Record`] is immutable once read. Stages that change the payload build a
//! new record through [`Record::with_payload`] or [`Record::map_payload`], both
//! of which carry the original [`Header`] so listeners can correlate input and
//! output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source name used when a reader has nothing better to report
pub const UNKNOWN_SOURCE: &str = "N/A";

/// Bound shared by payloads that cross task and queue boundaries.
///
/// Implemented for every `Clone + Send + Sync + 'static` type.
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Record metadata assigned by the reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    number: u64,
    source: String,
    created_at: DateTime<Utc>,
}

impl Header {
    pub fn new(number: u64, source: impl Into<String>) -> Self {
        Self {
            number,
            source: source.into(),
            created_at: Utc::now(),
        }
    }

    /// Position of the record within its reader, starting at 1
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "number={}, source=\"{}\", creationDate=\"{}\"",
            self.number,
            self.source,
            self.created_at.to_rfc3339()
        )
    }
}

/// One unit of data moving through a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<P> {
    header: Header,
    payload: P,
}

impl<P> Record<P> {
    pub fn new(header: Header, payload: P) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    pub fn into_payload(self) -> P {
        self.payload
    }

    pub fn into_parts(self) -> (Header, P) {
        (self.header, self.payload)
    }

    /// Replace the payload, keeping the header
    pub fn with_payload<Q>(self, payload: Q) -> Record<Q> {
        Record {
            header: self.header,
            payload,
        }
    }

    /// Transform the payload, keeping the header
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> Record<Q> {
        Record {
            header: self.header,
            payload: f(self.payload),
        }
    }
}

impl<P: std::fmt::Display> std::fmt::Display for Record<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Record: {{header=[{}], payload=[{}]}}", self.header, self.payload)
    }
}

/// Hands out consecutive headers for a reader instance.
///
/// Readers own one of these so that `Header::number` is strictly increasing
/// from 1 for the lifetime of the reader.
#[derive(Debug, Clone)]
pub struct RecordNumbering {
    source: String,
    last: u64,
}

impl RecordNumbering {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            last: 0,
        }
    }

    pub fn next_header(&mut self) -> Header {
        self.last += 1;
        Header::new(self.last, self.source.clone())
    }

    /// Wrap a payload into a record carrying the next header
    pub fn stamp<P>(&mut self, payload: P) -> Record<P> {
        Record::new(self.next_header(), payload)
    }

    /// Number of headers handed out so far
    pub fn count(&self) -> u64 {
        self.last
    }
}

impl Default for RecordNumbering {
    fn default() -> Self {
        Self::new(UNKNOWN_SOURCE)
    }
}

/// Ordered group of records handed to a writer in one call
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<P> {
    records: Vec<Record<P>>,
}

impl<P> Batch<P> {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: Record<P>) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record<P>> {
        self.records.iter()
    }

    pub fn records(&self) -> &[Record<P>] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record<P>> {
        self.records
    }
}

impl<P> Default for Batch<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> From<Vec<Record<P>>> for Batch<P> {
    fn from(records: Vec<Record<P>>) -> Self {
        Self { records }
    }
}

impl<P> IntoIterator for Batch<P> {
    type Item = Record<P>;
    type IntoIter = std::vec::IntoIter<Record<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a, P> IntoIterator for &'a Batch<P> {
    type Item = &'a Record<P>;
    type IntoIter = std::slice::Iter<'a, Record<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Item carried by fork/join queues.
///
/// The end-of-stream sentinel is its own variant, so it can never be mistaken
/// for (or handed to a stage as) an ordinary payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<P> {
    Data(Record<P>),
    Poison,
}

impl<P> Envelope<P> {
    pub fn is_poison(&self) -> bool {
        matches!(self, Envelope::Poison)
    }
}

impl<P> From<Record<P>> for Envelope<P> {
    fn from(record: Record<P>) -> Self {
        Envelope::Data(record)
    }
}
