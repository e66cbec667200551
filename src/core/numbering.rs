use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::EngineError;
use super::types::DocumentType;

/// Default zero-padding of the sequence part ("0001").
pub const DEFAULT_PADDING: usize = 4;

/// Key of a number counter row: one row per (document type, year).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    pub document_type: DocumentType,
    pub year: i32,
}

impl CounterKey {
    pub fn new(document_type: DocumentType, year: i32) -> Self {
        Self {
            document_type,
            year,
        }
    }

    /// Counter for the year of `issue_date`.
    pub fn for_date(document_type: DocumentType, issue_date: NaiveDate) -> Self {
        Self::new(document_type, issue_date.year())
    }

    /// Row id, e.g. "invoice-2025".
    pub fn id(&self) -> String {
        format!("{}-{}", self.document_type.code(), self.year)
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.document_type.code(), self.year)
    }
}

/// Persisted counter row. `seq` is the last issued sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberCounter {
    pub id: String,
    pub document_type: DocumentType,
    pub year: i32,
    pub seq: u64,
}

impl NumberCounter {
    /// Fresh row for a key, `seq = 0`.
    pub fn empty(key: CounterKey) -> Self {
        Self {
            id: key.id(),
            document_type: key.document_type,
            year: key.year,
            seq: 0,
        }
    }
}

/// Document number in the format `{year}-{seq}`, e.g. "2025-0001".
///
/// Sequences wider than the padding are printed in full ("2025-12345").
#[derive(Debug, Clone, Copy)]
pub struct DocumentNumber {
    year: i32,
    seq: u64,
    padding: usize,
}

impl DocumentNumber {
    pub fn new(year: i32, seq: u64) -> Self {
        Self {
            year,
            seq,
            padding: DEFAULT_PADDING,
        }
    }

    /// Set zero-padding width (default: 4, so "0001").
    pub fn with_padding(mut self, width: usize) -> Self {
        self.padding = width;
        self
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:0>width$}",
            self.year,
            self.seq,
            width = self.padding
        )
    }
}

impl FromStr for DocumentNumber {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::invalid("number", format!("'{s}' is not a YYYY-NNNN number"));
        let (year, seq) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let number: u64 = seq.parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }
        Ok(Self {
            year,
            seq: number,
            padding: seq.len(),
        })
    }
}

// Compare by (year, seq); padding is presentation only.
impl PartialEq for DocumentNumber {
    fn eq(&self, other: &Self) -> bool {
        (self.year, self.seq) == (other.year, other.seq)
    }
}

impl Eq for DocumentNumber {}

impl std::hash::Hash for DocumentNumber {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.year, self.seq).hash(state);
    }
}

impl PartialOrd for DocumentNumber {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocumentNumber {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.year, self.seq).cmp(&(other.year, other.seq))
    }
}

impl Serialize for DocumentNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
