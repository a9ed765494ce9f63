use bytes::Bytes;
use std::fmt;

/// Seq is the identity of a log entry. Seqs are assigned by the primary only,
/// densely: 1, 2, 3, ... with no holes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Seq(u64);

impl Seq {
    pub fn new(seq: u64) -> Self {
        Seq(seq)
    }

    pub fn val(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LogEntry is immutable once the primary has assigned its seq.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: Seq,
    pub payload: Bytes,
}
