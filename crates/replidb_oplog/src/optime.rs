//! Oplog positions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical clock value: seconds plus an ordinal within the second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the epoch.
    pub secs: u32,
    /// Increment within the second.
    pub inc: u32,
}

impl Timestamp {
    /// Creates a timestamp.
    #[must_use]
    pub const fn new(secs: u32, inc: u32) -> Self {
        Self { secs, inc }
    }

    /// Packs the timestamp into a single integer, seconds in the high word.
    #[must_use]
    pub const fn to_packed(self) -> i64 {
        (((self.secs as u64) << 32) | self.inc as u64) as i64
    }

    /// Unpacks a timestamp produced by [`Timestamp::to_packed`].
    #[must_use]
    pub const fn from_packed(packed: i64) -> Self {
        let raw = packed as u64;
        Self {
            secs: (raw >> 32) as u32,
            inc: raw as u32,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.secs, self.inc)
    }
}

/// Position of an operation in the remote log.
///
/// Only used for diagnostics and divergence detection; operations are
/// never reordered by optime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpTime {
    /// Log timestamp.
    pub timestamp: Timestamp,
    /// Election term, absent in older logs.
    pub term: Option<i64>,
}

impl OpTime {
    /// Creates an optime without a term.
    #[must_use]
    pub const fn new(secs: u32, inc: u32) -> Self {
        Self {
            timestamp: Timestamp::new(secs, inc),
            term: None,
        }
    }

    /// Sets the term.
    #[must_use]
    pub const fn with_term(mut self, term: i64) -> Self {
        self.term = Some(term);
        self
    }
}

impl fmt::Display for OpTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.term {
            Some(term) => write!(f, "{{ ts: {}, t: {} }}", self.timestamp, term),
            None => write!(f, "{{ ts: {} }}", self.timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_keeps_order_and_parts() {
        let a = Timestamp::new(10, 2);
        let b = Timestamp::new(11, 0);
        assert!(a.to_packed() < b.to_packed());
        assert_eq!(Timestamp::from_packed(a.to_packed()), a);
        assert_eq!(Timestamp::from_packed(Timestamp::new(u32::MAX, 7).to_packed()).inc, 7);
    }

    #[test]
    fn display() {
        assert_eq!(OpTime::new(5, 1).to_string(), "{ ts: Timestamp(5, 1) }");
        assert_eq!(
            OpTime::new(5, 1).with_term(3).to_string(),
            "{ ts: Timestamp(5, 1), t: 3 }"
        );
    }
}
