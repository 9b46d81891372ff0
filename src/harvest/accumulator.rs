use std::collections::HashSet;
use tracing::debug;

use crate::harvest::record::ParsedRecord;

/// Merges parsed records, dropping duplicates and enforcing the result limit.
///
/// The seen-set grows monotonically and survives checkpoint resume, so an
/// item re-offered across cycles (or across runs) is emitted at most once.
pub struct Accumulator {
    /// 0 means unbounded.
    limit: usize,
    seen: HashSet<String>,
    records: Vec<ParsedRecord>,
    /// Accepted count carried over from a resumed checkpoint. Counts toward
    /// the limit but has no records in this run's output.
    base_total: usize,
    truncated: bool,
}

impl Accumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: HashSet::new(),
            records: Vec::new(),
            base_total: 0,
            truncated: false,
        }
    }

    /// Restore the seen-set and accepted count from a checkpoint.
    pub fn preload(&mut self, seen_keys: impl IntoIterator<Item = String>, total: usize) {
        self.seen.extend(seen_keys);
        self.base_total = total;
    }

    /// Merge a batch. Returns how many records were newly accepted.
    ///
    /// Once the limit is reached mid-batch, the remainder of the batch is
    /// discarded outright: the limit is a hard ceiling, not a soft target.
    pub fn accept(&mut self, batch: Vec<ParsedRecord>) -> usize {
        let mut accepted = 0;

        for record in batch {
            if self.is_full() {
                self.truncated = true;
                debug!("Result limit {} reached, discarding remainder of batch", self.limit);
                break;
            }
            if !self.seen.insert(record.identity.clone()) {
                continue;
            }
            self.records.push(record);
            accepted += 1;
        }

        accepted
    }

    pub fn is_full(&self) -> bool {
        self.limit > 0 && self.total() >= self.limit
    }

    /// Total accepted so far, including any resumed base count.
    pub fn total(&self) -> usize {
        self.base_total + self.records.len()
    }

    /// Whether a batch overflowed the limit.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn seen_keys(&self) -> impl Iterator<Item = &String> {
        self.seen.iter()
    }

    pub fn into_records(self) -> Vec<ParsedRecord> {
        self.records
    }
}
