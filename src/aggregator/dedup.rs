//! Content-addressed grouping of stack traces.
//!
//! Every record with a stack is keyed by a SHA-256 digest of the exact raw
//! stack text (before any folding). Records sharing a digest collapse into
//! one group that tracks the occurrence count and each record's comment.

use crate::parser::RawRecord;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Fixed-width digest of a raw stack text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digest the stack text byte for byte
    pub fn of(stack: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(stack.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// All records sharing one stack text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintedGroup {
    pub fingerprint: Fingerprint,

    /// Stack text of the first record seen
    pub representative_stack: String,

    /// Always >= 1
    pub count: u64,

    /// sequence_id -> comment (None when the record had none)
    pub comments: BTreeMap<u64, Option<String>>,
}

/// Accumulator over a run's records
///
/// `add_record`/`add_stack` are the only mutation points. Groups are kept in insertion
/// order, which is the tie-break for every count-ordered view.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    groups: Vec<FingerprintedGroup>,
    index: HashMap<Fingerprint, usize>,
    records_seen: u64,
    records_skipped: u64,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into its group
    ///
    /// Records whose stack is null or empty are counted as skipped and
    /// never join a group.
    pub fn add_record(&mut self, record: &RawRecord) {
        self.add_stack(
            record.stack(),
            record.sequence_id,
            record.comment().map(str::to_string),
        );
    }

    /// Fold a bare stack into its group
    ///
    /// Used where records have already been reshaped (e.g. sink reports
    /// feeding a partition fold); same skip rule as `add_record`.
    pub fn add_stack(&mut self, stack: Option<&str>, sequence_id: u64, comment: Option<String>) {
        self.records_seen += 1;

        let stack = match stack {
            Some(s) if !s.is_empty() => s,
            _ => {
                self.records_skipped += 1;
                debug!("Record {} has no stack, not grouped", sequence_id);
                return;
            }
        };

        let fingerprint = Fingerprint::of(stack);
        match self.index.get(&fingerprint) {
            Some(&i) => {
                let group = &mut self.groups[i];
                group.count += 1;
                group.comments.insert(sequence_id, comment);
            }
            None => {
                self.index.insert(fingerprint, self.groups.len());
                self.groups.push(FingerprintedGroup {
                    fingerprint,
                    representative_stack: stack.to_string(),
                    count: 1,
                    comments: BTreeMap::from([(sequence_id, comment)]),
                });
            }
        }
    }

    /// Groups in insertion order
    pub fn groups(&self) -> &[FingerprintedGroup] {
        &self.groups
    }

    /// Look up a group by fingerprint
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&FingerprintedGroup> {
        self.index.get(fingerprint).map(|&i| &self.groups[i])
    }

    /// Groups by descending count; equal counts keep insertion order
    pub fn ranked(&self) -> Vec<&FingerprintedGroup> {
        let mut ranked: Vec<&FingerprintedGroup> = self.groups.iter().collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.count.cmp(&a.count));
        ranked
    }

    /// Records offered so far, grouped or not
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Records excluded for lacking a stack
    pub fn records_skipped(&self) -> u64 {
        self.records_skipped
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
