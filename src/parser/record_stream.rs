//! Streaming decode of back-to-back pickled records.
//!
//! An archive's content is zero or more pickles written one after another
//! with no length prefix. Each unit is self-delimiting (it ends at the STOP
//! opcode), so the stream decodes one unit, advances by exactly the bytes
//! the unpickler consumed, and repeats.
//!
//! Termination is asymmetric and must stay that way:
//! - end of input (or an unpickler EOF) ends the stream cleanly;
//! - any other decode error ends the stream silently, keeping every record
//!   decoded before it. Bytes after the bad unit are never inspected.
//!
//! Neither case is surfaced as an error; `termination()` tells them apart.

use super::schema::{PickleText, RawRecord, WireReport};
use crate::utils::error::RecordError;
use log::{debug, warn};
use serde::Deserialize;
use serde_pickle::{DeOptions, ErrorCode};
use std::io::{self, Read};

/// Why a record stream stopped producing records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Input exhausted after `records` units
    Exhausted { records: u64 },

    /// A unit failed to decode; `records` units before it were kept
    Truncated { records: u64, reason: String },
}

/// Lazy, finite, non-restartable sequence of records over one buffer
///
/// **Public** - iterate it to pull records out of decoded archive content
pub struct RecordStream<'a> {
    buf: &'a [u8],
    pos: usize,
    next_id: u64,
    fields: &'a [String],
    end: Option<StreamEnd>,
}

impl<'a> RecordStream<'a> {
    /// Create a stream positioned at offset 0
    ///
    /// # Arguments
    /// * `buf` - Decoded archive content
    /// * `fields` - Compulsory post keys to keep on each record
    pub fn new(buf: &'a [u8], fields: &'a [String]) -> Self {
        Self {
            buf,
            pos: 0,
            next_id: 0,
            fields,
            end: None,
        }
    }

    /// How the stream ended, `None` while it is still live
    pub fn termination(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decode the unit at the current position and advance past it
    ///
    /// **Private** - one unpickler per unit, so memo state never leaks
    /// between records
    fn decode_unit(&mut self) -> Result<WireReport, RecordError> {
        let mut reader = UnitReader {
            remaining: &self.buf[self.pos..],
            consumed: 0,
        };

        let result = {
            let mut de = serde_pickle::Deserializer::new(&mut reader, DeOptions::new());
            WireReport::deserialize(&mut de)
        };

        self.pos += reader.consumed;
        Ok(result?)
    }

    /// Flatten a wire report into a record with the compulsory field set
    ///
    /// **Private** - absent keys are kept as `None`, never an error
    fn extract(&self, wire: WireReport, sequence_id: u64) -> RawRecord {
        let mut fields: Vec<(String, Option<String>)> =
            self.fields.iter().map(|f| (f.clone(), None)).collect();

        for (PickleText(key), PickleText(value)) in wire.post.unwrap_or_default() {
            let Some(key) = key else { continue };
            // Last occurrence wins, as with a dict built from the pairs
            if let Some(slot) = fields.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            }
        }

        RawRecord {
            sequence_id,
            timestamp: wire.timestamp.and_then(|t| t.0),
            fields,
        }
    }

    fn finish(&mut self, end: StreamEnd) {
        match &end {
            StreamEnd::Exhausted { records } => {
                debug!("Record stream exhausted after {} records", records);
            }
            StreamEnd::Truncated { records, reason } => {
                warn!(
                    "Record stream truncated after {} records at byte {}: {}",
                    records, self.pos, reason
                );
            }
        }
        self.end = Some(end);
    }
}

impl Iterator for RecordStream<'_> {
    type Item = RawRecord;

    fn next(&mut self) -> Option<RawRecord> {
        if self.end.is_some() {
            return None;
        }

        let records = self.next_id;

        if self.pos >= self.buf.len() {
            self.finish(StreamEnd::Exhausted { records });
            return None;
        }

        match self.decode_unit() {
            Ok(wire) => {
                let record = self.extract(wire, self.next_id);
                self.next_id += 1;
                Some(record)
            }
            Err(e) if is_end_of_stream(&e) => {
                self.finish(StreamEnd::Exhausted { records });
                None
            }
            Err(e) => {
                self.finish(StreamEnd::Truncated {
                    records,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

/// Whether the unpickler failed only because input ran out
fn is_end_of_stream(err: &RecordError) -> bool {
    match err {
        RecordError::Pickle(serde_pickle::Error::Eval(ErrorCode::EOFWhileParsing, _))
        | RecordError::Pickle(serde_pickle::Error::Syntax(ErrorCode::EOFWhileParsing)) => true,
        RecordError::Pickle(serde_pickle::Error::Io(e)) => e.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// Hands the unpickler one byte per read
///
/// The unpickler buffers its input internally; feeding it single bytes
/// keeps that buffer from reaching past the current unit's STOP opcode, so
/// `consumed` is exactly the unit's length.
struct UnitReader<'a> {
    remaining: &'a [u8],
    consumed: usize,
}

impl Read for UnitReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match (self.remaining.split_first(), out.first_mut()) {
            (Some((byte, rest)), Some(slot)) => {
                *slot = *byte;
                self.remaining = rest;
                self.consumed += 1;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::DEFAULT_COMPULSORY_FIELDS;
    use serde::Serialize;
    use serde_pickle::SerOptions;

    #[derive(Serialize)]
    struct Fixture<'a> {
        timestamp: &'a str,
        post: Vec<(&'a str, &'a str)>,
    }

    fn pickle(timestamp: &str, post: Vec<(&str, &str)>) -> Vec<u8> {
        serde_pickle::to_vec(&Fixture { timestamp, post }, SerOptions::new()).unwrap()
    }

    fn fields() -> Vec<String> {
        DEFAULT_COMPULSORY_FIELDS.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let fields = fields();
        let mut stream = RecordStream::new(&[], &fields);

        assert!(stream.next().is_none());
        assert_eq!(
            stream.termination(),
            Some(&StreamEnd::Exhausted { records: 0 })
        );
    }

    #[test]
    fn test_decodes_back_to_back_units() {
        let mut buf = pickle("1", vec![("stack", "s1"), ("comments", "c1")]);
        buf.extend(pickle("2", vec![("stack", "s2")]));
        let fields = fields();

        let mut stream = RecordStream::new(&buf, &fields);
        let records: Vec<RawRecord> = stream.by_ref().collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence_id, 0);
        assert_eq!(records[0].timestamp.as_deref(), Some("1"));
        assert_eq!(records[0].comment(), Some("c1"));
        assert_eq!(records[1].sequence_id, 1);
        assert_eq!(records[1].stack(), Some("s2"));
        assert_eq!(records[1].comment(), None);
        assert_eq!(stream.position(), buf.len());
        assert_eq!(
            stream.termination(),
            Some(&StreamEnd::Exhausted { records: 2 })
        );
    }

    #[test]
    fn test_non_compulsory_keys_are_dropped() {
        let buf = pickle("1", vec![("stack", "s"), ("user_agent", "x")]);
        let fields = fields();

        let record = RecordStream::new(&buf, &fields).next().unwrap();

        assert!(record.field("user_agent").is_none());
        assert_eq!(record.fields.len(), DEFAULT_COMPULSORY_FIELDS.len());
        assert_eq!(record.fields[0], ("sysinfo".to_string(), None));
    }

    #[test]
    fn test_corrupt_first_unit_yields_zero_records() {
        let mut buf = vec![0xff, 0xfe, 0xfd];
        buf.extend(pickle("1", vec![("stack", "s")]));
        let fields = fields();

        let mut stream = RecordStream::new(&buf, &fields);

        assert!(stream.next().is_none());
        assert!(matches!(
            stream.termination(),
            Some(StreamEnd::Truncated { records: 0, .. })
        ));
    }

    #[test]
    fn test_stream_is_not_restartable() {
        let buf = pickle("1", vec![("stack", "s")]);
        let fields = fields();
        let mut stream = RecordStream::new(&buf, &fields);

        assert!(stream.next().is_some());
        assert!(stream.next().is_none());
        assert!(stream.next().is_none());
    }
}
