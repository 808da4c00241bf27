//! Record types produced by the record stream.
//!
//! `WireReport` mirrors what a client pickles; `RawRecord` is the flattened,
//! immutable view the rest of the pipeline works with.

use crate::utils::config::{FIELD_COMMENTS, FIELD_REMOTE_HOST, FIELD_STACK, FIELD_SYSINFO};
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;

/// One crash report as extracted from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Position in the archive's stream, starting at 0
    pub sequence_id: u64,

    /// Client timestamp, candidate unique key
    pub timestamp: Option<String>,

    /// Compulsory post fields in configured order; absent keys hold `None`
    pub fields: Vec<(String, Option<String>)>,
}

impl RawRecord {
    pub fn new(sequence_id: u64, timestamp: Option<String>) -> Self {
        Self {
            sequence_id,
            timestamp,
            fields: Vec::new(),
        }
    }

    /// Set or replace a post field
    pub fn with_field(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
        self
    }

    /// Value of a post field, `None` when absent or null
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn stack(&self) -> Option<&str> {
        self.field(FIELD_STACK)
    }

    pub fn comment(&self) -> Option<&str> {
        self.field(FIELD_COMMENTS)
    }

    pub fn sysinfo(&self) -> Option<&str> {
        self.field(FIELD_SYSINFO)
    }

    pub fn remote_host(&self) -> Option<&str> {
        self.field(FIELD_REMOTE_HOST)
    }
}

/// Top-level pickled object as sent by clients
///
/// Unknown keys are ignored; `post` is a list of `(key, value)` pairs.
#[derive(Debug, Deserialize)]
pub(crate) struct WireReport {
    #[serde(default)]
    pub timestamp: Option<PickleText>,

    #[serde(default)]
    pub post: Option<Vec<(PickleText, PickleText)>>,
}

/// A pickled scalar flattened to text
///
/// Python 2 clients send `str` which unpickles as bytes, so bytes are
/// decoded lossily. Numbers and booleans are rendered; containers and
/// `None` become `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PickleText(pub Option<String>);

impl<'de> Deserialize<'de> for PickleText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PickleTextVisitor)
    }
}

struct PickleTextVisitor;

impl<'de> Visitor<'de> for PickleTextVisitor {
    type Value = PickleText;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a pickled scalar")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(PickleText(Some(String::from_utf8_lossy(v).into_owned())))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        let text = match String::from_utf8(v) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Ok(PickleText(Some(text)))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v.to_string())))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v.to_string())))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(PickleText(Some(v.to_string())))
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PickleText(None))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(PickleText(None))
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(PickleTextVisitor)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(PickleText(None))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(PickleText(None))
    }
}
