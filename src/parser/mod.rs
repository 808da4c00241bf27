//! Archive decoding and record extraction.
//!
//! This module handles:
//! - Inflating crash archives into raw byte streams
//! - Decoding back-to-back pickled records from those streams
//! - Flattening each record to the compulsory field set

pub mod archive;
pub mod record_stream;
pub mod schema;

// Re-export main types
pub use archive::{decode_archive, is_compressed};
pub use record_stream::{RecordStream, StreamEnd};
pub use schema::RawRecord;
