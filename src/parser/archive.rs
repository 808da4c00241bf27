//! Crash archive decoding.
//!
//! Archives are bzip2-compressed (`exception_*.bz2`) or, in older drops,
//! stored plain. Decoding never fails loudly: a broken archive is logged
//! and reported as "no content" so the caller can move on to the next one.

use crate::utils::config::{COMPRESSED_SUFFIX, DECODE_CHUNK_SIZE};
use bzip2::read::BzDecoder;
use log::{debug, error};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Decode an archive into its raw byte stream
///
/// **Public** - main entry point for archive decoding
///
/// # Returns
/// The decompressed content, or `None` if the archive could not be read or
/// inflated. `None` means "skip this archive", never "abort the run".
pub fn decode_archive(path: impl AsRef<Path>) -> Option<Vec<u8>> {
    let path = path.as_ref();

    let result = if is_compressed(path) {
        File::open(path).and_then(|file| read_chunks(BzDecoder::new(file)))
    } else {
        File::open(path).and_then(read_chunks)
    };

    match result {
        Ok(content) => {
            debug!("Decoded {} ({} bytes)", path.display(), content.len());
            Some(content)
        }
        Err(e) => {
            error!("Failed to extract archive [{}]: {}", path.display(), e);
            None
        }
    }
}

/// Whether the path names the compressed archive form
pub fn is_compressed(path: &Path) -> bool {
    path.to_string_lossy().ends_with(COMPRESSED_SUFFIX)
}

/// Read until exhaustion, one chunk at a time
///
/// **Private** - shared by both archive forms
fn read_chunks<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut content = Vec::new();
    let mut chunk = vec![0u8; DECODE_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        content.extend_from_slice(&chunk[..n]);
    }

    Ok(content)
}
