#![allow(dead_code)]

use bzip2::write::BzEncoder;
use bzip2::Compression;
use serde::Serialize;
use serde_pickle::SerOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const STACK_AB: &str = "File \"a.py\", line 1, in foo\nFile \"b.py\", line 2, in bar";
pub const STACK_C: &str = "File \"c.py\", line 9, in baz";

#[derive(Serialize)]
struct WireFixture<'a> {
    timestamp: &'a str,
    post: Vec<(&'a str, &'a str)>,
}

/// Pickle one record the way clients send it
pub fn pickle_record(timestamp: &str, post: &[(&str, &str)]) -> Vec<u8> {
    let fixture = WireFixture {
        timestamp,
        post: post.to_vec(),
    };
    serde_pickle::to_vec(&fixture, SerOptions::new()).unwrap()
}

/// Pickle a stack-and-comment record
pub fn stack_record(timestamp: &str, stack: &str, comment: &str) -> Vec<u8> {
    pickle_record(timestamp, &[("stack", stack), ("comments", comment)])
}

pub fn bz2(data: &[u8]) -> Vec<u8> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Write a compressed archive holding the concatenated units
pub fn write_archive(dir: &Path, name: &str, units: &[Vec<u8>]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bz2(&units.concat())).unwrap();
    path
}
