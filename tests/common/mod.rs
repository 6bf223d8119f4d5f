//! Shared fixtures for the orchestrator's end-to-end tests: a tiny
//! in-memory tarball builder and digest helper, so each scenario test
//! doesn't need to touch the filesystem or a real registry.

use flate2::write::GzEncoder;
use flate2::Compression;
use sha1::{Digest, Sha1};
use std::io::Write;

fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap()
}

/// Build a `.tar.gz` with one file at `path` containing `contents`.
pub fn build_tarball(path: &str, contents: &[u8]) -> Vec<u8> {
    let tar_bytes = build_tar(&[(path, contents)]);
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&tar_bytes).unwrap();
    gz.finish().unwrap()
}

/// Build a `.tar.bz2` with several files, for adapters (like CPAN) that
/// read intrinsic metadata back out of the unpacked tree.
pub fn build_tar_bz2(files: &[(&str, &[u8])]) -> Vec<u8> {
    let tar_bytes = build_tar(files);
    let mut bz = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    bz.write_all(&tar_bytes).unwrap();
    bz.finish().unwrap()
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
