//! Debian `.deb` extraction (spec.md §4.2): an `ar` container holding
//! `debian-binary`, `control.tar.*`, and `data.tar.*`. Only `data.tar.*` —
//! the package's file payload — is unpacked.

use super::tar_fmt::{self, Compression};
use crate::error::{LoaderError, Result};
use std::io::Read;

pub fn extract_deb(archive_path: &std::path::Path, dest_dir: &std::path::Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = ar::Archive::new(file);

    let mut data_tar: Option<(Vec<u8>, Compression)> = None;
    while let Some(entry) = archive.next_entry() {
        let mut entry = entry.map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?;
        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();
        let compression = if name.starts_with("data.tar.gz") {
            Some(Compression::Gzip)
        } else if name.starts_with("data.tar.xz") {
            Some(Compression::Xz)
        } else if name.starts_with("data.tar.bz2") {
            Some(Compression::Bzip2)
        } else if name.starts_with("data.tar") && !name.contains('.') {
            Some(Compression::None)
        } else {
            None
        };

        if let Some(compression) = compression {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            data_tar = Some((buf, compression));
            break;
        }
    }

    let (bytes, compression) = data_tar
        .ok_or_else(|| LoaderError::ArchiveDecodeError("deb has no data.tar.* member".into()))?;

    let tmp_path = dest_dir.with_extension("data.tar.tmp");
    std::fs::write(&tmp_path, &bytes)?;
    let result = tar_fmt::extract_tar(&tmp_path, dest_dir, compression);
    let _ = std::fs::remove_file(&tmp_path);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_deb(inner_files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut inner_builder = tar::Builder::new(Vec::new());
        for (name, contents) in inner_files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            inner_builder.append_data(&mut header, name, *contents).unwrap();
        }
        let inner_tar = inner_builder.into_inner().unwrap();
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&inner_tar).unwrap();
        let data_tar_gz = gz.finish().unwrap();

        let mut buf = Vec::new();
        {
            let mut builder = ar::Builder::new(std::io::Cursor::new(&mut buf));
            let header = ar::Header::new(b"data.tar.gz".to_vec(), data_tar_gz.len() as u64);
            builder.append(&header, &data_tar_gz[..]).unwrap();
        }
        buf
    }

    #[test]
    fn unpacks_data_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("pkg_1.0_amd64.deb");
        std::fs::write(&archive_path, make_deb(&[("usr/bin/pkg", b"#!/bin/sh")])).unwrap();

        let dest = tmp.path().join("out");
        extract_deb(&archive_path, &dest).unwrap();

        assert!(dest.join("usr/bin/pkg").exists());
    }
}
