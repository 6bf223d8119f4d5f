//! RubyGems `.gem` extraction (spec.md §4.2): the outer container is a
//! plain (uncompressed) tar holding `metadata.gz`, `data.tar.gz`, and
//! `checksums.yaml.gz`. Only `data.tar.gz` — the gem's actual payload — is
//! unpacked; metadata and checksums are the adapter's concern, not the
//! unpacker's.

use super::tar_fmt::{self, Compression};
use crate::error::{LoaderError, Result};
use std::io::Read;

pub fn extract_gem(archive_path: &std::path::Path, dest_dir: &std::path::Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut outer = tar::Archive::new(file);

    let mut data_tar_gz: Option<Vec<u8>> = None;
    for entry in outer
        .entries()
        .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?;
        let name = entry
            .path()
            .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?
            .to_path_buf();
        if name.to_string_lossy() == "data.tar.gz" {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            data_tar_gz = Some(buf);
            break;
        }
    }

    let data_tar_gz = data_tar_gz.ok_or_else(|| {
        LoaderError::ArchiveDecodeError("gem has no data.tar.gz payload".into())
    })?;

    let tmp_path = dest_dir.with_extension("data.tar.gz.tmp");
    std::fs::write(&tmp_path, &data_tar_gz)?;
    let result = tar_fmt::extract_tar(&tmp_path, dest_dir, Compression::Gzip);
    let _ = std::fs::remove_file(&tmp_path);
    result
}
