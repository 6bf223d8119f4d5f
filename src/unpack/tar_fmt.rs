//! tar / tar.gz / tar.bz2 / tar.xz extraction.
//!
//! Grounded on the teacher's `core/archive.rs::extract_tar_gz_strip`
//! (manual per-entry extraction so path/permission rules can be enforced),
//! extended with path-traversal and symlink-escape rejection.

use super::safety::{check_symlink_target, safe_join};
use crate::error::{LoaderError, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::Path;
use tar::Archive;

pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

pub fn extract_tar(archive_path: &Path, dest_dir: &Path, compression: Compression) -> Result<()> {
    let file = File::open(archive_path)?;
    match compression {
        Compression::None => extract_entries(Archive::new(file), dest_dir),
        Compression::Gzip => extract_entries(Archive::new(GzDecoder::new(file)), dest_dir),
        Compression::Bzip2 => {
            extract_entries(Archive::new(bzip2::read::BzDecoder::new(file)), dest_dir)
        }
        Compression::Xz => {
            let mut reader = std::io::BufReader::new(file);
            let mut decompressed = Vec::new();
            lzma_rs::xz_decompress(&mut reader, &mut decompressed).map_err(|e| {
                LoaderError::ArchiveDecodeError(format!("xz decode failed: {e}"))
            })?;
            extract_entries(Archive::new(Cursor::new(decompressed)), dest_dir)
        }
    }
}

fn extract_entries<R: Read>(mut archive: Archive<R>, dest_dir: &Path) -> Result<()> {
    for entry in archive
        .entries()
        .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?
    {
        let mut entry = entry.map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?
            .to_path_buf();

        let dest_path = safe_join(dest_dir, &entry_path)?;

        let header = entry.header().clone();
        if header.entry_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if header.entry_type().is_symlink() {
            let link_name = entry
                .link_name()
                .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?
                .ok_or_else(|| {
                    LoaderError::ArchiveDecodeError("symlink entry with no target".into())
                })?
                .to_path_buf();
            check_symlink_target(
                dest_dir,
                dest_path.parent().unwrap_or(dest_dir),
                &link_name,
            )?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_name, &dest_path)?;
            continue;
        }

        if !header.entry_type().is_file() {
            // Skip hardlinks, devices, fifos etc: not part of this crate's
            // content model (spec.md §3 only knows file/dir/symlink).
            continue;
        }

        let mode = header.mode().unwrap_or(0o644);
        let mut out = File::create(&dest_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let normalized = if mode & 0o111 != 0 { 0o755 } else { 0o644 };
            fs::set_permissions(&dest_path, fs::Permissions::from_mode(normalized))?;
        }
    }
    Ok(())
}
