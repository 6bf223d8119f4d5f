//! Unpacker (C2): extract an archive into a sandboxed directory.
//!
//! Grounded on the teacher's `core/archive.rs` dispatch-by-extension style,
//! extended with the path-traversal/symlink-escape safety check spec.md
//! §4.2 requires (the teacher only ever extracts its own trusted release
//! tarballs, so it doesn't need one; this crate extracts arbitrary
//! upstream artifacts).

mod deb;
mod gem;
mod safety;
mod tar_fmt;
mod zip_fmt;

pub use safety::safe_join;

use crate::error::{LoaderError, Result};
use std::path::{Path, PathBuf};

/// Archive kinds the unpacker understands (spec.md §1/§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Zip,
    /// RubyGems `.gem`: outer `ar`-free tar, inner `data.tar.gz` payload.
    Gem,
    /// Debian `.deb`: `ar` container, `data.tar.*` payload.
    Deb,
}

/// Infer archive kind from a filename's extension (spec.md §4.2).
pub fn infer_kind(path: &Path) -> Result<ArchiveKind> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LoaderError::ArchiveDecodeError("archive path has no filename".into()))?;
    let lower = name.to_ascii_lowercase();

    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") || lower.ends_with(".crate") {
        Ok(ArchiveKind::TarGz)
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
        Ok(ArchiveKind::TarBz2)
    } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
        Ok(ArchiveKind::TarXz)
    } else if lower.ends_with(".tar") {
        Ok(ArchiveKind::Tar)
    } else if lower.ends_with(".zip") || lower.ends_with(".jar") {
        Ok(ArchiveKind::Zip)
    } else if lower.ends_with(".gem") {
        Ok(ArchiveKind::Gem)
    } else if lower.ends_with(".deb") {
        Ok(ArchiveKind::Deb)
    } else {
        Err(LoaderError::ArchiveDecodeError(format!(
            "cannot infer archive kind from filename: {name}"
        )))
    }
}

/// Extract `archive_path` into a fresh directory under `dest_dir`, returning
/// the unpacked directory's path (spec.md §4.2 contract:
/// `unpack(archive_path, kind?) -> DirectoryPath`).
pub fn unpack(archive_path: &Path, dest_dir: &Path, kind: Option<ArchiveKind>) -> Result<PathBuf> {
    let kind = match kind {
        Some(k) => k,
        None => infer_kind(archive_path)?,
    };

    std::fs::create_dir_all(dest_dir)?;

    match kind {
        ArchiveKind::Tar => tar_fmt::extract_tar(archive_path, dest_dir, tar_fmt::Compression::None),
        ArchiveKind::TarGz => tar_fmt::extract_tar(archive_path, dest_dir, tar_fmt::Compression::Gzip),
        ArchiveKind::TarBz2 => {
            tar_fmt::extract_tar(archive_path, dest_dir, tar_fmt::Compression::Bzip2)
        }
        ArchiveKind::TarXz => tar_fmt::extract_tar(archive_path, dest_dir, tar_fmt::Compression::Xz),
        ArchiveKind::Zip => zip_fmt::extract_zip(archive_path, dest_dir),
        ArchiveKind::Gem => gem::extract_gem(archive_path, dest_dir),
        ArchiveKind::Deb => deb::extract_deb(archive_path, dest_dir),
    }?;

    Ok(dest_dir.to_path_buf())
}
