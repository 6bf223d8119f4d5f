//! zip / jar extraction (spec.md §4.2), via the `zip` crate.

use super::safety::{check_symlink_target, safe_join};
use crate::error::{LoaderError, Result};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| LoaderError::ArchiveDecodeError(format!("bad zip: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| LoaderError::ArchiveDecodeError(e.to_string()))?;

        let entry_name = entry
            .enclosed_name()
            .ok_or_else(|| LoaderError::UnsafeArchive("zip entry has unsafe path".into()))?;
        let dest_path = safe_join(dest_dir, &entry_name)?;

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let unix_mode = entry.unix_mode();
        if let Some(mode) = unix_mode {
            if mode & 0o170000 == 0o120000 {
                let mut link_target = String::new();
                entry.read_to_string(&mut link_target)?;
                let link_target = std::path::PathBuf::from(link_target);
                check_symlink_target(
                    dest_dir,
                    dest_path.parent().unwrap_or(dest_dir),
                    &link_target,
                )?;
                #[cfg(unix)]
                std::os::unix::fs::symlink(&link_target, &dest_path)?;
                continue;
            }
        }

        let mut out = File::create(&dest_path)?;
        std::io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let executable = unix_mode.is_some_and(|m| m & 0o111 != 0);
            let normalized = if executable { 0o755 } else { 0o644 };
            fs::set_permissions(&dest_path, fs::Permissions::from_mode(normalized))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, contents) in entries {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn extracts_files_preserving_tree_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_path = tmp.path().join("pkg.zip");
        fs::write(
            &archive_path,
            make_zip(&[("pkg/index.js", b"module.exports = {}"), ("pkg/package.json", b"{}")]),
        )
        .unwrap();

        let dest = tmp.path().join("out");
        extract_zip(&archive_path, &dest).unwrap();

        assert!(dest.join("pkg/index.js").exists());
        assert!(dest.join("pkg/package.json").exists());
    }
}
