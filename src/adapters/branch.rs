//! Branch naming convention (spec.md §6.4): `releases/<version>`, or
//! `releases/<version>/<filename>` when one version yields multiple
//! artifacts.

/// Build a branch name for one artifact. `filename` should be `Some` only
/// when the version produces more than one branch (spec.md §6.4).
#[must_use]
pub fn branch_name(version: &str, filename: Option<&str>) -> Vec<u8> {
    match filename {
        Some(name) => format!("releases/{version}/{name}").into_bytes(),
        None => format!("releases/{version}").into_bytes(),
    }
}

/// The `HEAD` branch name, a plain constant because it's never templated.
pub const HEAD: &[u8] = b"HEAD";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_version_only_branch() {
        assert_eq!(branch_name("1.2.3", None), b"releases/1.2.3".to_vec());
    }

    #[test]
    fn builds_version_and_filename_branch() {
        assert_eq!(
            branch_name("1.2.3", Some("pkg-1.2.3-py3-none-any.whl")),
            b"releases/1.2.3/pkg-1.2.3-py3-none-any.whl".to_vec()
        );
    }
}
