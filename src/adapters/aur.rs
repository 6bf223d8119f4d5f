//! Arch User Repository adapter. Grounded on the teacher's `AurClient`
//! RPC shape (`aur.archlinux.org/rpc/v5`, `AurResponse { results:
//! Vec<AurPackage> }`), adapted from a build client into a loader:
//! the index carries `{"Name", "Version", "tarball_url"}` and the real
//! package description lives in the artifact's `.SRCINFO`, not the
//! index (spec.md §8 scenario 5).

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{Release, Sha1Git, VisitType};
use std::path::Path;
use url::Url;

pub struct AurAdapter {
    index_url: Url,
}

impl AurAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    fn package_name(&self) -> String {
        self.index_url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("aur-package")
            .to_string()
    }
}

/// A `.SRCINFO` field can repeat (one `key = value` line per arch override
/// or per sub-package). The only documented rule this adapter follows is
/// "concatenate with `\n`, in file order" (spec.md §8 scenario 5).
fn srcinfo_field(contents: &str, key: &str) -> Option<String> {
    let values: Vec<&str> = contents
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
        .collect();
    (!values.is_empty()).then(|| values.join("\n"))
}

fn find_srcinfo(dir: &Path) -> Option<std::path::PathBuf> {
    let direct = dir.join(".SRCINFO");
    if direct.is_file() {
        return Some(direct);
    }
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let nested = path.join(".SRCINFO");
            if nested.is_file() {
                return Some(nested);
            }
        }
    }
    None
}

impl PackageAdapter for AurAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Aur
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let version = index
            .get("Version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("AUR index missing Version".into()))?;
        Ok(vec![version.to_string()])
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        Ok(self.get_versions(transport).await?.into_iter().next())
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let indexed_version = index
            .get("Version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("AUR index missing Version".into()))?;
        if indexed_version != version {
            return Err(LoaderError::NotFound(format!("{} has no version {version}", self.index_url)));
        }

        let tarball_url = index
            .get("tarball_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("AUR index missing tarball_url".into()))?;
        let url = Url::parse(tarball_url)
            .map_err(|e| LoaderError::AdapterError(format!("bad AUR tarball_url: {e}")))?;

        let info = PackageInfo {
            url,
            filename: Some(format!("{}-{version}.tar.gz", self.package_name())),
            version: version.to_string(),
            checksums: std::collections::BTreeMap::new(),
            author: None,
            date: None,
            intrinsic_metadata: Some(index.clone()),
            manifest_format: "aur-rpc-v5",
        };
        Ok(vec![(branch_name(version, None), info)])
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        let description = find_srcinfo(unpacked_dir)
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| srcinfo_field(&contents, "pkgdesc"));

        let msg = match description {
            Some(desc) => message::standard_message_with_description("AUR", &self.package_name(), &info.version, &desc),
            None => message::standard_message("AUR", &self.package_name(), &info.version),
        };

        Ok(Some(Release {
            name: info.version.clone(),
            message: msg,
            author: info.author.clone(),
            date: info.date,
            target_id: directory_id,
            synthetic: true,
        }))
    }

    fn known_artifact_to_extid(&self, info: &PackageInfo) -> Option<ExtidKey> {
        checksum_or_url_extid(info)
    }
}
