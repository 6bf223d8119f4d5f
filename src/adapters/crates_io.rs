//! crates.io adapter. Index format:
//! `GET https://crates.io/api/v1/crates/<name>` returns
//! `{"crate": {"max_version": ...}, "versions": [{"num", "dl_path",
//! "checksum", "created_at", "yanked", "published_by"}, ...]}`.

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, PersonActor, Release, Sha1Git, VisitType};
use semver::Version;
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct CratesIoAdapter {
    index_url: Url,
}

impl CratesIoAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    fn package_name(&self) -> String {
        self.index_url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("crate")
            .to_string()
    }

    fn download_url(&self, dl_path: &str) -> Result<Url> {
        let origin = self
            .index_url
            .join(dl_path)
            .map_err(|e| LoaderError::AdapterError(format!("bad crates.io dl_path: {e}")))?;
        Ok(origin)
    }
}

impl PackageAdapter for CratesIoAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Crates
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let versions = index
            .get("versions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LoaderError::AdapterError("crates.io index missing versions".into()))?;
        let mut names: Vec<String> = versions
            .iter()
            .filter(|v| !v.get("yanked").and_then(serde_json::Value::as_bool).unwrap_or(false))
            .filter_map(|v| v.get("num").and_then(|n| n.as_str()).map(str::to_string))
            .collect();
        names.sort_by(|a, b| match (Version::parse(a), Version::parse(b)) {
            (Ok(va), Ok(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        });
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        Ok(index
            .get("crate")
            .and_then(|c| c.get("max_version"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let entry = index
            .get("versions")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.iter().find(|v| v.get("num").and_then(|n| n.as_str()) == Some(version)))
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;

        let dl_path = entry
            .get("dl_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("crates.io version missing dl_path".into()))?;
        let url = self.download_url(dl_path)?;

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(sha256) = entry.get("checksum").and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Sha256, sha256.to_string());
        }

        let author = entry.get("published_by").and_then(|p| {
            let name = p.get("name").and_then(|v| v.as_str()).map(str::to_string);
            name.map(|name| PersonActor { name: Some(name), email: None })
        });

        let date = entry
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let filename = Some(format!("{}-{version}.crate", self.package_name()));

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums,
            author,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "cratesio-v1",
        };
        Ok(vec![(branch_name(version, None), info)])
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        _unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        Ok(Some(Release {
            name: info.version.clone(),
            message: message::standard_message("crates.io", &self.package_name(), &info.version),
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
