//! npm registry adapter. Index format: `GET https://registry.npmjs.org/<name>`
//! returns `{"dist-tags": {"latest": ...}, "versions": {...}, "time": {...}}`.

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, PersonActor, Release, Sha1Git, VisitType};
use semver::Version;
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct NpmAdapter {
    index_url: Url,
}

impl NpmAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    fn package_name(&self) -> String {
        self.index_url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("package")
            .to_string()
    }
}

fn parse_semver(version: &str) -> Option<Version> {
    Version::parse(version).ok()
}

impl PackageAdapter for NpmAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Npm
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let versions = index
            .get("versions")
            .and_then(|v| v.as_object())
            .ok_or_else(|| LoaderError::AdapterError("npm index missing versions".into()))?;
        let mut names: Vec<String> = versions.keys().cloned().collect();
        names.sort_by(|a, b| match (parse_semver(a), parse_semver(b)) {
            (Some(va), Some(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        });
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        Ok(index
            .get("dist-tags")
            .and_then(|t| t.get("latest"))
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
            .and_then(|v| v.get(version))
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;

        let tarball = entry
            .get("dist")
            .and_then(|d| d.get("tarball"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("npm version entry missing dist.tarball".into()))?;
        let url = Url::parse(tarball)
            .map_err(|e| LoaderError::AdapterError(format!("bad npm tarball url: {e}")))?;
        let filename = url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .map(str::to_string);

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(shasum) = entry.get("dist").and_then(|d| d.get("shasum")).and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Sha1, shasum.to_string());
        }

        let author = entry.get("author").and_then(|a| match a {
            serde_json::Value::String(s) => Some(PersonActor {
                name: Some(s.clone()),
                email: None,
            }),
            serde_json::Value::Object(_) => Some(PersonActor {
                name: a.get("name").and_then(|v| v.as_str()).map(str::to_string),
                email: a.get("email").and_then(|v| v.as_str()).map(str::to_string),
            }),
            _ => None,
        });

        let date = index
            .get("time")
            .and_then(|t| t.get(version))
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums,
            author,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "npm-registry-v1",
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
            message: message::standard_message("npm", &self.package_name(), &info.version),
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
