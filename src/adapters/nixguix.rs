//! Nix/Guix adapter. These origins enumerate a flat list of source URLs
//! (no registry versioning); the branch name is the URL itself rather
//! than a `releases/<version>` path, and there is no HEAD (spec.md open
//! question 3: "Nixguix uses URL-as-branch and may have no HEAD").

use super::{checksum_or_url_extid, message, BranchPolicy, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, Release, Sha1Git, VisitType};
use std::path::Path;
use url::Url;

pub struct NixGuixAdapter {
    index_url: Url,
}

impl NixGuixAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }
}

fn source_entries(index: &serde_json::Value) -> Result<&Vec<serde_json::Value>> {
    index
        .get("sources")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LoaderError::AdapterError("nixguix index missing sources".into()))
}

impl PackageAdapter for NixGuixAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Nixguix
    }

    fn branch_policy(&self) -> BranchPolicy {
        BranchPolicy::NO_HEAD
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = super::fetch_json(transport, &self.index_url).await?;
        let entries = source_entries(&index)?;
        Ok(entries
            .iter()
            .filter_map(|e| e.get("url").and_then(|v| v.as_str()).map(str::to_string))
            .collect())
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        Ok(self.get_versions(transport).await?.into_iter().next())
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = super::fetch_json(transport, &self.index_url).await?;
        let entries = source_entries(&index)?;
        let entry = entries
            .iter()
            .find(|e| e.get("url").and_then(|v| v.as_str()) == Some(version))
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no source {version}", self.index_url)))?;

        let url = Url::parse(version).map_err(|e| LoaderError::AdapterError(format!("bad source url: {e}")))?;

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(sha256) = entry.get("sha256").and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Sha256, sha256.to_string());
        }

        let info = PackageInfo {
            filename: entry.get("filename").and_then(|v| v.as_str()).map(str::to_string),
            version: version.to_string(),
            checksums,
            author: None,
            date: None,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "nixguix-v1",
            url: url.clone(),
        };
        // The URL itself is the branch name; no releases/<version> prefix.
        Ok(vec![(url.to_string().into_bytes(), info)])
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        _unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        Ok(Some(Release {
            name: info.url.to_string(),
            message: message::standard_message("nixguix", &info.url.to_string(), &info.version),
            author: None,
            date: None,
            target_id: directory_id,
            synthetic: true,
        }))
    }

    fn known_artifact_to_extid(&self, info: &PackageInfo) -> Option<ExtidKey> {
        checksum_or_url_extid(info)
    }
}
