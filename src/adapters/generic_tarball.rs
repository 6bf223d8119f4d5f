//! Fallback adapter for registries without a bespoke one: arch, archive,
//! bioconductor, conda, debian, golang, hackage, hex, maven, opam,
//! puppet, rpm, rubygems, content, directory. They are heterogeneous in
//! their real wire formats (spec.md §1: "listing every field of every
//! registry is non-goal"), so this adapter standardises on one simple
//! index shape and lets the per-origin `VisitType` only affect labelling
//! (the release message, `ExtID` namespacing via `visit_type`).
//!
//! Index format: `{"name", "versions": {"<version>": {"url", "filename",
//! "sha256", "published"}}}`. Version ordering has no registry-specific
//! comparator (spec.md §9: "where none exists, fall back to
//! lexicographic order").

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, Release, Sha1Git, VisitType};
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct GenericTarballAdapter {
    visit_type: VisitType,
    index_url: Url,
}

impl GenericTarballAdapter {
    #[must_use]
    pub fn new(visit_type: VisitType, index_url: Url) -> Self {
        Self { visit_type, index_url }
    }

    fn package_name(&self) -> String {
        self.index_url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("package")
            .to_string()
    }

    fn registry_label(&self) -> &'static str {
        match self.visit_type {
            VisitType::Arch => "arch",
            VisitType::Archive => "archive",
            VisitType::Bioconductor => "bioconductor",
            VisitType::Conda => "conda",
            VisitType::Debian => "debian",
            VisitType::Golang => "golang",
            VisitType::Hackage => "hackage",
            VisitType::Hex => "hex",
            VisitType::Maven => "maven",
            VisitType::Opam => "opam",
            VisitType::Puppet => "puppet",
            VisitType::Rpm => "rpm",
            VisitType::Rubygems => "rubygems",
            VisitType::Content => "content",
            VisitType::Directory => "directory",
            // The remaining variants all have their own dedicated adapter
            // and never reach this one (see Adapter::for_visit_type).
            _ => "generic",
        }
    }
}

impl PackageAdapter for GenericTarballAdapter {
    fn visit_type(&self) -> VisitType {
        self.visit_type
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let versions = index
            .get("versions")
            .and_then(|v| v.as_object())
            .ok_or_else(|| LoaderError::AdapterError("generic index missing versions".into()))?;
        let mut names: Vec<String> = versions.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        if let Some(latest) = index.get("latest").and_then(|v| v.as_str()) {
            return Ok(Some(latest.to_string()));
        }
        Ok(self.get_versions(transport).await?.into_iter().next_back())
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

        let url_str = entry
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("generic version entry missing url".into()))?;
        let url =
            Url::parse(url_str).map_err(|e| LoaderError::AdapterError(format!("bad generic artifact url: {e}")))?;

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(sha256) = entry.get("sha256").and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Sha256, sha256.to_string());
        }

        let date = entry
            .get("published")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let filename = entry.get("filename").and_then(|v| v.as_str()).map(str::to_string);

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums,
            author: None,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "generic-v1",
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
            message: message::standard_message(self.registry_label(), &self.package_name(), &info.version),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_lexicographic_ordering() {
        let mut versions = vec!["2.0".to_string(), "10.0".to_string(), "1.0".to_string()];
        versions.sort();
        assert_eq!(versions, vec!["1.0", "10.0", "2.0"]);
    }

    #[test]
    fn registry_label_matches_visit_type() {
        let adapter = GenericTarballAdapter::new(VisitType::Debian, Url::parse("https://example.test/p").unwrap());
        assert_eq!(adapter.registry_label(), "debian");
    }
}
