//! CRAN adapter. CRAN version strings are dotted-numeric but not strict
//! semver (e.g. `1.0-1`), so this adapter documents its own comparator
//! (spec.md §9: "adapters with opaque version strings must provide their
//! own comparator") rather than reaching for the `semver` crate.
//!
//! Index format (this crate's own simplified index, not CRAN's raw
//! `PACKAGES` file): `{"Package": ..., "Latest": ..., "Versions": {
//! "<version>": {"path": ..., "md5sum": ..., "published": ...}}}`.

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, Release, Sha1Git, VisitType};
use std::cmp::Ordering;
use std::path::Path;
use time::{format_description, Date};
use url::Url;

pub struct CranAdapter {
    index_url: Url,
}

impl CranAdapter {
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

/// Split a CRAN version on `.` and `-` into numeric segments, comparing
/// segment by segment; falls back to a lexicographic tiebreak when a
/// segment isn't numeric (e.g. the rare alpha suffix).
fn cran_version_cmp(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<u64> {
        s.split(['.', '-']).filter_map(|part| part.parse().ok()).collect()
    };
    let (sa, sb) = (split(a), split(b));
    match sa.cmp(&sb) {
        Ordering::Equal => a.cmp(b),
        other => other,
    }
}

impl PackageAdapter for CranAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Cran
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let versions = index
            .get("Versions")
            .and_then(|v| v.as_object())
            .ok_or_else(|| LoaderError::AdapterError("CRAN index missing Versions".into()))?;
        let mut names: Vec<String> = versions.keys().cloned().collect();
        names.sort_by(|a, b| cran_version_cmp(a, b));
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        Ok(index.get("Latest").and_then(|v| v.as_str()).map(str::to_string))
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let entry = index
            .get("Versions")
            .and_then(|v| v.get(version))
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;

        let path = entry
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("CRAN version entry missing path".into()))?;
        let url = self
            .index_url
            .join(path)
            .map_err(|e| LoaderError::AdapterError(format!("bad CRAN path: {e}")))?;

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(md5) = entry.get("md5sum").and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Md5, md5.to_string());
        }

        let date = entry
            .get("published")
            .and_then(|v| v.as_str())
            .and_then(|s| {
                let fmt = format_description::parse("[year]-[month]-[day]").ok()?;
                Date::parse(s, &fmt).ok()
            })
            .map(|d| d.midnight().assume_utc());

        let filename = Some(format!("{}_{version}.tar.gz", self.package_name()));

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums,
            author: None,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "cran-v1",
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
            message: message::standard_message("CRAN", &self.package_name(), &info.version),
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
    fn numeric_segments_order_correctly_unlike_lexicographic() {
        let mut versions = vec!["1.9".to_string(), "1.10".to_string(), "1.2".to_string()];
        versions.sort_by(|a, b| cran_version_cmp(a, b));
        assert_eq!(versions, vec!["1.2", "1.9", "1.10"]);
    }

    #[test]
    fn hyphenated_revision_suffix_is_compared_numerically() {
        assert_eq!(cran_version_cmp("1.0-1", "1.0-2"), Ordering::Less);
    }
}
