//! pub.dev adapter. Index format:
//! `GET https://pub.dev/api/packages/<name>` returns
//! `{"name": ..., "latest": {...}, "versions": [{"version", "archive_url",
//! "published", "pubspec": {"author"|"authors"}}]}`.

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{PersonActor, Release, Sha1Git, VisitType};
use semver::Version;
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct PubDevAdapter {
    index_url: Url,
}

impl PubDevAdapter {
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

fn find_version<'a>(index: &'a serde_json::Value, version: &str) -> Option<&'a serde_json::Value> {
    index
        .get("versions")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.iter().find(|v| v.get("version").and_then(|n| n.as_str()) == Some(version)))
}

fn pubspec_author(entry: &serde_json::Value) -> Option<PersonActor> {
    let pubspec = entry.get("pubspec")?;
    if let Some(author) = pubspec.get("author").and_then(|v| v.as_str()) {
        return Some(PersonActor { name: Some(author.to_string()), email: None });
    }
    pubspec
        .get("authors")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.as_str())
        .map(|author| PersonActor { name: Some(author.to_string()), email: None })
}

impl PackageAdapter for PubDevAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Pubdev
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let versions = index
            .get("versions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LoaderError::AdapterError("pub.dev index missing versions".into()))?;
        let mut names: Vec<String> = versions
            .iter()
            .filter_map(|v| v.get("version").and_then(|n| n.as_str()).map(str::to_string))
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
            .get("latest")
            .and_then(|l| l.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let entry = find_version(&index, version)
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;

        let archive_url = entry
            .get("archive_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("pub.dev version missing archive_url".into()))?;
        let url = Url::parse(archive_url)
            .map_err(|e| LoaderError::AdapterError(format!("bad pub.dev archive_url: {e}")))?;

        let author = pubspec_author(entry);

        let date = entry
            .get("published")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let filename = Some(format!("{}-{version}.tar.gz", self.package_name()));

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums: std::collections::BTreeMap::new(),
            author,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "pubdev-v1",
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
            message: message::standard_message("pub.dev", &self.package_name(), &info.version),
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
    fn builds_exact_bezier_message() {
        let msg = message::standard_message("pub.dev", "bezier", "1.1.5");
        assert_eq!(
            String::from_utf8(msg).unwrap(),
            "Synthetic release for pub.dev source package bezier version 1.1.5\n"
        );
    }

    #[test]
    fn reads_single_string_author() {
        let entry = serde_json::json!({"pubspec": {"author": "Alex Li <alex@example.test>"}});
        let actor = pubspec_author(&entry).unwrap();
        assert_eq!(actor.name.as_deref(), Some("Alex Li <alex@example.test>"));
    }

    #[test]
    fn reads_first_of_authors_array() {
        let entry = serde_json::json!({"pubspec": {"authors": ["First <a@example.test>", "Second <b@example.test>"]}});
        let actor = pubspec_author(&entry).unwrap();
        assert_eq!(actor.name.as_deref(), Some("First <a@example.test>"));
    }
}
