//! CPAN adapter. Index format (this crate's own simplified index):
//! `{"distribution": ..., "releases": {"<version>": {"archive", "download_url",
//! "date"}}}`. Author is *intrinsic* metadata (spec.md §6.5): it's read
//! from `META.json`/`META.yml` inside the unpacked tarball, not from the
//! registry index — scenario 4 in spec.md §8 has one tarball carry each
//! format, so both must be supported.

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{PersonActor, Release, Sha1Git, VisitType};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use url::Url;

pub struct CpanAdapter {
    index_url: Url,
}

impl CpanAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    fn distribution_name(&self, index: &serde_json::Value) -> String {
        index
            .get("distribution")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| "distribution".to_string())
    }
}

fn cpan_version_cmp(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<u64> { s.split(['.', '_']).filter_map(|p| p.parse().ok()).collect() };
    match split(a).cmp(&split(b)) {
        Ordering::Equal => a.cmp(b),
        other => other,
    }
}

fn find_meta_file(dir: &Path) -> Option<PathBuf> {
    for candidate in ["META.json", "META.yml"] {
        let direct = dir.join(candidate);
        if direct.is_file() {
            return Some(direct);
        }
    }
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            for candidate in ["META.json", "META.yml"] {
                let nested = path.join(candidate);
                if nested.is_file() {
                    return Some(nested);
                }
            }
        }
    }
    None
}

fn parse_author_line(s: &str) -> PersonActor {
    if let (Some(start), Some(end)) = (s.find('<'), s.find('>')) {
        let name = s[..start].trim();
        let email = s[start + 1..end].trim();
        return PersonActor {
            name: (!name.is_empty()).then(|| name.to_string()),
            email: Some(email.to_string()),
        };
    }
    PersonActor {
        name: Some(s.trim().to_string()),
        email: None,
    }
}

/// Read the first declared author out of `META.json` or `META.yml`,
/// whichever is present (spec.md §8 scenario 4: one intrinsic-metadata
/// format per tarball in practice, but a distribution's releases may mix
/// both over time).
fn read_intrinsic_author(unpacked_dir: &Path) -> Option<PersonActor> {
    let meta_path = find_meta_file(unpacked_dir)?;
    let contents = std::fs::read_to_string(&meta_path).ok()?;
    let is_json = meta_path.extension().and_then(|e| e.to_str()) == Some("json");

    let authors: Vec<String> = if is_json {
        let value: serde_json::Value = serde_json::from_str(&contents).ok()?;
        extract_author_strings_json(&value)
    } else {
        let value: serde_yaml::Value = serde_yaml::from_str(&contents).ok()?;
        extract_author_strings_yaml(&value)
    };

    authors.first().map(|s| parse_author_line(s))
}

fn extract_author_strings_json(value: &serde_json::Value) -> Vec<String> {
    match value.get("author") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => {
            items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
        }
        _ => Vec::new(),
    }
}

fn extract_author_strings_yaml(value: &serde_yaml::Value) -> Vec<String> {
    match value.get("author") {
        Some(serde_yaml::Value::String(s)) => vec![s.clone()],
        Some(serde_yaml::Value::Sequence(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

impl PackageAdapter for CpanAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Cpan
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let releases = index
            .get("releases")
            .and_then(|v| v.as_object())
            .ok_or_else(|| LoaderError::AdapterError("CPAN index missing releases".into()))?;
        let mut names: Vec<String> = releases.keys().cloned().collect();
        names.sort_by(|a, b| cpan_version_cmp(a, b));
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let versions = self.get_versions(transport).await?;
        Ok(versions.last().cloned())
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let entry = index
            .get("releases")
            .and_then(|r| r.get(version))
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;

        let download_url = entry
            .get("download_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("CPAN release missing download_url".into()))?;
        let url = Url::parse(download_url)
            .map_err(|e| LoaderError::AdapterError(format!("bad CPAN download_url: {e}")))?;
        let filename = entry.get("archive").and_then(|v| v.as_str()).map(str::to_string);

        let date = entry
            .get("date")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let info = PackageInfo {
            url,
            filename,
            version: version.to_string(),
            checksums: std::collections::BTreeMap::new(),
            author: None,
            date,
            intrinsic_metadata: Some(entry.clone()),
            manifest_format: "cpan-v1",
        };
        Ok(vec![(branch_name(version, None), info)])
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        // Distribution name is carried in intrinsic_metadata's originating
        // index fetch, but build_release only sees this one artifact's
        // PackageInfo; fall back to the archive filename's stem.
        let name = info
            .filename
            .as_deref()
            .and_then(|f| f.strip_suffix(".tar.gz"))
            .map(|f| f.trim_end_matches(&format!("-{}", info.version)).to_string())
            .unwrap_or_else(|| "distribution".to_string());

        Ok(Some(Release {
            name: info.version.clone(),
            message: message::standard_message("CPAN", &name, &info.version),
            author: read_intrinsic_author(unpacked_dir),
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
    fn parses_author_with_angle_bracket_email() {
        let actor = parse_author_line("Jane Doe <jane@example.test>");
        assert_eq!(actor.name.as_deref(), Some("Jane Doe"));
        assert_eq!(actor.email.as_deref(), Some("jane@example.test"));
    }

    #[test]
    fn reads_author_from_meta_json() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("META.json"),
            r#"{"author": ["Jane Doe <jane@example.test>"]}"#,
        )
        .unwrap();
        let actor = read_intrinsic_author(tmp.path()).unwrap();
        assert_eq!(actor.email.as_deref(), Some("jane@example.test"));
    }

    #[test]
    fn reads_author_from_meta_yml() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("META.yml"),
            "author:\n  - Jane Doe <jane@example.test>\n",
        )
        .unwrap();
        let actor = read_intrinsic_author(tmp.path()).unwrap();
        assert_eq!(actor.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn distribution_name_helper_falls_back_gracefully() {
        let index = serde_json::json!({});
        let adapter = CpanAdapter::new(Url::parse("https://example.test/dist").unwrap());
        assert_eq!(adapter.distribution_name(&index), "distribution");
    }
}
