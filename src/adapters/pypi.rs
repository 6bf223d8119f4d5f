//! PyPI adapter. Index format: `GET https://pypi.org/pypi/<name>/json`
//! returns `{"info": {...}, "releases": {"<version>": [<file>, ...]}}`;
//! one version can have several files (sdist + one wheel per platform),
//! each becoming its own branch (spec.md §6.4).

use super::{branch_name, checksum_or_url_extid, fetch_json, message, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, PersonActor, Release, Sha1Git, VisitType};
use semver::Version;
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct PypiAdapter {
    index_url: Url,
}

impl PypiAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    /// `https://pypi.org/pypi/<name>/json` — the package name is the
    /// second-to-last path segment.
    fn package_name(&self) -> String {
        let segments: Vec<&str> = self.index_url.path_segments().map(Iterator::collect).unwrap_or_default();
        segments
            .len()
            .checked_sub(2)
            .and_then(|i| segments.get(i))
            .copied()
            .unwrap_or("package")
            .to_string()
    }
}

fn try_semver(v: &str) -> Option<Version> {
    Version::parse(v).ok()
}

impl PackageAdapter for PypiAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Pypi
    }

    async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let releases = index
            .get("releases")
            .and_then(|v| v.as_object())
            .ok_or_else(|| LoaderError::AdapterError("pypi index missing releases".into()))?;
        let mut names: Vec<String> = releases
            .iter()
            .filter(|(_, files)| files.as_array().is_some_and(|a| !a.is_empty()))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_by(|a, b| match (try_semver(a), try_semver(b)) {
            (Some(va), Some(vb)) => va.cmp(&vb),
            _ => a.cmp(b),
        });
        Ok(names)
    }

    async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        let index = fetch_json(transport, &self.index_url).await?;
        Ok(index
            .get("info")
            .and_then(|i| i.get("version"))
            .and_then(|v| v.as_str())
            .map(str::to_string))
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        let index = fetch_json(transport, &self.index_url).await?;
        let files = index
            .get("releases")
            .and_then(|r| r.get(version))
            .and_then(|v| v.as_array())
            .ok_or_else(|| LoaderError::NotFound(format!("{} has no version {version}", self.index_url)))?;
        if files.is_empty() {
            return Err(LoaderError::NotFound(format!(
                "{} version {version} has no files",
                self.index_url
            )));
        }

        let author = index.get("info").and_then(|i| {
            let name = i.get("author").and_then(|v| v.as_str()).map(str::to_string);
            let email = i
                .get("author_email")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if name.is_none() && email.is_none() {
                None
            } else {
                Some(PersonActor { name, email })
            }
        });

        let many_files = files.len() > 1;
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            let url_str = file
                .get("url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| LoaderError::AdapterError("pypi file missing url".into()))?;
            let url = Url::parse(url_str)
                .map_err(|e| LoaderError::AdapterError(format!("bad pypi file url: {e}")))?;
            let filename = file
                .get("filename")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            let mut checksums = std::collections::BTreeMap::new();
            if let Some(digests) = file.get("digests") {
                if let Some(sha256) = digests.get("sha256").and_then(|v| v.as_str()) {
                    checksums.insert(DigestAlgo::Sha256, sha256.to_string());
                }
                if let Some(md5) = digests.get("md5").and_then(|v| v.as_str()) {
                    checksums.insert(DigestAlgo::Md5, md5.to_string());
                }
            }

            let date = file
                .get("upload_time_iso_8601")
                .and_then(|v| v.as_str())
                .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

            let branch = branch_name(version, many_files.then(|| filename.as_deref()).flatten());
            out.push((
                branch,
                PackageInfo {
                    url,
                    filename,
                    version: version.to_string(),
                    checksums,
                    author: author.clone(),
                    date,
                    intrinsic_metadata: Some(file.clone()),
                    manifest_format: "pypi-json-v1",
                },
            ));
        }
        Ok(out)
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        _unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        Ok(Some(Release {
            name: info.version.clone(),
            message: message::standard_message("PyPI", &self.package_name(), &info.version),
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
