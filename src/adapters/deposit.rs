//! Deposit adapter: origins pushed directly by a depositor (SWORD-style),
//! rather than discovered from a registry index. There is exactly one
//! artifact per visit and it is its own HEAD (spec.md open question 3:
//! "deposit uses HEAD as the only branch").

use super::{checksum_or_url_extid, message, BranchPolicy, ExtidKey, PackageAdapter, PackageInfo};
use crate::error::{LoaderError, Result};
use crate::fetch::Transport;
use crate::model::{DigestAlgo, Release, Sha1Git, VisitType};
use std::path::Path;
use time::OffsetDateTime;
use url::Url;

pub struct DepositAdapter {
    index_url: Url,
}

impl DepositAdapter {
    #[must_use]
    pub fn new(index_url: Url) -> Self {
        Self { index_url }
    }

    fn package_name(&self) -> String {
        self.index_url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .unwrap_or("deposit")
            .to_string()
    }
}

const DEPOSIT_VERSION: &str = "1";

impl PackageAdapter for DepositAdapter {
    fn visit_type(&self) -> VisitType {
        VisitType::Deposit
    }

    fn branch_policy(&self) -> BranchPolicy {
        BranchPolicy::WANTS_HEAD
    }

    fn carries_forward_unchanged_branches(&self) -> bool {
        // A deposit is a one-shot push; there is nothing to carry
        // forward across visits of the same origin.
        false
    }

    async fn get_versions(&self, _transport: &dyn Transport) -> Result<Vec<String>> {
        Ok(vec![DEPOSIT_VERSION.to_string()])
    }

    async fn get_default_version(&self, _transport: &dyn Transport) -> Result<Option<String>> {
        Ok(Some(DEPOSIT_VERSION.to_string()))
    }

    async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        if version != DEPOSIT_VERSION {
            return Err(LoaderError::NotFound(format!("{} has no version {version}", self.index_url)));
        }
        let manifest = super::fetch_json(transport, &self.index_url).await?;

        let archive_url = manifest
            .get("archive_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LoaderError::AdapterError("deposit manifest missing archive_url".into()))?;
        let url = Url::parse(archive_url)
            .map_err(|e| LoaderError::AdapterError(format!("bad deposit archive_url: {e}")))?;

        let mut checksums = std::collections::BTreeMap::new();
        if let Some(sha256) = manifest.get("sha256").and_then(|v| v.as_str()) {
            checksums.insert(DigestAlgo::Sha256, sha256.to_string());
        }

        let date = manifest
            .get("deposited_at")
            .and_then(|v| v.as_str())
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());

        let info = PackageInfo {
            url,
            filename: manifest.get("filename").and_then(|v| v.as_str()).map(str::to_string),
            version: version.to_string(),
            checksums,
            author: None,
            date,
            intrinsic_metadata: Some(manifest.clone()),
            manifest_format: "deposit-v1",
        };
        Ok(vec![(super::branch::HEAD.to_vec(), info)])
    }

    fn build_release(
        &self,
        info: &PackageInfo,
        _unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        Ok(Some(Release {
            name: self.package_name(),
            message: message::standard_message("deposit", &self.package_name(), &info.version),
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
