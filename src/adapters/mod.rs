//! Per-registry adapter contract (C5, spec.md §4.5/§6.2): a closed sum
//! type over concrete adapters, not a dynamic plugin registry (spec.md §9
//! DESIGN NOTES — "avoid a dynamic plugin registry inside the core's hot
//! path; registration happens once at startup").
//!
//! The trait itself is grounded on `package_managers/traits.rs`'s
//! `PackageManager` — native `async fn` in a trait (Rust 2024), no
//! `async_trait` macro, same as the teacher. `Adapter` plays the role the
//! teacher's `package_managers/mod.rs` feature-gated match plays, but as a
//! plain enum instead of a registry keyed by string name, since the set of
//! registered adapters is closed (spec.md §6.6).

mod aur;
mod branch;
mod cpan;
mod cran;
mod crates_io;
mod deposit;
mod generic_tarball;
mod message;
mod nixguix;
mod npm;
mod pubdev;
mod pypi;

pub use branch::branch_name;
pub use message::standard_message;

use crate::error::Result;
use crate::fetch::Transport;
use crate::model::{DigestAlgo, PersonActor, Release, Sha1Git, VisitType};
use std::collections::BTreeMap;
use std::path::Path;
use time::OffsetDateTime;

/// One downloadable artifact plus everything an adapter knows about it
/// ahead of fetching (spec.md §4.5). `manifest_format` names the schema
/// the adapter used to derive this record (e.g. `"npm-registry-v1"`),
/// used to build a stable `ExtID` when the registry provides no checksum.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub url: url::Url,
    pub filename: Option<String>,
    pub version: String,
    pub checksums: BTreeMap<DigestAlgo, String>,
    pub author: Option<PersonActor>,
    pub date: Option<OffsetDateTime>,
    pub intrinsic_metadata: Option<serde_json::Value>,
    pub manifest_format: &'static str,
}

/// Adapter policy on whether a `HEAD` alias branch should be synthesised
/// (Open Question 3, see DESIGN.md): most registries have an obvious
/// "latest" version and want `HEAD`; `nixguix` has none.
#[derive(Debug, Clone, Copy)]
pub struct BranchPolicy {
    pub wants_head: bool,
}

impl BranchPolicy {
    pub const WANTS_HEAD: Self = Self { wants_head: true };
    pub const NO_HEAD: Self = Self { wants_head: false };
}

/// The capability set every per-registry adapter implements (spec.md
/// §4.5). `known_artifact_to_extid` is pure and synchronous — it's a
/// function of already-available data, not a network call.
pub trait PackageAdapter: Send + Sync {
    fn visit_type(&self) -> VisitType;

    fn branch_policy(&self) -> BranchPolicy {
        BranchPolicy::WANTS_HEAD
    }

    /// Whether the orchestrator may reuse a previous visit's branch
    /// unchanged when the adapter reports the same ExtID for it (Open
    /// Question 1, see DESIGN.md). Registries that re-publish artifacts
    /// under a version without changing content (most of them) opt in.
    fn carries_forward_unchanged_branches(&self) -> bool {
        true
    }

    fn get_versions(
        &self,
        transport: &dyn Transport,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn get_default_version(
        &self,
        transport: &dyn Transport,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> impl Future<Output = Result<Vec<(Vec<u8>, PackageInfo)>>> + Send;

    /// Assemble a Release for one branch's artifact, now that it's been
    /// unpacked and content-addressed. Returning `Ok(None)` means the
    /// adapter declines to synthesise a release for this artifact (rare;
    /// no registered adapter currently does this, but the contract allows
    /// it for e.g. metadata-only artifacts).
    fn build_release(
        &self,
        info: &PackageInfo,
        unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>>;

    /// How to recognise a previously ingested artifact (spec.md §4.4/§4.6):
    /// prefer a declared checksum, fall back to the artifact URL so every
    /// adapter can still short-circuit even when the registry publishes no
    /// digest. Returns the lookup key only — the orchestrator fills in
    /// `target_type`/`target_id` once the artifact's Directory id is known
    /// (either freshly computed, or resolved from the store for a
    /// previously-ingested artifact).
    fn known_artifact_to_extid(&self, info: &PackageInfo) -> Option<ExtidKey>;
}

/// Lookup key half of an `ExtID` (spec.md §3): `(extid_type, extid)`
/// without the `target_id`, which isn't known until the artifact has
/// actually been staged or resolved from a prior visit.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtidKey {
    pub extid_type: String,
    pub extid: Vec<u8>,
}

/// Fetch and parse a registry index endpoint as JSON. Every JSON-backed
/// adapter (npm, pypi, crates.io, pub.dev) goes through this rather than
/// rolling its own GET, so a single place maps transport-level non-2xx
/// statuses to `NotFound`/`AdapterError`.
pub(crate) async fn fetch_json(
    transport: &dyn Transport,
    url: &url::Url,
) -> Result<serde_json::Value> {
    use crate::error::LoaderError;
    let response = transport.fetch(url).await?;
    if response.status == 404 {
        return Err(LoaderError::NotFound(url.to_string()));
    }
    if !(200..300).contains(&response.status) {
        return Err(LoaderError::AdapterError(format!(
            "registry index request failed for {url}: http {}",
            response.status
        )));
    }
    serde_json::from_slice(&response.body)
        .map_err(|e| LoaderError::AdapterError(format!("bad registry JSON from {url}: {e}")))
}

/// Build the standard checksum-or-url `ExtidKey` every adapter without a
/// bespoke fingerprinting rule can reuse directly.
pub(crate) fn checksum_or_url_extid(info: &PackageInfo) -> Option<ExtidKey> {
    if let Some(sha256) = info.checksums.get(&DigestAlgo::Sha256) {
        return Some(ExtidKey {
            extid_type: format!("{}-sha256", info.manifest_format),
            extid: sha256.as_bytes().to_vec(),
        });
    }
    Some(ExtidKey {
        extid_type: format!("{}-url", info.manifest_format),
        extid: info.url.to_string().into_bytes(),
    })
}

pub use aur::AurAdapter;
pub use cpan::CpanAdapter;
pub use cran::CranAdapter;
pub use crates_io::CratesIoAdapter;
pub use deposit::DepositAdapter;
pub use generic_tarball::GenericTarballAdapter;
pub use nixguix::NixGuixAdapter;
pub use npm::NpmAdapter;
pub use pubdev::PubDevAdapter;
pub use pypi::PypiAdapter;

/// Closed sum type over every registered adapter (spec.md §9: "implemented
/// as a sum over a closed set of adapter types"). The orchestrator matches
/// on `VisitType` to pick a variant once, at visit start; there is no
/// runtime plugin lookup.
pub enum Adapter {
    Npm(NpmAdapter),
    Pypi(PypiAdapter),
    CratesIo(CratesIoAdapter),
    Cran(CranAdapter),
    Cpan(CpanAdapter),
    PubDev(PubDevAdapter),
    Aur(AurAdapter),
    Deposit(DepositAdapter),
    NixGuix(NixGuixAdapter),
    Generic(GenericTarballAdapter),
}

impl Adapter {
    #[must_use]
    pub fn for_visit_type(visit_type: VisitType, origin_url: url::Url) -> Self {
        match visit_type {
            VisitType::Npm => Adapter::Npm(NpmAdapter::new(origin_url)),
            VisitType::Pypi => Adapter::Pypi(PypiAdapter::new(origin_url)),
            VisitType::Crates => Adapter::CratesIo(CratesIoAdapter::new(origin_url)),
            VisitType::Cran => Adapter::Cran(CranAdapter::new(origin_url)),
            VisitType::Cpan => Adapter::Cpan(CpanAdapter::new(origin_url)),
            VisitType::Pubdev => Adapter::PubDev(PubDevAdapter::new(origin_url)),
            VisitType::Aur => Adapter::Aur(AurAdapter::new(origin_url)),
            VisitType::Deposit => Adapter::Deposit(DepositAdapter::new(origin_url)),
            VisitType::Nixguix => Adapter::NixGuix(NixGuixAdapter::new(origin_url)),
            other => Adapter::Generic(GenericTarballAdapter::new(other, origin_url)),
        }
    }

    pub fn visit_type(&self) -> VisitType {
        match self {
            Adapter::Npm(a) => a.visit_type(),
            Adapter::Pypi(a) => a.visit_type(),
            Adapter::CratesIo(a) => a.visit_type(),
            Adapter::Cran(a) => a.visit_type(),
            Adapter::Cpan(a) => a.visit_type(),
            Adapter::PubDev(a) => a.visit_type(),
            Adapter::Aur(a) => a.visit_type(),
            Adapter::Deposit(a) => a.visit_type(),
            Adapter::NixGuix(a) => a.visit_type(),
            Adapter::Generic(a) => a.visit_type(),
        }
    }

    pub fn branch_policy(&self) -> BranchPolicy {
        match self {
            Adapter::Npm(a) => a.branch_policy(),
            Adapter::Pypi(a) => a.branch_policy(),
            Adapter::CratesIo(a) => a.branch_policy(),
            Adapter::Cran(a) => a.branch_policy(),
            Adapter::Cpan(a) => a.branch_policy(),
            Adapter::PubDev(a) => a.branch_policy(),
            Adapter::Aur(a) => a.branch_policy(),
            Adapter::Deposit(a) => a.branch_policy(),
            Adapter::NixGuix(a) => a.branch_policy(),
            Adapter::Generic(a) => a.branch_policy(),
        }
    }

    pub fn carries_forward_unchanged_branches(&self) -> bool {
        match self {
            Adapter::Npm(a) => a.carries_forward_unchanged_branches(),
            Adapter::Pypi(a) => a.carries_forward_unchanged_branches(),
            Adapter::CratesIo(a) => a.carries_forward_unchanged_branches(),
            Adapter::Cran(a) => a.carries_forward_unchanged_branches(),
            Adapter::Cpan(a) => a.carries_forward_unchanged_branches(),
            Adapter::PubDev(a) => a.carries_forward_unchanged_branches(),
            Adapter::Aur(a) => a.carries_forward_unchanged_branches(),
            Adapter::Deposit(a) => a.carries_forward_unchanged_branches(),
            Adapter::NixGuix(a) => a.carries_forward_unchanged_branches(),
            Adapter::Generic(a) => a.carries_forward_unchanged_branches(),
        }
    }

    pub async fn get_versions(&self, transport: &dyn Transport) -> Result<Vec<String>> {
        match self {
            Adapter::Npm(a) => a.get_versions(transport).await,
            Adapter::Pypi(a) => a.get_versions(transport).await,
            Adapter::CratesIo(a) => a.get_versions(transport).await,
            Adapter::Cran(a) => a.get_versions(transport).await,
            Adapter::Cpan(a) => a.get_versions(transport).await,
            Adapter::PubDev(a) => a.get_versions(transport).await,
            Adapter::Aur(a) => a.get_versions(transport).await,
            Adapter::Deposit(a) => a.get_versions(transport).await,
            Adapter::NixGuix(a) => a.get_versions(transport).await,
            Adapter::Generic(a) => a.get_versions(transport).await,
        }
    }

    pub async fn get_default_version(&self, transport: &dyn Transport) -> Result<Option<String>> {
        match self {
            Adapter::Npm(a) => a.get_default_version(transport).await,
            Adapter::Pypi(a) => a.get_default_version(transport).await,
            Adapter::CratesIo(a) => a.get_default_version(transport).await,
            Adapter::Cran(a) => a.get_default_version(transport).await,
            Adapter::Cpan(a) => a.get_default_version(transport).await,
            Adapter::PubDev(a) => a.get_default_version(transport).await,
            Adapter::Aur(a) => a.get_default_version(transport).await,
            Adapter::Deposit(a) => a.get_default_version(transport).await,
            Adapter::NixGuix(a) => a.get_default_version(transport).await,
            Adapter::Generic(a) => a.get_default_version(transport).await,
        }
    }

    pub async fn get_package_info(
        &self,
        transport: &dyn Transport,
        version: &str,
    ) -> Result<Vec<(Vec<u8>, PackageInfo)>> {
        match self {
            Adapter::Npm(a) => a.get_package_info(transport, version).await,
            Adapter::Pypi(a) => a.get_package_info(transport, version).await,
            Adapter::CratesIo(a) => a.get_package_info(transport, version).await,
            Adapter::Cran(a) => a.get_package_info(transport, version).await,
            Adapter::Cpan(a) => a.get_package_info(transport, version).await,
            Adapter::PubDev(a) => a.get_package_info(transport, version).await,
            Adapter::Aur(a) => a.get_package_info(transport, version).await,
            Adapter::Deposit(a) => a.get_package_info(transport, version).await,
            Adapter::NixGuix(a) => a.get_package_info(transport, version).await,
            Adapter::Generic(a) => a.get_package_info(transport, version).await,
        }
    }

    pub fn build_release(
        &self,
        info: &PackageInfo,
        unpacked_dir: &Path,
        directory_id: Sha1Git,
    ) -> Result<Option<Release>> {
        match self {
            Adapter::Npm(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Pypi(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::CratesIo(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Cran(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Cpan(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::PubDev(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Aur(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Deposit(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::NixGuix(a) => a.build_release(info, unpacked_dir, directory_id),
            Adapter::Generic(a) => a.build_release(info, unpacked_dir, directory_id),
        }
    }

    pub fn known_artifact_to_extid(&self, info: &PackageInfo) -> Option<ExtidKey> {
        match self {
            Adapter::Npm(a) => a.known_artifact_to_extid(info),
            Adapter::Pypi(a) => a.known_artifact_to_extid(info),
            Adapter::CratesIo(a) => a.known_artifact_to_extid(info),
            Adapter::Cran(a) => a.known_artifact_to_extid(info),
            Adapter::Cpan(a) => a.known_artifact_to_extid(info),
            Adapter::PubDev(a) => a.known_artifact_to_extid(info),
            Adapter::Aur(a) => a.known_artifact_to_extid(info),
            Adapter::Deposit(a) => a.known_artifact_to_extid(info),
            Adapter::NixGuix(a) => a.known_artifact_to_extid(info),
            Adapter::Generic(a) => a.known_artifact_to_extid(info),
        }
    }
}
