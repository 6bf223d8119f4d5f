//! Data model (spec.md §3): Origin, OriginVisit, Content, Directory,
//! Release, Snapshot, ExtID and the supporting value types.
//!
//! Every id in this module is reproducible from the object's canonical
//! serialisation (invariant 1) — ids are computed by the `hash` module,
//! never stored as a separate random field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;
use url::Url;

/// A 20-byte digest (sha1 / sha1-git scheme), used as the id of every
/// Directory, Release and Snapshot, and as one of Content's four digests.
pub type Sha1Git = [u8; 20];

/// Render a digest as lowercase hex, matching the teacher's `hex` usage
/// for digest display.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Stable upstream identity of a package (spec.md §3 Origin).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    pub url: Url,
}

impl Origin {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// Closed enumeration of registered adapter names (spec.md §6.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitType {
    Arch,
    Archive,
    Aur,
    Bioconductor,
    Conda,
    Cpan,
    Cran,
    Crates,
    Debian,
    Deposit,
    Golang,
    Hackage,
    Hex,
    Maven,
    Npm,
    Opam,
    Pubdev,
    Puppet,
    Pypi,
    Rpm,
    Rubygems,
    Nixguix,
    Content,
    Directory,
}

impl VisitType {
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Arch,
            Self::Archive,
            Self::Aur,
            Self::Bioconductor,
            Self::Conda,
            Self::Cpan,
            Self::Cran,
            Self::Crates,
            Self::Debian,
            Self::Deposit,
            Self::Golang,
            Self::Hackage,
            Self::Hex,
            Self::Maven,
            Self::Npm,
            Self::Opam,
            Self::Pubdev,
            Self::Puppet,
            Self::Pypi,
            Self::Rpm,
            Self::Rubygems,
            Self::Nixguix,
            Self::Content,
            Self::Directory,
        ]
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Arch => "arch",
            Self::Archive => "archive",
            Self::Aur => "aur",
            Self::Bioconductor => "bioconductor",
            Self::Conda => "conda",
            Self::Cpan => "cpan",
            Self::Cran => "cran",
            Self::Crates => "crates",
            Self::Debian => "debian",
            Self::Deposit => "deposit",
            Self::Golang => "golang",
            Self::Hackage => "hackage",
            Self::Hex => "hex",
            Self::Maven => "maven",
            Self::Npm => "npm",
            Self::Opam => "opam",
            Self::Pubdev => "pubdev",
            Self::Puppet => "puppet",
            Self::Pypi => "pypi",
            Self::Rpm => "rpm",
            Self::Rubygems => "rubygems",
            Self::Nixguix => "nixguix",
            Self::Content => "content",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VisitType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown visit type: {s}"))
    }
}

/// OriginVisit terminal/non-terminal lifecycle states (spec.md §4.7).
///
/// `created -> ongoing -> {full, partial, failed, not_found}` exactly once;
/// the terminal status, once written, is never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Created,
    Ongoing,
    Full,
    Partial,
    Failed,
    NotFound,
}

impl VisitStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Full | Self::Partial | Self::Failed | Self::NotFound
        )
    }
}

/// One ingestion attempt for an origin (spec.md §3 OriginVisit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginVisit {
    pub origin: Url,
    pub visit_id: u64,
    pub visit_type: VisitType,
    pub started_at: OffsetDateTime,
}

/// A status update written against an `OriginVisit` (the store's
/// `origin_visit_status_add`, spec.md §6.1). Written strictly after the
/// Snapshot it references (spec.md §5 ordering guarantees).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginVisitStatus {
    pub origin: Url,
    pub visit_id: u64,
    pub date: OffsetDateTime,
    pub status: VisitStatus,
    pub snapshot_id: Option<Sha1Git>,
}

/// Digest algorithms an `ArtifactDescriptor` may carry declared values for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgo {
    Sha1,
    Sha256,
    Md5,
}

/// A single downloadable artifact for a version, as produced by an adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub url: Url,
    pub filename: Option<String>,
    pub digests: BTreeMap<DigestAlgo, String>,
    pub length: Option<u64>,
    pub mtime: Option<OffsetDateTime>,
}

impl ArtifactDescriptor {
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            filename: None,
            digests: BTreeMap::new(),
            length: None,
            mtime: None,
        }
    }
}

/// Logical version with its artifacts, as produced by an adapter's version
/// listing (spec.md §3 VersionDescriptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub version: String,
    pub artifacts: Vec<ArtifactDescriptor>,
    pub intrinsic_metadata: Option<serde_json::Value>,
}

/// A file's bytes identified by four parallel digests plus length
/// (spec.md §3 Content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub length: u64,
    pub sha1: [u8; 20],
    pub sha1_git: Sha1Git,
    pub sha256: [u8; 32],
    pub blake2s256: [u8; 32],
}

impl Content {
    #[must_use]
    pub fn id(&self) -> Sha1Git {
        self.sha1_git
    }
}

/// Kind of a Directory entry's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl EntryKind {
    /// Octal permission triple used in the entry's canonical encoding
    /// (spec.md §6.3): 0o644 regular, 0o755 executable, 0o120000 symlink,
    /// 0o040000 directory.
    #[must_use]
    pub const fn default_perms(self, executable: bool) -> u32 {
        match self {
            Self::File if executable => 0o100_755,
            Self::File => 0o100_644,
            Self::Dir => 0o040_000,
            Self::Symlink => 0o120_000,
        }
    }
}

/// One named entry inside a Directory (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: Vec<u8>,
    pub perms: u32,
    pub kind: EntryKind,
    pub target_id: Sha1Git,
}

/// Ordered set of entries, canonicalised by sorting on name
/// (spec.md §3 invariant 2).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    /// Build a Directory from entries, sorting them by name and rejecting
    /// duplicate names (invariant 2).
    pub fn new(mut entries: Vec<DirEntry>) -> crate::error::Result<Self> {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        for pair in entries.windows(2) {
            if pair[0].name == pair[1].name {
                return Err(crate::error::LoaderError::AdapterError(format!(
                    "duplicate directory entry name: {:?}",
                    String::from_utf8_lossy(&pair[0].name)
                )));
            }
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Author/committer-shaped actor backing a Release's `author` field. A
/// representational supplement over a bare string (SPEC_FULL.md §3) — the
/// Release semantics of spec.md §3/§6.3 are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonActor {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl fmt::Display for PersonActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => write!(f, "{name} <{email}>"),
            (Some(name), None) => write!(f, "{name}"),
            (None, Some(email)) => write!(f, "<{email}>"),
            (None, None) => Ok(()),
        }
    }
}

/// Synthetic commit-like object wrapping a directory tree
/// (spec.md §3 Release).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub message: Vec<u8>,
    pub author: Option<PersonActor>,
    pub date: Option<OffsetDateTime>,
    pub target_id: Sha1Git,
    pub synthetic: bool,
}

/// What a Snapshot branch points to (spec.md §3 Snapshot,
/// target_type ∈ {release, alias, revision}).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchTarget {
    Release(Sha1Git),
    Revision(Sha1Git),
    /// An alias points to another branch by name, not by object id.
    Alias(Vec<u8>),
}

impl BranchTarget {
    /// Single-byte tag used in the canonical snapshot serialisation
    /// (spec.md §6.3).
    #[must_use]
    pub const fn tag_byte(&self) -> u8 {
        match self {
            Self::Release(_) => b'R',
            Self::Revision(_) => b'V',
            Self::Alias(_) => b'A',
        }
    }
}

/// Immutable mapping from branch name to target (spec.md §3 Snapshot).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub branches: BTreeMap<Vec<u8>, BranchTarget>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a branch, raising on a name collision rather than silently
    /// overwriting (spec.md §4.6 tie-break: last-writer-wins is forbidden).
    pub fn insert(&mut self, name: Vec<u8>, target: BranchTarget) -> crate::error::Result<()> {
        if self.branches.contains_key(&name) {
            return Err(crate::error::LoaderError::AdapterError(format!(
                "branch name collision: {:?}",
                String::from_utf8_lossy(&name)
            )));
        }
        self.branches.insert(name, target);
        Ok(())
    }
}

/// Kind of object an ExtID resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtidTargetType {
    Directory,
    Release,
}

/// An external fingerprint mapped to a previously ingested target
/// (spec.md §3 ExtID), used to short-circuit known artifacts across visits.
/// Additive only: once written, never rewritten (invariant 5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtID {
    pub extid_type: String,
    pub extid_version: u32,
    pub extid: Vec<u8>,
    pub target_type: ExtidTargetType,
    pub target_id: Sha1Git,
}
