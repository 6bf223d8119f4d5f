//! `ObjectStore` (spec.md §6.1): the external collaborator the orchestrator
//! writes objects to. Grounded on `core/database.rs`'s thin
//! wrapper-around-an-external-backend shape, generalised to an abstract
//! trait since the real backend (whatever database backs the object graph)
//! is outside this crate's scope — this crate only needs the contract and
//! a test double to exercise the staging/orchestrator logic against.

use crate::error::Result;
use crate::model::{
    Content, Directory, ExtID, ExtidTargetType, Origin, OriginVisit, OriginVisitStatus, Release,
    Sha1Git, Snapshot, VisitStatus,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// All writes are idempotent on object id (spec.md §6.1: "All adds are
/// idempotent on object id").
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn content_add(&self, batch: &[Content]) -> Result<()>;
    async fn directory_add(&self, batch: &[(Sha1Git, Directory)]) -> Result<()>;
    async fn release_add(&self, batch: &[(Sha1Git, Release)]) -> Result<()>;
    async fn snapshot_add(&self, id: Sha1Git, snapshot: &Snapshot) -> Result<()>;
    async fn extid_add(&self, batch: &[ExtID]) -> Result<()>;

    async fn origin_add(&self, origin: &Origin) -> Result<()>;
    async fn origin_visit_add(&self, visit: &OriginVisit) -> Result<()>;
    async fn origin_visit_status_add(&self, status: &OriginVisitStatus) -> Result<()>;

    /// Latest snapshot for `origin` whose visit status is one of
    /// `allowed_statuses`, used to seed incremental/carry-forward loads.
    async fn snapshot_get_latest(
        &self,
        origin: &Origin,
        allowed_statuses: &[VisitStatus],
    ) -> Result<Option<(Sha1Git, Snapshot)>>;

    /// Resolve a batch of external fingerprints to previously stored
    /// targets, used to short-circuit known artifacts (spec.md §4.4/§4.6).
    async fn extid_get_from_extid(
        &self,
        extid_type: &str,
        ids: &[Vec<u8>],
    ) -> Result<Vec<Option<ExtID>>>;
}

/// In-memory `ObjectStore`, used by tests and by any harness driving the
/// orchestrator without a real backend. Enforces the idempotent-on-id
/// contract by keying every table on the object's id and silently
/// accepting re-adds of an id already present (spec.md §6.1).
#[derive(Default)]
pub struct InMemoryStore {
    inner: parking_lot::Mutex<InMemoryTables>,
}

#[derive(Default)]
struct InMemoryTables {
    contents: HashMap<Sha1Git, Content>,
    directories: HashMap<Sha1Git, Directory>,
    releases: HashMap<Sha1Git, Release>,
    snapshots: HashMap<Sha1Git, Snapshot>,
    extids: HashMap<(String, Vec<u8>), ExtID>,
    origins: HashMap<String, Origin>,
    visits: Vec<OriginVisit>,
    /// Visit statuses in insertion order, per origin, most recent last.
    visit_statuses: HashMap<String, Vec<OriginVisitStatus>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/debug helper: total object count across every table.
    #[must_use]
    pub fn object_count(&self) -> usize {
        let t = self.inner.lock();
        t.contents.len() + t.directories.len() + t.releases.len() + t.snapshots.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn content_add(&self, batch: &[Content]) -> Result<()> {
        let mut t = self.inner.lock();
        for content in batch {
            t.contents.entry(content.id()).or_insert_with(|| content.clone());
        }
        Ok(())
    }

    async fn directory_add(&self, batch: &[(Sha1Git, Directory)]) -> Result<()> {
        let mut t = self.inner.lock();
        for (id, dir) in batch {
            t.directories.entry(*id).or_insert_with(|| dir.clone());
        }
        Ok(())
    }

    async fn release_add(&self, batch: &[(Sha1Git, Release)]) -> Result<()> {
        let mut t = self.inner.lock();
        for (id, release) in batch {
            t.releases.entry(*id).or_insert_with(|| release.clone());
        }
        Ok(())
    }

    async fn snapshot_add(&self, id: Sha1Git, snapshot: &Snapshot) -> Result<()> {
        let mut t = self.inner.lock();
        t.snapshots.entry(id).or_insert_with(|| snapshot.clone());
        Ok(())
    }

    async fn extid_add(&self, batch: &[ExtID]) -> Result<()> {
        let mut t = self.inner.lock();
        for extid in batch {
            t.extids
                .entry((extid.extid_type.clone(), extid.extid.clone()))
                .or_insert_with(|| extid.clone());
        }
        Ok(())
    }

    async fn origin_add(&self, origin: &Origin) -> Result<()> {
        let mut t = self.inner.lock();
        t.origins
            .entry(origin.url.to_string())
            .or_insert_with(|| origin.clone());
        Ok(())
    }

    async fn origin_visit_add(&self, visit: &OriginVisit) -> Result<()> {
        let mut t = self.inner.lock();
        t.visits.push(visit.clone());
        Ok(())
    }

    async fn origin_visit_status_add(&self, status: &OriginVisitStatus) -> Result<()> {
        let mut t = self.inner.lock();
        t.visit_statuses
            .entry(status.origin.to_string())
            .or_default()
            .push(status.clone());
        Ok(())
    }

    async fn snapshot_get_latest(
        &self,
        origin: &Origin,
        allowed_statuses: &[VisitStatus],
    ) -> Result<Option<(Sha1Git, Snapshot)>> {
        let t = self.inner.lock();
        let Some(statuses) = t.visit_statuses.get(&origin.url.to_string()) else {
            return Ok(None);
        };
        let latest = statuses
            .iter()
            .rev()
            .find(|s| allowed_statuses.contains(&s.status) && s.snapshot_id.is_some());
        let Some(status) = latest else {
            return Ok(None);
        };
        let snapshot_id = status.snapshot_id.expect("filtered on snapshot_id.is_some()");
        Ok(t.snapshots.get(&snapshot_id).map(|s| (snapshot_id, s.clone())))
    }

    async fn extid_get_from_extid(
        &self,
        extid_type: &str,
        ids: &[Vec<u8>],
    ) -> Result<Vec<Option<ExtID>>> {
        let t = self.inner.lock();
        Ok(ids
            .iter()
            .map(|id| t.extids.get(&(extid_type.to_string(), id.clone())).cloned())
            .collect())
    }
}

/// Convenience used by the orchestrator when staging an ExtID for a
/// freshly-built branch: the target is the synthetic Release itself, not
/// its Directory, so that a later visit finding a matching ExtID can
/// reuse the Release id directly (spec.md §4.6 step 4a) without needing
/// to re-read the unpacked artifact the way `build_release` does for
/// adapters like `cpan`/`aur` that pull metadata out of the tree.
#[must_use]
pub const fn release_target_type() -> ExtidTargetType {
    ExtidTargetType::Release
}
