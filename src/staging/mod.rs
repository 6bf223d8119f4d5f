//! Object staging (C4): accumulate Content/Directory/Release/Snapshot
//! objects in bounded per-kind buffers and flush them to the store in
//! dependency order.
//!
//! Grounded on `daemon/cache.rs`'s bounded `DashMap` cache (capacity limit
//! with an explicit over-capacity policy), adapted from LRU-eviction to
//! flush-on-full: once a buffer reaches its configured size, it's written
//! out immediately rather than dropped, so memory never grows with package
//! size (spec.md §5 "Staging buffers: bounded, with backpressure").

use crate::config::LoaderConfig;
use crate::error::Result;
use crate::model::{Content, Directory, ExtID, OriginVisitStatus, Release, Sha1Git, Snapshot};
use crate::store::ObjectStore;
use std::sync::Arc;

/// Accumulates objects for a single visit and flushes them to an
/// `ObjectStore` in the dependency order spec.md §4.4 requires: Contents →
/// Directories → Releases → Snapshot → ExtIDs → OriginVisitStatus. The
/// store is assumed idempotent on id, so staging never pre-checks
/// existence for Contents/Directories — only ExtIDs are worth pre-checking
/// (spec.md §4.4), and that's the orchestrator's decision, not staging's.
pub struct Staging<S: ObjectStore> {
    store: Arc<S>,
    content_batch_size: usize,
    directory_batch_size: usize,
    release_batch_size: usize,

    contents: Vec<Content>,
    directories: Vec<(Sha1Git, Directory)>,
    releases: Vec<(Sha1Git, Release)>,
    extids: Vec<ExtID>,
    snapshot: Option<(Sha1Git, Snapshot)>,
}

impl<S: ObjectStore> Staging<S> {
    #[must_use]
    pub fn new(store: Arc<S>, config: &LoaderConfig) -> Self {
        Self {
            store,
            content_batch_size: config.content_batch_size,
            directory_batch_size: config.directory_batch_size,
            release_batch_size: config.release_batch_size,
            contents: Vec::new(),
            directories: Vec::new(),
            releases: Vec::new(),
            extids: Vec::new(),
            snapshot: None,
        }
    }

    pub async fn stage_content(&mut self, content: Content) -> Result<()> {
        self.contents.push(content);
        if self.contents.len() >= self.content_batch_size {
            self.flush_contents().await?;
        }
        Ok(())
    }

    pub async fn stage_directory(&mut self, id: Sha1Git, directory: Directory) -> Result<()> {
        self.directories.push((id, directory));
        if self.directories.len() >= self.directory_batch_size {
            self.flush_directories().await?;
        }
        Ok(())
    }

    pub async fn stage_release(&mut self, id: Sha1Git, release: Release) -> Result<()> {
        self.releases.push((id, release));
        if self.releases.len() >= self.release_batch_size {
            self.flush_releases().await?;
        }
        Ok(())
    }

    /// A `HashedTree`'s full set of contents/directories, in one call.
    pub async fn stage_tree(&mut self, contents: Vec<Content>, directories: Vec<(Sha1Git, Directory)>) -> Result<()> {
        for content in contents {
            self.stage_content(content).await?;
        }
        for (id, dir) in directories {
            self.stage_directory(id, dir).await?;
        }
        Ok(())
    }

    pub fn stage_extid(&mut self, extid: ExtID) {
        self.extids.push(extid);
    }

    /// Moves the pending ExtIDs out, for a caller that needs to carry them
    /// into a fresh `Staging` (the orchestrator does this when retrying a
    /// failed `finalize`, since `finalize` consumes `self`).
    pub fn take_extids(&mut self) -> Vec<ExtID> {
        std::mem::take(&mut self.extids)
    }

    /// The Snapshot is a singleton per visit; setting it twice replaces the
    /// pending value rather than appending (there is exactly one Snapshot
    /// per OriginVisitStatus, spec.md §3).
    pub fn set_snapshot(&mut self, id: Sha1Git, snapshot: Snapshot) {
        self.snapshot = Some((id, snapshot));
    }

    async fn flush_contents(&mut self) -> Result<()> {
        if self.contents.is_empty() {
            return Ok(());
        }
        self.store.content_add(&self.contents).await?;
        self.contents.clear();
        Ok(())
    }

    async fn flush_directories(&mut self) -> Result<()> {
        if self.directories.is_empty() {
            return Ok(());
        }
        self.store.directory_add(&self.directories).await?;
        self.directories.clear();
        Ok(())
    }

    async fn flush_releases(&mut self) -> Result<()> {
        if self.releases.is_empty() {
            return Ok(());
        }
        self.store.release_add(&self.releases).await?;
        self.releases.clear();
        Ok(())
    }

    /// Flush every remaining Content/Directory/Release in dependency order.
    /// Used mid-visit when a checkpoint is requested without finalising
    /// the visit (spec.md §4.4 "on flush or checkpoint").
    pub async fn checkpoint(&mut self) -> Result<()> {
        self.flush_contents().await?;
        self.flush_directories().await?;
        self.flush_releases().await?;
        Ok(())
    }

    /// Final flush at the end of a visit: every remaining object batch,
    /// then the Snapshot, then ExtIDs, then the OriginVisitStatus — strictly
    /// in that order, since each later write references an id the earlier
    /// ones must already have made durable (spec.md §4.4/§5).
    pub async fn finalize(mut self, visit_status: &OriginVisitStatus) -> Result<()> {
        self.checkpoint().await?;

        if let Some((id, snapshot)) = self.snapshot.take() {
            self.store.snapshot_add(id, &snapshot).await?;
        }

        if !self.extids.is_empty() {
            self.store.extid_add(&self.extids).await?;
        }

        self.store.origin_visit_status_add(visit_status).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryKind, Origin, VisitStatus};
    use crate::store::InMemoryStore;
    use std::str::FromStr;

    fn test_content(byte: u8) -> Content {
        Content {
            length: 1,
            sha1: [byte; 20],
            sha1_git: [byte; 20],
            sha256: [byte; 32],
            blake2s256: [byte; 32],
        }
    }

    fn test_status() -> OriginVisitStatus {
        OriginVisitStatus {
            origin: url::Url::from_str("https://example.test/pkg").unwrap(),
            visit_id: 1,
            date: time::OffsetDateTime::UNIX_EPOCH,
            status: VisitStatus::Full,
            snapshot_id: None,
        }
    }

    #[tokio::test]
    async fn flushes_content_batch_once_threshold_reached() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = LoaderConfig::default();
        config.content_batch_size = 2;
        let mut staging = Staging::new(store.clone(), &config);

        staging.stage_content(test_content(1)).await.unwrap();
        assert_eq!(store.object_count(), 0);
        staging.stage_content(test_content(2)).await.unwrap();
        assert_eq!(store.object_count(), 2);
    }

    #[tokio::test]
    async fn finalize_writes_remaining_batches_in_dependency_order() {
        let store = Arc::new(InMemoryStore::new());
        let config = LoaderConfig::default();
        let mut staging = Staging::new(store.clone(), &config);

        staging.stage_content(test_content(1)).await.unwrap();
        let dir = Directory::new(vec![crate::model::DirEntry {
            name: b"f".to_vec(),
            perms: EntryKind::File.default_perms(false),
            kind: EntryKind::File,
            target_id: [1u8; 20],
        }])
        .unwrap();
        staging.stage_directory([9u8; 20], dir).await.unwrap();

        let mut snapshot = Snapshot::new();
        snapshot
            .insert(b"HEAD".to_vec(), crate::model::BranchTarget::Release([2u8; 20]))
            .unwrap();
        staging.set_snapshot([3u8; 20], snapshot);

        let origin = Origin::new(url::Url::from_str("https://example.test/pkg").unwrap());
        staging.extids.push(ExtID {
            extid_type: "pypi-sha256".into(),
            extid_version: 0,
            extid: b"abc".to_vec(),
            target_type: crate::model::ExtidTargetType::Directory,
            target_id: [9u8; 20],
        });
        let _ = &origin;

        staging.finalize(&test_status()).await.unwrap();

        assert_eq!(store.object_count(), 3);
        let fetched = store
            .extid_get_from_extid("pypi-sha256", &[b"abc".to_vec()])
            .await
            .unwrap();
        assert!(fetched[0].is_some());
    }
}
