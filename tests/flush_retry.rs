//! End-to-end coverage for the flush retry path a maintainer review flagged
//! (spec.md §4.4/§4.8): a store that fails `origin_visit_status_add`
//! transiently must not report the visit `Full`/`Partial` over a Snapshot
//! that was never made durable, and must recover once the store does.

mod common;

use async_trait::async_trait;
use pkgvault_loader::config::LoaderConfig;
use pkgvault_loader::error::{LoaderError, Result};
use pkgvault_loader::fetch::{Fetcher, RetryPolicy, Scripted, ScriptedTransport};
use pkgvault_loader::model::{
    Content, Directory, ExtID, Origin, OriginVisit, OriginVisitStatus, Release, Sha1Git, Snapshot,
    VisitStatus, VisitType,
};
use pkgvault_loader::orchestrator::{CancelToken, Orchestrator};
use pkgvault_loader::store::{InMemoryStore, ObjectStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// Wraps an `InMemoryStore`, failing the first `fail_count` calls to
/// `origin_visit_status_add` (the last write `finalize` makes, so failing
/// it exercises the retry loop without ever partially-committing a
/// Snapshot the test can observe as spuriously present).
struct FlakyStore {
    inner: InMemoryStore,
    fail_count: usize,
    attempts: AtomicUsize,
}

impl FlakyStore {
    fn new(fail_count: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_count,
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn content_add(&self, batch: &[Content]) -> Result<()> {
        self.inner.content_add(batch).await
    }

    async fn directory_add(&self, batch: &[(Sha1Git, Directory)]) -> Result<()> {
        self.inner.directory_add(batch).await
    }

    async fn release_add(&self, batch: &[(Sha1Git, Release)]) -> Result<()> {
        self.inner.release_add(batch).await
    }

    async fn snapshot_add(&self, id: Sha1Git, snapshot: &Snapshot) -> Result<()> {
        self.inner.snapshot_add(id, snapshot).await
    }

    async fn extid_add(&self, batch: &[ExtID]) -> Result<()> {
        self.inner.extid_add(batch).await
    }

    async fn origin_add(&self, origin: &Origin) -> Result<()> {
        self.inner.origin_add(origin).await
    }

    async fn origin_visit_add(&self, visit: &OriginVisit) -> Result<()> {
        self.inner.origin_visit_add(visit).await
    }

    async fn origin_visit_status_add(&self, status: &OriginVisitStatus) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_count {
            return Err(LoaderError::StoreUnavailable("simulated outage".into()));
        }
        self.inner.origin_visit_status_add(status).await
    }

    async fn snapshot_get_latest(
        &self,
        origin: &Origin,
        allowed_statuses: &[VisitStatus],
    ) -> Result<Option<(Sha1Git, Snapshot)>> {
        self.inner.snapshot_get_latest(origin, allowed_statuses).await
    }

    async fn extid_get_from_extid(
        &self,
        extid_type: &str,
        ids: &[Vec<u8>],
    ) -> Result<Vec<Option<ExtID>>> {
        self.inner.extid_get_from_extid(extid_type, ids).await
    }
}

fn npm_index(version: &str, tarball_url: &str, shasum: &str) -> serde_json::Value {
    serde_json::json!({
        "dist-tags": { "latest": version },
        "versions": {
            version: { "dist": { "tarball": tarball_url, "shasum": shasum } },
        },
        "time": {},
    })
}

fn index_url() -> Url {
    Url::parse("https://registry.npmjs.org/flaky-pkg").unwrap()
}

/// No-backoff-wait config: retries happen immediately so the test doesn't
/// block on real sleeps.
fn fast_retry_config(flush_retry_attempts: u32) -> LoaderConfig {
    LoaderConfig {
        fetch_backoff_base_secs: 0,
        fetch_backoff_cap_secs: 0,
        flush_retry_attempts,
        ..LoaderConfig::default()
    }
}

async fn run_visit(store: Arc<FlakyStore>, flush_retry_attempts: u32) -> pkgvault_loader::orchestrator::LoadResult {
    let tarball = common::build_tarball("package/package.json", b"{\"name\":\"flaky-pkg\"}");
    let shasum = common::sha1_hex(&tarball);
    let tarball_url = "https://registry.npmjs.org/flaky-pkg/-/flaky-pkg-1.0.0.tgz";
    let index = npm_index("1.0.0", tarball_url, &shasum);
    let index_bytes = serde_json::to_vec(&index).unwrap();

    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.push(index_url().as_str(), Scripted::Ok(index_bytes.clone()));
    }
    transport.push(tarball_url, Scripted::Ok(tarball));

    let fetch_scratch = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(transport, RetryPolicy::default(), fetch_scratch.path().to_path_buf());
    let orchestrator_scratch = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(fetcher),
        fast_retry_config(flush_retry_attempts),
        orchestrator_scratch.path().to_path_buf(),
    );

    orchestrator.load(index_url(), VisitType::Npm, 1, &CancelToken::new()).await
}

#[tokio::test]
async fn flush_recovers_after_transient_store_failures() {
    // Fails the first 2 attempts, succeeds on the 3rd — within the default
    // flush_retry_attempts budget.
    let store = Arc::new(FlakyStore::new(2));
    let result = run_visit(Arc::clone(&store), 3).await;

    assert_eq!(result.status, VisitStatus::Full);
    assert!(result.snapshot_id.is_some());

    let origin = Origin::new(index_url());
    let latest = store
        .inner
        .snapshot_get_latest(&origin, &[VisitStatus::Full])
        .await
        .unwrap();
    assert!(latest.is_some(), "the eventually-successful flush should have persisted a snapshot");
}

#[tokio::test]
async fn flush_exhausting_retries_marks_the_visit_failed_with_no_snapshot() {
    // Always fails — retries exhaust, so the visit must not report a
    // snapshot that was never made durable (invariant 3 / spec.md §8
    // snapshot-reachability).
    let store = Arc::new(FlakyStore::new(usize::MAX));
    let result = run_visit(Arc::clone(&store), 2).await;

    assert_eq!(result.status, VisitStatus::Failed);
    assert!(result.snapshot_id.is_none());

    let origin = Origin::new(index_url());
    let latest = store
        .inner
        .snapshot_get_latest(&origin, &[VisitStatus::Full, VisitStatus::Partial])
        .await
        .unwrap();
    assert!(latest.is_none(), "a permanently failed flush must never leave a reachable snapshot");
}
