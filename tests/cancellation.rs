//! spec.md §5: cancellation is honored at every suspension point and
//! still produces a best-effort terminal status rather than aborting the
//! visit record entirely.

mod common;

use pkgvault_loader::config::LoaderConfig;
use pkgvault_loader::fetch::{Fetcher, RetryPolicy, Scripted, ScriptedTransport};
use pkgvault_loader::model::{VisitStatus, VisitType};
use pkgvault_loader::orchestrator::{CancelToken, Orchestrator};
use pkgvault_loader::store::InMemoryStore;
use std::sync::Arc;
use url::Url;

#[tokio::test]
async fn a_token_cancelled_before_load_yields_a_failed_status_without_fetching_anything() {
    let index = serde_json::json!({
        "dist-tags": { "latest": "1.0.0" },
        "versions": {
            "1.0.0": { "dist": { "tarball": "https://registry.npmjs.org/x/-/x-1.0.0.tgz", "shasum": "deadbeef" } },
        },
        "time": {},
    });
    let index_bytes = serde_json::to_vec(&index).unwrap();
    let index_url = Url::parse("https://registry.npmjs.org/x").unwrap();

    let transport = ScriptedTransport::new();
    // get_versions and get_default_version still run before the
    // per-version loop observes cancellation; no tarball fetch is scripted
    // because a cancelled visit must never reach step 4b.
    for _ in 0..2 {
        transport.push(index_url.as_str(), Scripted::Ok(index_bytes.clone()));
    }

    let fetcher = Fetcher::new(
        transport,
        RetryPolicy::default(),
        tempfile::tempdir().unwrap().path().to_path_buf(),
    );
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(fetcher),
        LoaderConfig::default(),
        tempfile::tempdir().unwrap().path().to_path_buf(),
    );

    let cancel = CancelToken::new();
    cancel.cancel();

    let result = orchestrator.load(index_url, VisitType::Npm, 1, &cancel).await;

    assert_eq!(result.status, VisitStatus::Failed);
    assert_eq!(result.stats.branches_succeeded, 0);
    assert_eq!(result.stats.branches_reused, 0);
}
