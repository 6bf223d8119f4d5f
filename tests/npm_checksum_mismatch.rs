//! spec.md §8 scenario 6: a declared checksum that doesn't match the
//! downloaded bytes fails only the affected branch, with a structural
//! failure recorded rather than a retry storm, and a single-version visit
//! with nothing but that failure is terminal `failed`.

mod common;

use pkgvault_loader::config::LoaderConfig;
use pkgvault_loader::failures::FailureKind;
use pkgvault_loader::fetch::{Fetcher, RetryPolicy, Scripted, ScriptedTransport};
use pkgvault_loader::model::{VisitStatus, VisitType};
use pkgvault_loader::orchestrator::{CancelToken, Orchestrator};
use pkgvault_loader::store::InMemoryStore;
use std::sync::Arc;
use url::Url;

#[tokio::test]
async fn checksum_mismatch_fails_the_branch_without_retrying() {
    let tarball = common::build_tarball("package/package.json", b"{}");
    let wrong_shasum = "0".repeat(40);
    let tarball_url = "https://registry.npmjs.org/bad-pkg/-/bad-pkg-1.0.0.tgz";

    let index = serde_json::json!({
        "dist-tags": { "latest": "1.0.0" },
        "versions": {
            "1.0.0": { "dist": { "tarball": tarball_url, "shasum": wrong_shasum } },
        },
        "time": {},
    });
    let index_bytes = serde_json::to_vec(&index).unwrap();
    let index_url = Url::parse("https://registry.npmjs.org/bad-pkg").unwrap();

    let transport = ScriptedTransport::new();
    for _ in 0..3 {
        transport.push(index_url.as_str(), Scripted::Ok(index_bytes.clone()));
    }
    // Fetcher's retry policy never retries a checksum mismatch (it's
    // structural, decided after the body is already in hand), so exactly
    // one download attempt should be scripted.
    transport.push(tarball_url, Scripted::Ok(tarball));

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

    let result = orchestrator
        .load(index_url, VisitType::Npm, 1, &CancelToken::new())
        .await;

    assert_eq!(result.status, VisitStatus::Failed);
    assert_eq!(result.stats.branches_failed, 1);
    assert_eq!(result.stats.branches_succeeded, 0);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].kind, FailureKind::Structural);
    assert_eq!(result.failures[0].branch, b"releases/1.0.0".to_vec());
}
