//! End-to-end orchestrator coverage over the npm adapter (spec.md §8
//! scenario 1: ingest 0.0.2 then 0.0.4, incremental reuse on a repeat
//! visit) using a scripted transport instead of the real registry.

mod common;

use pkgvault_loader::config::LoaderConfig;
use pkgvault_loader::fetch::{Fetcher, RetryPolicy, Scripted, ScriptedTransport};
use pkgvault_loader::model::{BranchTarget, Origin, VisitStatus, VisitType};
use pkgvault_loader::orchestrator::{CancelToken, Orchestrator};
use pkgvault_loader::store::{InMemoryStore, ObjectStore};
use std::sync::Arc;
use url::Url;

fn npm_index(versions: &[(&str, &str, &str)], latest: &str) -> serde_json::Value {
    let mut versions_obj = serde_json::Map::new();
    for (version, tarball_url, shasum) in versions {
        versions_obj.insert(
            (*version).to_string(),
            serde_json::json!({
                "dist": { "tarball": tarball_url, "shasum": shasum },
            }),
        );
    }
    serde_json::json!({
        "dist-tags": { "latest": latest },
        "versions": versions_obj,
        "time": {},
    })
}

fn index_url() -> Url {
    Url::parse("https://registry.npmjs.org/demo-pkg").unwrap()
}

#[tokio::test]
async fn ingests_two_versions_then_reuses_them_on_a_repeat_visit() {
    let tarball_020 = common::build_tarball("package/package.json", b"{\"name\":\"demo-pkg\"}");
    let tarball_040 = common::build_tarball("package/package.json", b"{\"name\":\"demo-pkg\",\"extra\":1}");
    let shasum_020 = common::sha1_hex(&tarball_020);
    let shasum_040 = common::sha1_hex(&tarball_040);

    let url_020 = "https://registry.npmjs.org/demo-pkg/-/demo-pkg-0.0.2.tgz";
    let url_040 = "https://registry.npmjs.org/demo-pkg/-/demo-pkg-0.0.4.tgz";
    let index = npm_index(
        &[("0.0.2", url_020, &shasum_020), ("0.0.4", url_040, &shasum_040)],
        "0.0.4",
    );
    let index_bytes = serde_json::to_vec(&index).unwrap();

    let transport = ScriptedTransport::new();
    // get_versions + get_default_version + get_package_info(0.0.2) + get_package_info(0.0.4)
    for _ in 0..4 {
        transport.push(index_url().as_str(), Scripted::Ok(index_bytes.clone()));
    }
    transport.push(url_020, Scripted::Ok(tarball_020));
    transport.push(url_040, Scripted::Ok(tarball_040));

    let fetch_scratch = tempfile::tempdir().unwrap();
    let fetcher = Fetcher::new(transport, RetryPolicy::default(), fetch_scratch.path().to_path_buf());
    let store = Arc::new(InMemoryStore::new());
    let orchestrator_scratch = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(fetcher),
        LoaderConfig::default(),
        orchestrator_scratch.path().to_path_buf(),
    );

    let result = orchestrator
        .load(index_url(), VisitType::Npm, 1, &CancelToken::new())
        .await;

    assert_eq!(result.status, VisitStatus::Full);
    assert!(!result.uneventful);
    assert_eq!(result.stats.branches_succeeded, 2);
    assert_eq!(result.stats.branches_failed, 0);
    assert!(result.failures.is_empty());

    let origin = Origin::new(index_url());
    let (_, snapshot) = store
        .snapshot_get_latest(&origin, &[VisitStatus::Full])
        .await
        .unwrap()
        .expect("a full snapshot should have been written");
    assert!(snapshot.branches.contains_key(&b"releases/0.0.2".to_vec()));
    assert!(snapshot.branches.contains_key(&b"releases/0.0.4".to_vec()));
    match snapshot.branches.get(&b"HEAD".to_vec()) {
        Some(BranchTarget::Alias(target)) => assert_eq!(target, b"releases/0.0.4"),
        other => panic!("expected HEAD alias to releases/0.0.4, got {other:?}"),
    }

    // Second visit: same versions, no new content. The registry is still
    // consulted (no adapter-level skip of get_package_info), but every
    // artifact short-circuits via its ExtID before any fetch/unpack.
    let transport2 = ScriptedTransport::new();
    for _ in 0..4 {
        transport2.push(index_url().as_str(), Scripted::Ok(index_bytes.clone()));
    }
    let fetch_scratch2 = tempfile::tempdir().unwrap();
    let fetcher2 = Fetcher::new(transport2, RetryPolicy::default(), fetch_scratch2.path().to_path_buf());
    let orchestrator_scratch2 = tempfile::tempdir().unwrap();
    let orchestrator2 = Orchestrator::new(
        Arc::clone(&store),
        Arc::new(fetcher2),
        LoaderConfig::default(),
        orchestrator_scratch2.path().to_path_buf(),
    );

    let second = orchestrator2
        .load(index_url(), VisitType::Npm, 2, &CancelToken::new())
        .await;

    assert_eq!(second.status, VisitStatus::Full);
    assert!(second.uneventful, "repeat visit with no new artifacts should be uneventful");
    assert_eq!(second.stats.branches_reused, 2);
    assert_eq!(second.stats.branches_succeeded, 0);
}
